// On-disk storage for project photos and documents

use std::path::{Path, PathBuf};

use mime_guess::{mime, Mime};
use tokio::fs;

use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct StorageService {
    base_path: PathBuf,
}

impl StorageService {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create storage directory: {e}")))?;
        Ok(())
    }

    pub fn project_path(&self, project_id: &str) -> PathBuf {
        self.base_path.join(project_id)
    }

    /// Relative path, under the project directory, for a new upload.
    pub fn stored_name(file_id: &str, file_name: &str) -> String {
        format!("{file_id}_{}", sanitize_file_name(file_name))
    }

    fn resolve(&self, project_id: &str, stored: &str) -> Result<PathBuf> {
        let relative = Path::new(stored);
        if relative.components().count() != 1 || stored.starts_with('.') {
            return Err(AppError::BadRequest("Invalid file path".to_string()));
        }
        Ok(self.project_path(project_id).join(relative))
    }

    pub async fn write(&self, project_id: &str, stored: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(project_id, stored)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create directories: {e}")))?;
        }

        fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write file: {e}")))
    }

    pub async fn read(&self, project_id: &str, stored: &str) -> Result<Vec<u8>> {
        let path = self.resolve(project_id, stored)?;

        if !path.exists() {
            return Err(AppError::NotFound(format!("File not found: {stored}")));
        }

        fs::read(&path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read file: {e}")))
    }

    pub async fn delete(&self, project_id: &str, stored: &str) -> Result<()> {
        let path = self.resolve(project_id, stored)?;

        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to delete file: {e}")))?;
        }

        Ok(())
    }

    pub async fn delete_project_dir(&self, project_id: &str) -> Result<()> {
        let path = self.project_path(project_id);
        if path.exists() {
            fs::remove_dir_all(&path).await.map_err(|e| {
                AppError::Internal(format!("Failed to delete project directory: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Keep the final path segment and replace anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Content type guessed from the extension.
pub fn content_type(file_name: &str) -> Mime {
    mime_guess::from_path(file_name).first_or_octet_stream()
}

pub fn is_image(file_name: &str) -> bool {
    content_type(file_name).type_() == mime::IMAGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("site photo (1).JPG"), "site_photo__1_.JPG");
        assert_eq!(sanitize_file_name("..."), "file");
    }

    #[test]
    fn rejects_nested_paths() {
        let storage = StorageService::new("/tmp/buildtrack-test");
        assert!(storage.resolve("p", "a/b").is_err());
        assert!(storage.resolve("p", "..").is_err());
        assert!(storage.resolve("p", "abc_photo.jpg").is_ok());
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type("x.JPEG").essence_str(), "image/jpeg");
        assert_eq!(content_type("plan.pdf").essence_str(), "application/pdf");
        assert_eq!(content_type("noext"), mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn site_photo_formats_are_images() {
        for name in ["IMG_0001.HEIC", "plan.svg", "scan.tiff", "site.bmp", "roof.webp"] {
            assert!(is_image(name), "{name} should be an image");
        }
        assert!(!is_image("quote.docx"));
    }
}
