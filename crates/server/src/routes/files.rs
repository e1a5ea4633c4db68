use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::header,
    response::Response,
    routing::{delete, get},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::models::{FileKind, ProjectFile},
    domain::access,
    error::{AppError, Result},
    middleware::guard,
    routes::phases::phase_number,
    services::{
        events::{ChangeEvent, Table},
        storage::{self, StorageService},
    },
    session::Session,
    AppState,
};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Routes nested under `/projects`.
pub fn project_routes() -> Router<AppState> {
    Router::new().route(
        "/:id/files",
        get(list_files)
            .post(upload_file)
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id", delete(delete_file))
        .route("/:id/content", get(get_file_content))
}

#[derive(Debug, Deserialize)]
pub struct FileFilter {
    pub phase: Option<i64>,
    pub kind: Option<FileKind>,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<ProjectFile>,
}

async fn list_files(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
    Query(filter): Query<FileFilter>,
) -> Result<Json<FileListResponse>> {
    guard::require_project_access(&state.db.pool, &session, &project_id).await?;

    let phase = filter.phase.map(phase_number).transpose()?;

    let files = sqlx::query_as::<_, ProjectFile>(
        r#"
        SELECT * FROM project_files
        WHERE project_id = ?
          AND (? IS NULL OR phase_number = ?)
          AND (? IS NULL OR kind = ?)
        ORDER BY created_at DESC
        "#,
    )
    .bind(&project_id)
    .bind(phase)
    .bind(phase)
    .bind(filter.kind)
    .bind(filter.kind)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(FileListResponse { files }))
}

/// Fields collected from one multipart upload.
#[derive(Default)]
struct UploadForm {
    file_name: Option<String>,
    data: Option<Vec<u8>>,
    kind: Option<FileKind>,
    caption: String,
    phase_number: Option<i64>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?;
                form.data = Some(bytes.to_vec());
            }
            "kind" => {
                let text = field_text(field).await?;
                form.kind = Some(match text.trim() {
                    "photo" => FileKind::Photo,
                    "document" => FileKind::Document,
                    other => {
                        return Err(AppError::Validation(format!("Unknown file kind: {other}")))
                    }
                });
            }
            "caption" => form.caption = field_text(field).await?.trim().to_string(),
            "phase_number" => {
                let text = field_text(field).await?;
                let text = text.trim();
                if !text.is_empty() {
                    let number = text
                        .parse::<i64>()
                        .map_err(|_| AppError::Validation("Invalid phase number".to_string()))?;
                    form.phase_number = Some(phase_number(number)?);
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))
}

/// Images are photos unless the client says otherwise.
fn infer_kind(file_name: &str) -> FileKind {
    if storage::is_image(file_name) {
        FileKind::Photo
    } else {
        FileKind::Document
    }
}

async fn upload_file(
    State(state): State<AppState>,
    session: Session,
    Path(project_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ProjectFile>> {
    let (user, _) = guard::require_upload(&state.db.pool, &session, &project_id).await?;

    let form = read_upload(multipart).await?;
    let data = form
        .data
        .ok_or_else(|| AppError::Validation("A file is required".to_string()))?;
    let file_name = form
        .file_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| AppError::Validation("File name is required".to_string()))?;

    let id = Uuid::new_v4().to_string();
    let stored = StorageService::stored_name(&id, &file_name);
    state.storage.write(&project_id, &stored, &data).await?;

    let file = ProjectFile {
        kind: form.kind.unwrap_or_else(|| infer_kind(&file_name)),
        id,
        project_id,
        phase_number: form.phase_number,
        file_name,
        path: stored,
        caption: form.caption,
        uploaded_by: user.id,
        created_at: Utc::now().to_rfc3339(),
    };

    let inserted = sqlx::query(
        "INSERT INTO project_files (id, project_id, phase_number, kind, file_name, path, caption, uploaded_by, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&file.id)
    .bind(&file.project_id)
    .bind(file.phase_number)
    .bind(file.kind)
    .bind(&file.file_name)
    .bind(&file.path)
    .bind(&file.caption)
    .bind(&file.uploaded_by)
    .bind(&file.created_at)
    .execute(&state.db.pool)
    .await;

    if let Err(e) = inserted {
        // Don't leave an orphaned blob behind
        let _ = state.storage.delete(&file.project_id, &file.path).await;
        return Err(e.into());
    }

    tracing::info!(
        file_id = %file.id,
        project_id = %file.project_id,
        bytes = data.len(),
        "file uploaded"
    );

    state
        .events
        .publish(ChangeEvent::inserted(Table::Files, &file.project_id, &file.id, &file))
        .await;

    Ok(Json(file))
}

async fn fetch_file(pool: &SqlitePool, id: &str) -> Result<ProjectFile> {
    sqlx::query_as::<_, ProjectFile>("SELECT * FROM project_files WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))
}

async fn get_file_content(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Response> {
    let file = fetch_file(&state.db.pool, &id).await?;
    guard::require_project_access(&state.db.pool, &session, &file.project_id).await?;

    let data = state.storage.read(&file.project_id, &file.path).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, storage::content_type(&file.file_name).to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "inline; filename=\"{}\"",
                storage::sanitize_file_name(&file.file_name)
            ),
        )
        .body(Body::from(data))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {e}")))
}

async fn delete_file(
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<String>,
) -> Result<Json<()>> {
    let file = fetch_file(&state.db.pool, &id).await?;
    let user = session.require_user()?;
    let facts = guard::project_facts(&state.db.pool, &file.project_id, &user.id).await?;

    if !access::can_delete_file(Some(&user), &file.uploaded_by, &facts.owner_id) {
        return Err(AppError::Forbidden(
            "Only the uploader or the project owner can delete this file".to_string(),
        ));
    }

    sqlx::query("DELETE FROM project_files WHERE id = ?")
        .bind(&id)
        .execute(&state.db.pool)
        .await?;

    if let Err(e) = state.storage.delete(&file.project_id, &file.path).await {
        tracing::warn!(file_id = %id, error = %e, "failed to remove stored file");
    }

    state
        .events
        .publish(ChangeEvent::deleted(Table::Files, &file.project_id, &id))
        .await;

    Ok(Json(()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn images_default_to_photos() {
        assert_eq!(infer_kind("site.JPG"), FileKind::Photo);
        assert_eq!(infer_kind("IMG_0001.HEIC"), FileKind::Photo);
        assert_eq!(infer_kind("scan.tiff"), FileKind::Photo);
        assert_eq!(infer_kind("invoice.pdf"), FileKind::Document);
        assert_eq!(infer_kind("notes"), FileKind::Document);
    }
}
