//! Field validation run before anything is written.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::{AppError, Result};

pub const MAX_NAME_LEN: usize = 100;
pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9 ()\-]{7,20}$").expect("phone pattern compiles"));

/// Trimmed, non-empty, bounded-length name.
pub fn name<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed)
}

pub fn email(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if !EMAIL_RE.is_match(trimmed) {
        return Err(AppError::Validation("Invalid email address".to_string()));
    }
    Ok(trimmed.to_lowercase())
}

pub fn phone(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if !PHONE_RE.is_match(trimmed) {
        return Err(AppError::Validation("Invalid phone number".to_string()));
    }
    Ok(trimmed.to_string())
}

/// Blank phones count as absent.
pub fn optional_phone(value: Option<&str>) -> Result<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(p) => phone(p).map(Some),
    }
}

pub fn date(field: &str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("{field} must be a date in YYYY-MM-DD format")))
}

pub fn optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(d) => date(field, d).map(Some),
    }
}

pub fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::Validation(
                "End date cannot be before start date".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn password(value: &str) -> Result<()> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(name("Name", "  Casa Norte ").unwrap(), "Casa Norte");
        assert!(name("Name", "   ").is_err());
        assert!(name("Name", &"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn emails() {
        assert_eq!(email(" Ana@Example.com ").unwrap(), "ana@example.com");
        assert!(email("ana@example").is_err());
        assert!(email("ana example.com").is_err());
    }

    #[test]
    fn phones() {
        assert!(phone("+34 600 123 456").is_ok());
        assert!(phone("(555) 123-4567").is_ok());
        assert!(phone("12ab").is_err());
        assert_eq!(optional_phone(Some("  ")).unwrap(), None);
    }

    #[test]
    fn dates() {
        let start = date("Start date", "2024-03-01").unwrap();
        let end = date("End date", "2024-02-01").unwrap();
        assert!(date("Start date", "01/03/2024").is_err());
        assert!(date_range(Some(start), Some(end)).is_err());
        assert!(date_range(Some(end), Some(start)).is_ok());
        assert!(date_range(None, Some(end)).is_ok());
    }

    #[test]
    fn passwords() {
        assert!(password("short").is_err());
        assert!(password("long-enough").is_ok());
    }
}
