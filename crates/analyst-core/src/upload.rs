//! Admission rules for uploaded files.

use crate::error::{AnalystError, Result};

pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["csv", "json", "txt", "xlsx", "xls"];

/// 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
    pub max_file_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn is_allowed_name(&self, filename: &str) -> bool {
        match extension(filename) {
            Some(ext) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(&ext)),
            None => false,
        }
    }

    /// Reject files by name before any bytes are stored.
    pub fn check_name(&self, filename: &str) -> Result<()> {
        if self.is_allowed_name(filename) {
            Ok(())
        } else {
            Err(AnalystError::Validation(format!(
                "Invalid file type. Only {} files are allowed.",
                self.allowed_extensions
                    .iter()
                    .map(|e| e.to_uppercase())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }

    pub fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_file_bytes {
            Err(AnalystError::Validation(format!(
                "File too large: {} bytes exceeds the {} byte limit",
                size, self.max_file_bytes
            )))
        } else {
            Ok(())
        }
    }
}

/// Lowercased extension after the last dot, if any.
fn extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Name under which an upload is written: `<unix millis>-<sanitized name>`.
pub fn stored_filename(original: &str, unix_millis: i64) -> String {
    format!("{}-{}", unix_millis, sanitize_filename(original))
}

/// Media type sent to the model for a stored file, derived from its extension.
pub fn media_type_for(filename: &str) -> &'static str {
    match extension(filename).as_deref() {
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("xls") => "application/vnd.ms-excel",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extensions_case_insensitive() {
        let policy = UploadPolicy::default();
        assert!(policy.is_allowed_name("data.csv"));
        assert!(policy.is_allowed_name("DATA.CSV"));
        assert!(policy.is_allowed_name("report.final.xlsx"));
        assert!(policy.is_allowed_name("notes.TxT"));
    }

    #[test]
    fn test_disallowed_extensions_rejected() {
        let policy = UploadPolicy::default();
        assert!(!policy.is_allowed_name("setup.exe"));
        assert!(!policy.is_allowed_name("archive.csv.zip"));
        assert!(!policy.is_allowed_name("noextension"));
        assert!(!policy.is_allowed_name("trailingdot."));
        assert!(matches!(
            policy.check_name("virus.exe"),
            Err(AnalystError::Validation(_))
        ));
    }

    #[test]
    fn test_size_limit() {
        let policy = UploadPolicy::default();
        assert!(policy.check_size(DEFAULT_MAX_UPLOAD_BYTES).is_ok());
        assert!(policy.check_size(DEFAULT_MAX_UPLOAD_BYTES + 1).is_err());
    }

    #[test]
    fn test_sanitize_and_stored_name() {
        assert_eq!(sanitize_filename("my data (v2).csv"), "my_data__v2_.csv");
        assert_eq!(sanitize_filename("ok-name.json"), "ok-name.json");
        assert_eq!(stored_filename("a b.csv", 1700000000000), "1700000000000-a_b.csv");
    }

    #[test]
    fn test_media_type_for() {
        assert_eq!(media_type_for("x.csv"), "text/csv");
        assert_eq!(media_type_for("123-x.JSON"), "application/json");
        assert_eq!(media_type_for("x.xls"), "application/vnd.ms-excel");
        assert_eq!(media_type_for("x.unknown"), "text/plain");
        assert_eq!(media_type_for("x"), "text/plain");
    }
}
