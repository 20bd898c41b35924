//! Error types for the gitreader core library.
//!
//! Per-file problems (syntax errors, oversize or unreadable files, scan
//! truncation) are never errors: they accumulate as [`crate::models::Warning`]
//! values inside the index. Everything here ends the current request.

/// Top-level error enum for the gitreader core library.
#[derive(Debug, thiserror::Error)]
pub enum GitReaderError {
    /// The repository spec or a derived path is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Repository content could not be obtained.
    #[error("Acquisition error: {0}")]
    Acquisition(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Symbol not found: {0}")]
    NotFound(String),

    #[error("Symbol has no location: {0}")]
    NoLocation(String),

    #[error("Source unreadable: {0}")]
    UnreadableSource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
}

impl GitReaderError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            GitReaderError::Validation(_) => "validation_error",
            GitReaderError::Acquisition(_) | GitReaderError::Git(_) => "acquisition_error",
            GitReaderError::Config(_) => "config_error",
            GitReaderError::NotFound(_) => "not_found",
            GitReaderError::NoLocation(_) => "no_location",
            GitReaderError::UnreadableSource(_) => "unreadable_source",
            GitReaderError::Io(_) => "io_error",
            GitReaderError::Json(_) => "json_error",
        }
    }
}

pub type GitReaderResult<T> = Result<T, GitReaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GitReaderError::Validation("x".into()).code(),
            "validation_error"
        );
        assert_eq!(GitReaderError::NotFound("x".into()).code(), "not_found");
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert_eq!(GitReaderError::from(io).code(), "io_error");
    }

    #[test]
    fn test_error_display() {
        let err = GitReaderError::Validation("Subdir not found: docs".into());
        assert_eq!(err.to_string(), "Validation error: Subdir not found: docs");
    }
}
