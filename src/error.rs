use thiserror::Error;

/// Main error type for kbenrich
#[derive(Error, Debug)]
pub enum KbenrichError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or unparseable configuration. Fatal at load time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A processor stage failed for a single document
    #[error("Processing error: {0}")]
    Processing(String),

    /// A single row failed to write or remove
    #[error("Synchronization error: {0}")]
    Synchronization(String),

    /// A required store/connection parameter is missing at call time
    #[error("Connection precondition failed: {0}")]
    ConnectionPrecondition(String),

    /// A required document field is missing or blank
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The store rejected a call or exposes no suitable capability
    #[error("Store error: {0}")]
    Store(String),

    /// Record not found
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using KbenrichError
pub type Result<T> = std::result::Result<T, KbenrichError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KbenrichError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_missing_field_display() {
        let err = KbenrichError::MissingField("content".to_string());
        assert_eq!(err.to_string(), "Missing required field: content");
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: KbenrichError = rusqlite_err.into();
        assert!(matches!(err, KbenrichError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: KbenrichError = io_err.into();
        assert!(matches!(err, KbenrichError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: KbenrichError = json_err.into();
        assert!(matches!(err, KbenrichError::Json(_)));
    }
}
