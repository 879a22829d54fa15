//! Error types for cwscan-storage

use std::fmt;
use thiserror::Error;

/// Storage error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Database errors (SQLite)
    Database,
    /// Serialization/deserialization errors
    Serialization,
    /// Blob or record not found
    NotFound,
    /// Ack for a lease that expired or was never issued
    LeaseExpired,
    /// Downstream transport rejected a message
    Publish,
    /// I/O errors
    IO,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Database => "database",
            ErrorKind::Serialization => "serialization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::LeaseExpired => "lease_expired",
            ErrorKind::Publish => "publish",
            ErrorKind::IO => "io",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct StorageError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialization, message)
    }

    pub fn blob_not_found(blob_id: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::NotFound,
            format!("Blob not found: {}", blob_id.into()),
        )
    }

    pub fn lease_expired(ack: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::LeaseExpired,
            format!("Queue item not found or lease expired for ack {}", ack.into()),
        )
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Publish, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

// SQLite error conversions
#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::database(format!("SQLite error: {}", err)).with_source(err)
    }
}

// JSON error conversions
impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::serialization(format!("JSON error: {}", err)).with_source(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::new(ErrorKind::IO, format!("I/O error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = StorageError::blob_not_found("6470d3c1");
        let msg = format!("{}", err);
        assert!(msg.contains("[not_found]"));
        assert!(msg.contains("6470d3c1"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_database_error() {
        let err = StorageError::database("Connection failed");
        assert_eq!(err.kind, ErrorKind::Database);
        assert!(err.source.is_none());
        assert_eq!(format!("{}", err), "[database] Connection failed");
    }

    #[test]
    fn test_lease_expired() {
        let err = StorageError::lease_expired("abc");
        assert_eq!(err.kind, ErrorKind::LeaseExpired);
        assert!(err.message.contains("abc"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_with_source() {
        use std::io;

        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err = StorageError::database("DB file missing").with_source(io_err);

        let source = err.source().unwrap();
        assert!(source.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::Database.as_str(), "database");
        assert_eq!(ErrorKind::Serialization.as_str(), "serialization");
        assert_eq!(ErrorKind::NotFound.as_str(), "not_found");
        assert_eq!(ErrorKind::LeaseExpired.as_str(), "lease_expired");
        assert_eq!(ErrorKind::Publish.as_str(), "publish");
        assert_eq!(ErrorKind::IO.as_str(), "io");
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_from_rusqlite_error() {
        let err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();

        assert_eq!(err.kind, ErrorKind::Database);
        assert!(err.message.contains("SQLite error"));
        assert!(err.source.is_some());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json")
            .err()
            .unwrap();
        let err: StorageError = json_err.into();

        assert_eq!(err.kind, ErrorKind::Serialization);
        assert!(err.message.contains("JSON error"));
    }
}
