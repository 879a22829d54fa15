//! Error types for cwscan-ir
//!
//! Provides unified error handling across the crate.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for cwscan-ir operations
#[derive(Debug, Error)]
pub enum IrError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed source or syntax tree shape
    #[error("Parse error in {file}: {reason}")]
    Parse { file: PathBuf, reason: String },

    /// The external syntax tree producer failed or timed out
    #[error("Syntax tree producer failed for {file}: {reason}")]
    Producer { file: PathBuf, reason: String },

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory traversal error
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl IrError {
    /// Create a parse error for a file
    pub fn parse(file: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        IrError::Parse {
            file: file.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a producer error for a file
    pub fn producer(file: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        IrError::Producer {
            file: file.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Whether this error reports malformed input rather than an I/O problem
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            IrError::Parse { .. } | IrError::Producer { .. } | IrError::Json(_)
        )
    }
}

/// Result type alias for cwscan-ir operations
pub type Result<T> = std::result::Result<T, IrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_names_file() {
        let err = IrError::parse("src/contract.rs", "function without identifier");
        let msg = err.to_string();
        assert!(msg.contains("src/contract.rs"));
        assert!(msg.contains("function without identifier"));
        assert!(err.is_parse());
    }

    #[test]
    fn test_io_error_is_not_parse() {
        let err: IrError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(!err.is_parse());
    }
}
