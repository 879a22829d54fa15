use cwscan_ir::IrError;
use cwscan_storage::StorageError;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Source bundle absent from the blob store
    #[error("source {0} not found")]
    NotFound(String),

    /// Malformed manifest, syntax tree, payload or package location
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generation tool failed, timed out or produced nothing
    #[error("Schema generation failed: {0}")]
    Generation(String),

    #[error("Persistence error: {0}")]
    Persistence(#[source] StorageError),

    #[error("Infrastructure unavailable: {0}")]
    InfrastructureUnavailable(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("no entry point message types resolved in {0}")]
    NoBindings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }

    pub fn generation<E: std::fmt::Display>(e: E) -> Self {
        Self::Generation(e.to_string())
    }

    pub fn unavailable<E: std::fmt::Display>(e: E) -> Self {
        Self::InfrastructureUnavailable(e.to_string())
    }

    /// Classification used in failure logs
    pub fn category(&self) -> ErrorCategory {
        match self {
            OrchestratorError::Persistence(_) | OrchestratorError::Io(_) => {
                ErrorCategory::Transient
            }
            OrchestratorError::InfrastructureUnavailable(_) | OrchestratorError::Config(_) => {
                ErrorCategory::Infrastructure
            }
            _ => ErrorCategory::Permanent,
        }
    }
}

impl From<StorageError> for OrchestratorError {
    fn from(err: StorageError) -> Self {
        OrchestratorError::Persistence(err)
    }
}

impl From<IrError> for OrchestratorError {
    fn from(err: IrError) -> Self {
        match err {
            IrError::Io(io) => OrchestratorError::Io(io),
            other => OrchestratorError::Parse(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Persistence(StorageError::from(err))
    }
}

impl From<zip::result::ZipError> for OrchestratorError {
    fn from(err: zip::result::ZipError) -> Self {
        OrchestratorError::Parse(format!("invalid source archive: {}", err))
    }
}

/// Error category for log classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCategory {
    /// Transient error (e.g., store hiccup, disk I/O)
    Transient,
    /// Permanent error (e.g., invalid input, parse error, tool failure)
    Permanent,
    /// Infrastructure error (e.g., backend unreachable, bad configuration)
    Infrastructure,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Infrastructure => "infrastructure",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "transient" => Ok(ErrorCategory::Transient),
            "permanent" => Ok(ErrorCategory::Permanent),
            "infrastructure" => Ok(ErrorCategory::Infrastructure),
            _ => Err(OrchestratorError::parse(format!(
                "Invalid error category: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
