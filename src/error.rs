//! Error types for mcpsync

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for mcpsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// One structural problem found while validating a record
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    /// Dotted path of the offending field (e.g. `servers.github.env`)
    pub path: String,
    /// Human-readable description
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Main error type for mcpsync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error at {}: {message}", path.display())]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Wrap an IO error with the path it happened on and a readable cause
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let message = match source.kind() {
            ErrorKind::NotFound => "file or directory does not exist".to_string(),
            ErrorKind::PermissionDenied => "permission denied".to_string(),
            ErrorKind::AlreadyExists => "already exists".to_string(),
            ErrorKind::WriteZero | ErrorKind::StorageFull => "disk full".to_string(),
            ErrorKind::InvalidData => "file contents are not valid UTF-8".to_string(),
            _ => source.to_string(),
        };
        SyncError::Io {
            path: path.as_ref().to_path_buf(),
            message,
            source,
        }
    }

    /// Field errors carried by a validation failure, empty otherwise
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            SyncError::Validation(errors) => errors,
            _ => &[],
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
