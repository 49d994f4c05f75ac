//! Snapshot error types.

use std::path::PathBuf;

use thiserror::Error;
use worldvault_fs::CopyError;
use worldvault_util::NameError;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot not found.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// Snapshot already exists and overwrite was not requested.
    #[error("Snapshot already exists: {0}")]
    AlreadyExists(String),

    /// The snapshot is locked against deletion and overwrite.
    #[error("Snapshot is locked: {0}")]
    Locked(String),

    /// The entry has no valid payload on disk.
    #[error("Snapshot {0} is not materialized")]
    NotMaterialized(String),

    /// The name cannot be used as a directory name.
    #[error("Invalid snapshot name {name:?}: {source}")]
    InvalidName {
        name: String,
        #[source]
        source: NameError,
    },

    /// IO error at a specific path.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tree copy or delete failed.
    #[error(transparent)]
    Copy(#[from] CopyError),

    /// Metadata serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Create a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    /// Create a locked error.
    pub fn locked(name: impl Into<String>) -> Self {
        Self::Locked(name.into())
    }

    /// Create an IO error tagged with the failing path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, source: NameError) -> Self {
        Self::InvalidName {
            name: name.into(),
            source,
        }
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Copy(CopyError::Cancelled))
    }
}
