//! Engine error types.

use std::path::PathBuf;

use thiserror::Error;
use worldvault_snapshot::SnapshotError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while coordinating and running tasks.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another task currently holds the single task slot.
    #[error("A task is already running for {owner}")]
    Busy {
        /// Who started the running task.
        owner: String,
    },

    /// A snapshot operation failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// An exclusion pattern in the configuration does not compile.
    #[error("Invalid exclusion pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// The host swap hook failed.
    #[error("Swap hook failed: {0}")]
    Hook(String),

    /// A blocking worker task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// IO error at a specific path.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file parse error.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a busy error.
    pub fn busy(owner: impl Into<String>) -> Self {
        Self::Busy {
            owner: owner.into(),
        }
    }

    /// Create a swap hook error.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook(message.into())
    }

    /// Create an IO error tagged with the failing path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Snapshot(e) if e.is_cancelled())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Worker(e.to_string())
    }
}
