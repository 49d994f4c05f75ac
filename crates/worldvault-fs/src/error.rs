//! Tree operation error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for tree copy and delete operations.
pub type CopyResult<T> = Result<T, CopyError>;

/// Errors that can occur while copying or deleting a tree.
#[derive(Debug, Error)]
pub enum CopyError {
    /// IO error at a specific path. The operation aborts on the first
    /// failure; whatever was already written stays on disk.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The operation was cancelled between entries.
    #[error("Operation cancelled")]
    Cancelled,
}

impl CopyError {
    /// Create an IO error tagged with the failing path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<walkdir::Error> for CopyError {
    fn from(err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        match err.into_io_error() {
            Some(io) => Self::Io { path, source: io },
            None => Self::Io {
                path,
                source: std::io::Error::other("filesystem loop detected"),
            },
        }
    }
}
