//! Snapshot name validation.
//!
//! Snapshot names double as directory names under the backup root, so they
//! must be safe to use as a single path segment on every platform.

use thiserror::Error;

/// Maximum length of a snapshot name in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Error returned when a snapshot name is not usable as a directory name.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("name is empty")]
    Empty,
    #[error("name is longer than {MAX_NAME_LEN} bytes")]
    TooLong,
    #[error("name contains a path separator or control character: {0:?}")]
    InvalidCharacter(char),
    #[error("name {0:?} is a reserved path component")]
    Reserved(String),
}

/// Validate a snapshot name for use as a single path segment.
///
/// Rejects empty and oversized names, names containing path separators,
/// NUL or other control characters, and the `.`/`..` components.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong);
    }
    if name == "." || name == ".." {
        return Err(NameError::Reserved(name.to_string()));
    }
    for c in name.chars() {
        if c == '/' || c == '\\' || c == ':' || c.is_control() {
            return Err(NameError::InvalidCharacter(c));
        }
    }
    Ok(())
}

/// Check whether a name is valid without describing the failure.
pub fn is_valid_name(name: &str) -> bool {
    validate_name(name).is_ok()
}
