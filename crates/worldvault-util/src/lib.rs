//! Shared utilities for worldvault.
//!
//! This crate provides common utilities used across the worldvault workspace:
//! - Snapshot name validation
//! - Human-readable byte formatting
//! - Logging setup with tracing

pub mod bytes;
pub mod log;
pub mod name;

pub use bytes::format_bytes;
pub use name::{validate_name, NameError};
