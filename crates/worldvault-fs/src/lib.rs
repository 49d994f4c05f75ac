//! Filtered tree copy and delete primitives for worldvault.
//!
//! This crate is fully synchronous; callers that live in an async context
//! run these operations on a blocking worker. It provides:
//! - [`TreeCopy`] and [`TreeDelete`], pre-order copy and contents-first
//!   delete over `walkdir`
//! - [`ExclusionPolicy`], glob patterns plus a dimension mask deciding
//!   which entries an operation skips
//! - [`ProgressSink`], the seam through which operations report progress

pub mod copy;
pub mod error;
pub mod exclude;
pub mod progress;

pub use copy::{tree_size, TreeCopy, TreeDelete};
pub use error::{CopyError, CopyResult};
pub use exclude::{DimensionMask, ExclusionPolicy, END_DIR, NETHER_DIR, OVERWORLD_DIR};
pub use progress::{LogSink, NullSink, ProgressSink};
