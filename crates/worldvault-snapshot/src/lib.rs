//! Snapshot entries and storage for worldvault.
//!
//! A snapshot is a named, timestamped full copy of the managed world tree.
//! [`SnapshotEntry`] owns one snapshot's directory and metadata and exposes
//! the create/restore/delete/rename operations built on the tree primitives
//! in `worldvault-fs`; [`SnapshotStore`] enumerates entries under the backup
//! root. Everything here is synchronous; the engine layer runs these
//! operations on blocking workers.

pub mod entry;
pub mod error;
pub mod info;
pub mod store;

pub use entry::{SnapshotEntry, INFO_FILE, PAYLOAD_DIR, PAYLOAD_MARKER};
pub use error::{SnapshotError, SnapshotResult};
pub use info::SnapshotInfo;
pub use store::SnapshotStore;
