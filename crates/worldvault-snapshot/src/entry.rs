//! A named, addressable snapshot on disk.
//!
//! An entry owns a directory laid out as:
//! ```text
//! <dir>/
//!   info.json   # serialized SnapshotInfo
//!   world/      # payload: the copied tree
//! ```
//! The entry is "materialized" once the metadata file exists and the payload
//! passes a structural check. Metadata is written last during a create, so a
//! crash mid-copy never leaves a half-written directory that passes
//! [`SnapshotEntry::exists`].

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use worldvault_fs::{
    tree_size, ExclusionPolicy, ProgressSink, TreeCopy, TreeDelete, END_DIR, NETHER_DIR,
    OVERWORLD_DIR,
};

use crate::error::{SnapshotError, SnapshotResult};
use crate::info::SnapshotInfo;

/// Name of the metadata file inside an entry directory.
pub const INFO_FILE: &str = "info.json";
/// Name of the payload subdirectory inside an entry directory.
pub const PAYLOAD_DIR: &str = "world";
/// Marker file a valid payload must contain.
pub const PAYLOAD_MARKER: &str = "level.dat";

const REGION_DIRS: [&str; 3] = [OVERWORLD_DIR, NETHER_DIR, END_DIR];

/// A snapshot entry: metadata plus the directory owning its payload.
///
/// Entries are not `Clone`; a directory must not be reachable through two
/// entries during a mutating operation. [`SnapshotEntry::retarget`] is the
/// one sanctioned way to derive a second entry, and it carries an
/// independent copy of the metadata.
#[derive(Debug)]
pub struct SnapshotEntry {
    dir: PathBuf,
    info: SnapshotInfo,
}

impl SnapshotEntry {
    /// Construct an entry over a directory that may not yet exist on disk.
    pub fn new(dir: impl Into<PathBuf>, info: SnapshotInfo) -> Self {
        Self {
            dir: dir.into(),
            info,
        }
    }

    /// Load an entry from its on-disk metadata.
    pub fn load(dir: impl Into<PathBuf>) -> SnapshotResult<Self> {
        let dir = dir.into();
        let path = dir.join(INFO_FILE);
        let raw = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SnapshotError::not_found(dir.file_name().unwrap_or_default().to_string_lossy())
            } else {
                SnapshotError::io(&path, e)
            }
        })?;
        let mut info: SnapshotInfo = serde_json::from_str(&raw)?;
        if info.live_marker && !info.locked {
            // A hand-edited metadata file cannot unlock the live slot.
            warn!(name = %info.name, "Live marker without lock, re-locking");
            info.locked = true;
        }
        Ok(Self { dir, info })
    }

    pub fn info(&self) -> &SnapshotInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The payload subdirectory holding the copied tree.
    pub fn payload_dir(&self) -> PathBuf {
        self.dir.join(PAYLOAD_DIR)
    }

    fn info_path(&self) -> PathBuf {
        self.dir.join(INFO_FILE)
    }

    /// Persist the metadata file atomically (write-temp-then-rename).
    pub fn write_info(&self) -> SnapshotResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;
        let json = serde_json::to_string_pretty(&self.info)?;
        let tmp = self.dir.join(format!("{INFO_FILE}.tmp"));
        fs::write(&tmp, json).map_err(|e| SnapshotError::io(&tmp, e))?;
        let path = self.info_path();
        fs::rename(&tmp, &path).map_err(|e| SnapshotError::io(&path, e))?;
        Ok(())
    }

    /// Whether the entry is materialized: metadata present and the payload
    /// structurally valid (marker file plus at least one region directory).
    /// Guards against treating a partially-written or foreign directory as
    /// a snapshot.
    pub fn exists(&self) -> bool {
        self.info_path().is_file() && self.payload_valid()
    }

    fn payload_valid(&self) -> bool {
        let payload = self.payload_dir();
        payload.is_dir()
            && payload.join(PAYLOAD_MARKER).is_file()
            && REGION_DIRS.iter().any(|d| payload.join(d).is_dir())
    }

    /// True iff both entries resolve to the same directory.
    pub fn collides(&self, other: &SnapshotEntry) -> bool {
        self.dir == other.dir
    }

    /// Capture `source` into this entry's payload, then persist metadata
    /// with the copied byte total. On failure the entry must be treated as
    /// not materialized; nothing is rolled back.
    pub fn create(
        &mut self,
        source: &Path,
        policy: &ExclusionPolicy,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> SnapshotResult<u64> {
        fs::create_dir_all(&self.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;
        let copied = TreeCopy::new(source, self.payload_dir())
            .with_policy(policy.clone())
            .with_progress(sink)
            .with_cancel(cancel)
            .run()?;
        self.info.size_bytes = Some(copied);
        self.write_info()?;
        info!(name = %self.info.name, bytes = copied, "Created snapshot");
        Ok(copied)
    }

    /// Copy the payload into `dest`. Does not mutate metadata.
    pub fn restore(
        &self,
        dest: &Path,
        policy: &ExclusionPolicy,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> SnapshotResult<u64> {
        if !self.exists() {
            return Err(SnapshotError::NotMaterialized(self.info.name.clone()));
        }
        let mut copy = TreeCopy::new(self.payload_dir(), dest)
            .with_policy(policy.clone())
            .with_progress(sink)
            .with_cancel(cancel);
        if let Some(total) = self.info.size_bytes {
            copy = copy.with_expected_total(total);
        }
        let copied = copy.run()?;
        info!(name = %self.info.name, bytes = copied, "Restored snapshot");
        Ok(copied)
    }

    /// Recursively delete the entry directory. Fails on a locked entry
    /// without touching the disk.
    pub fn delete(
        &self,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> SnapshotResult<()> {
        if self.info.locked {
            return Err(SnapshotError::locked(&self.info.name));
        }
        TreeDelete::new(&self.dir)
            .with_progress(sink)
            .with_cancel(cancel)
            .run()?;
        info!(name = %self.info.name, "Deleted snapshot");
        Ok(())
    }

    /// Replace `other`'s directory with this entry's directory via rename.
    ///
    /// The lock on `other` is checked before anything is touched; on a
    /// locked target neither directory is modified. The returned entry
    /// lives at the target directory and takes over the target's name. A
    /// non-atomic rename (cross-device) surfaces as an IO error; this
    /// operation never falls back to copying.
    pub fn rename_over(mut self, other: &SnapshotEntry) -> SnapshotResult<SnapshotEntry> {
        if other.info.locked {
            return Err(SnapshotError::locked(&other.info.name));
        }
        if self.collides(other) {
            return Ok(self);
        }
        if other.dir.exists() {
            fs::remove_dir_all(&other.dir).map_err(|e| SnapshotError::io(&other.dir, e))?;
        }
        fs::rename(&self.dir, &other.dir).map_err(|e| SnapshotError::io(&self.dir, e))?;
        self.dir = other.dir.clone();
        self.info.name = other.info.name.clone();
        self.write_info()?;
        Ok(self)
    }

    /// Copy this entry's payload into `other`, materializing it.
    pub fn copy_to(
        &self,
        other: &mut SnapshotEntry,
        policy: &ExclusionPolicy,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationToken,
    ) -> SnapshotResult<u64> {
        other.create(&self.payload_dir(), policy, sink, cancel)
    }

    /// Derive a staging entry at `new_dir` carrying an independent copy of
    /// this entry's metadata. Mutations of either entry afterwards do not
    /// affect the other.
    pub fn retarget(&self, new_dir: impl Into<PathBuf>) -> SnapshotEntry {
        SnapshotEntry {
            dir: new_dir.into(),
            info: self.info.clone(),
        }
    }

    /// The payload size in bytes, scanning and persisting it on first use.
    ///
    /// A snapshot created through [`SnapshotEntry::create`] already knows
    /// its size; the scan only happens for metadata predating the copy or
    /// written by other tools.
    pub fn total_size(&mut self) -> SnapshotResult<u64> {
        if let Some(size) = self.info.size_bytes {
            return Ok(size);
        }
        let size = tree_size(&self.payload_dir())?;
        self.info.size_bytes = Some(size);
        self.write_info()?;
        Ok(size)
    }

    /// Toggle the deletion lock. The live slot cannot be unlocked.
    pub fn set_locked(&mut self, locked: bool) -> SnapshotResult<()> {
        if self.info.live_marker && !locked {
            return Err(SnapshotError::locked(&self.info.name));
        }
        self.info.locked = locked;
        self.write_info()
    }
}

impl PartialEq for SnapshotEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SnapshotEntry {}

impl PartialOrd for SnapshotEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SnapshotEntry {
    /// Newest first, ties broken by name for a total order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .info
            .date
            .cmp(&self.info.date)
            .then_with(|| self.info.name.cmp(&other.info.name))
    }
}
