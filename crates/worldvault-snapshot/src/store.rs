//! Snapshot storage: the directory of entries under a backup root.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use worldvault_fs::NullSink;
use worldvault_util::validate_name;

use crate::entry::SnapshotEntry;
use crate::error::{SnapshotError, SnapshotResult};
use crate::info::SnapshotInfo;

/// Enumerates, creates, and locates snapshot entries by name.
///
/// Layout:
/// ```text
/// base_dir/
///   <name>/            # one directory per snapshot
///     info.json
///     world/
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    base_dir: PathBuf,
}

impl SnapshotStore {
    /// Open a store rooted at `base_dir`, creating the directory if needed.
    pub fn open(base_dir: impl Into<PathBuf>) -> SnapshotResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| SnapshotError::io(&base_dir, e))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The directory a snapshot with this name would occupy.
    ///
    /// Fails if the name is unusable as a path segment.
    pub fn entry_dir(&self, name: &str) -> SnapshotResult<PathBuf> {
        validate_name(name).map_err(|e| SnapshotError::invalid_name(name, e))?;
        Ok(self.base_dir.join(name))
    }

    /// List all entries, newest first. Directories with unreadable or
    /// corrupt metadata are skipped with a warning rather than failing the
    /// whole listing.
    pub fn list(&self) -> SnapshotResult<Vec<SnapshotEntry>> {
        let mut entries = Vec::new();
        let read_dir =
            fs::read_dir(&self.base_dir).map_err(|e| SnapshotError::io(&self.base_dir, e))?;
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| SnapshotError::io(&self.base_dir, e))?;
            let path = dir_entry.path();
            if !path.is_dir() {
                continue;
            }
            match SnapshotEntry::load(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable entry"),
            }
        }
        entries.sort();
        Ok(entries)
    }

    /// Look up a materialized entry by name.
    pub fn get(&self, name: &str) -> SnapshotResult<SnapshotEntry> {
        let dir = self.entry_dir(name)?;
        if !dir.join(crate::entry::INFO_FILE).exists() {
            return Err(SnapshotError::not_found(name));
        }
        SnapshotEntry::load(dir)
    }

    /// Prepare a fresh entry for `name`. The entry is not materialized
    /// until [`SnapshotEntry::create`] runs.
    ///
    /// With `overwrite` false an already-materialized entry of the same
    /// name is an error. With `overwrite` true the old payload is removed
    /// first, unless the existing entry is locked.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        overwrite: bool,
    ) -> SnapshotResult<SnapshotEntry> {
        let dir = self.entry_dir(name)?;
        if let Ok(existing) = SnapshotEntry::load(&dir) {
            if existing.exists() {
                if !overwrite {
                    return Err(SnapshotError::AlreadyExists(name.to_string()));
                }
                existing.delete(Arc::new(NullSink), CancellationToken::new())?;
                debug!(name, "Replacing existing snapshot");
            }
        }
        Ok(SnapshotEntry::new(dir, SnapshotInfo::new(name, description)))
    }

    /// The locked pseudo-entry archiving the live tree's previous state.
    ///
    /// Its metadata is rebuilt on every capture; whatever was stored by the
    /// last capture remains visible in listings until then.
    pub fn live_entry(&self, name: &str, description: &str) -> SnapshotResult<SnapshotEntry> {
        let dir = self.entry_dir(name)?;
        Ok(SnapshotEntry::new(dir, SnapshotInfo::live(name, description)))
    }

    /// Delete unlocked snapshots beyond the `keep` newest. Returns the
    /// names of the deleted entries.
    pub fn prune(&self, keep: usize) -> SnapshotResult<Vec<String>> {
        let mut deleted = Vec::new();
        let prunable: Vec<SnapshotEntry> = self
            .list()?
            .into_iter()
            .filter(|e| !e.info().locked && !e.info().live_marker)
            .collect();

        for entry in prunable.into_iter().skip(keep) {
            match entry.delete(Arc::new(NullSink), CancellationToken::new()) {
                Ok(()) => deleted.push(entry.name().to_string()),
                Err(e) => warn!(name = %entry.name(), error = %e, "Failed to prune snapshot"),
            }
        }
        if !deleted.is_empty() {
            info!(count = deleted.len(), "Pruned snapshots");
        }
        Ok(deleted)
    }
}
