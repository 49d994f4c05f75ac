//! Recursive tree copy and delete.
//!
//! [`TreeCopy`] walks the source pre-order so destination directories exist
//! before their contents arrive; an interrupted copy leaves a valid partial
//! skeleton. [`TreeDelete`] walks contents-first so directories are empty by
//! the time they are removed. Both abort on the first error and never roll
//! back; the caller decides what to do with a half-written destination.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::{CopyError, CopyResult};
use crate::exclude::ExclusionPolicy;
use crate::progress::{NullSink, ProgressSink};

/// Recursive, filtered copy of a directory tree.
pub struct TreeCopy {
    source: PathBuf,
    dest: PathBuf,
    policy: ExclusionPolicy,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    expected_total: Option<u64>,
}

impl TreeCopy {
    pub fn new(source: impl Into<PathBuf>, dest: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            policy: ExclusionPolicy::new(),
            progress: Arc::new(NullSink),
            cancel: CancellationToken::new(),
            expected_total: None,
        }
    }

    /// Skip entries the policy excludes. Excluded directories are pruned
    /// as whole subtrees.
    pub fn with_policy(mut self, policy: ExclusionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Abort with [`CopyError::Cancelled`] once `token` is cancelled. The
    /// token is checked between entries, so cancellation takes effect at
    /// the next file boundary.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Expected total byte count, forwarded to the progress sink.
    pub fn with_expected_total(mut self, total: u64) -> Self {
        self.expected_total = Some(total);
        self
    }

    /// Run the copy, returning the cumulative number of bytes copied.
    pub fn run(&self) -> CopyResult<u64> {
        let result = self.copy_tree();
        self.progress.done();
        result
    }

    fn copy_tree(&self) -> CopyResult<u64> {
        fs::create_dir_all(&self.dest).map_err(|e| CopyError::io(&self.dest, e))?;

        let mut copied = 0u64;
        let walker = WalkDir::new(&self.source)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| match entry.path().strip_prefix(&self.source) {
                Ok(rel) => !self.policy.should_exclude(rel, entry.file_type().is_dir()),
                Err(_) => true,
            });

        for entry in walker {
            if self.cancel.is_cancelled() {
                return Err(CopyError::Cancelled);
            }
            let entry = entry?;
            let rel = match entry.path().strip_prefix(&self.source) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let target = self.dest.join(rel);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|e| CopyError::io(&target, e))?;
            } else {
                copied += fs::copy(entry.path(), &target)
                    .map_err(|e| CopyError::io(entry.path(), e))?;
            }
            self.progress
                .on_progress(copied, self.expected_total, &rel.to_string_lossy());
        }
        Ok(copied)
    }
}

/// Recursive delete of a directory tree, including the root.
///
/// A missing root is a no-op.
pub struct TreeDelete {
    root: PathBuf,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl TreeDelete {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            progress: Arc::new(NullSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the delete. Progress reports the number of entries removed.
    pub fn run(&self) -> CopyResult<()> {
        let result = self.delete_tree();
        self.progress.done();
        result
    }

    fn delete_tree(&self) -> CopyResult<()> {
        if !self.root.exists() {
            return Ok(());
        }

        let mut removed = 0u64;
        for entry in WalkDir::new(&self.root).contents_first(true).follow_links(false) {
            if self.cancel.is_cancelled() {
                return Err(CopyError::Cancelled);
            }
            let entry = entry?;
            if entry.file_type().is_dir() {
                fs::remove_dir(entry.path()).map_err(|e| CopyError::io(entry.path(), e))?;
            } else {
                fs::remove_file(entry.path()).map_err(|e| CopyError::io(entry.path(), e))?;
            }
            removed += 1;
            let label = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or_else(|_| entry.path());
            self.progress
                .on_progress(removed, None, &label.to_string_lossy());
        }
        Ok(())
    }
}

/// Total size in bytes of all regular files under `root`.
pub fn tree_size(root: &Path) -> CopyResult<u64> {
    let mut total = 0u64;
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}
