//! Progress reporting for tree operations.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Receives progress updates from a running tree operation.
///
/// Implementations must be cheap: `on_progress` is invoked after every
/// visited entry, so anything expensive (rendering, logging) should
/// throttle itself the way [`LogSink`] does.
pub trait ProgressSink: Send + Sync {
    /// Called after each visited entry.
    ///
    /// `current` is cumulative: bytes copied so far for copies, entries
    /// removed so far for deletes. `total` is the expected final value
    /// when the caller knows it up front. `label` names the entry just
    /// processed, relative to the tree root.
    fn on_progress(&self, current: u64, total: Option<u64>, label: &str);

    /// Called exactly once when the operation finishes, whether it
    /// succeeded, failed, or was cancelled.
    fn done(&self) {}
}

/// Sink that discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _current: u64, _total: Option<u64>, _label: &str) {}
}

/// Sink that logs throttled progress through tracing.
#[derive(Debug)]
pub struct LogSink {
    min_interval: Duration,
    last_emit: Mutex<Option<Instant>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::with_interval(Duration::from_secs(2))
    }

    /// A sink that emits at most one log line per `min_interval`.
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_emit: Mutex::new(None),
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for LogSink {
    fn on_progress(&self, current: u64, total: Option<u64>, label: &str) {
        let Ok(mut last) = self.last_emit.lock() else {
            return;
        };
        let now = Instant::now();
        let due = last.map_or(true, |t| now.duration_since(t) >= self.min_interval);
        if due {
            *last = Some(now);
            info!(current, total, entry = %label, "Progress");
        }
    }

    fn done(&self) {
        debug!("Tree operation finished");
    }
}
