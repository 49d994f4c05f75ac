//! Single-flight task coordination.
//!
//! At most one mutating task (backup, restore, delete, rename, prune)
//! runs at a time. The slot is claimed with a compare-and-swap on an
//! atomic state and held by a [`TaskPermit`] that releases it on drop,
//! so every exit path of a pipeline, including panics in blocking
//! workers, returns the coordinator to idle.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Interval between countdown ticks.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle of the single task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// No task is running.
    Idle = 0,
    /// A task claimed the slot and is preparing.
    Requested = 1,
    /// The pre-execution countdown is running.
    CountingDown = 2,
    /// The task is mutating the tree.
    Executing = 3,
}

impl TaskState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Requested,
            2 => Self::CountingDown,
            3 => Self::Executing,
            _ => Self::Idle,
        }
    }
}

/// Serializes mutating tasks and drives the restore countdown.
#[derive(Debug, Default)]
pub struct TaskCoordinator {
    state: AtomicU8,
    owner: Mutex<Option<String>>,
}

impl TaskCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current slot state.
    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Who holds the slot, if anyone.
    pub fn owner(&self) -> Option<String> {
        self.owner.lock().ok().and_then(|guard| guard.clone())
    }

    /// Claim the task slot for `owner`.
    ///
    /// Fails with [`EngineError::Busy`] when any task already holds it.
    /// The returned permit releases the slot when dropped.
    pub fn try_begin(self: &Arc<Self>, owner: &str) -> EngineResult<TaskPermit> {
        let claimed = self
            .state
            .compare_exchange(
                TaskState::Idle as u8,
                TaskState::Requested as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !claimed {
            let holder = self.owner().unwrap_or_else(|| "another task".to_string());
            return Err(EngineError::busy(holder));
        }
        if let Ok(mut guard) = self.owner.lock() {
            *guard = Some(owner.to_string());
        }
        debug!(owner, "Task slot acquired");
        Ok(TaskPermit {
            coordinator: Arc::clone(self),
        })
    }

    /// Move the slot from `from` to `to`. Returns whether the transition
    /// applied; a slot in any other state is left untouched.
    pub fn advance(&self, from: TaskState, to: TaskState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Run the pre-execution countdown: one tick per second carrying the
    /// remaining count, from `seconds` down to 1.
    ///
    /// Resolves `true` when the countdown ran to completion and the slot
    /// is in [`TaskState::Executing`]. Cancellation resolves `false`
    /// without further ticks. Zero seconds skips straight to executing.
    pub async fn countdown<F>(&self, seconds: u32, cancel: &CancellationToken, mut on_tick: F) -> bool
    where
        F: FnMut(u32),
    {
        self.advance(TaskState::Requested, TaskState::CountingDown);
        for remaining in (1..=seconds).rev() {
            if cancel.is_cancelled() {
                return false;
            }
            on_tick(remaining);
            if !sleep_with_cancel(TICK_INTERVAL, cancel).await {
                return false;
            }
        }
        if cancel.is_cancelled() {
            return false;
        }
        self.advance(TaskState::CountingDown, TaskState::Executing);
        true
    }

    fn finish(&self) {
        self.state.store(TaskState::Idle as u8, Ordering::SeqCst);
        if let Ok(mut guard) = self.owner.lock() {
            *guard = None;
        }
        debug!("Task slot released");
    }
}

/// Exclusive hold on the task slot.
///
/// Dropping the permit returns the coordinator to [`TaskState::Idle`]
/// and clears the owner.
#[must_use]
#[derive(Debug)]
pub struct TaskPermit {
    coordinator: Arc<TaskCoordinator>,
}

impl TaskPermit {
    /// Release the slot now instead of at end of scope.
    pub fn end(self) {}
}

impl Drop for TaskPermit {
    fn drop(&mut self) {
        self.coordinator.finish();
    }
}

/// Sleep for `duration`, resolving `false` early if the token fires.
async fn sleep_with_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn permit_releases_slot_on_drop() {
        let coordinator = Arc::new(TaskCoordinator::new());
        let permit = coordinator.try_begin("alice").unwrap();
        assert_eq!(coordinator.state(), TaskState::Requested);
        assert_eq!(coordinator.owner().as_deref(), Some("alice"));

        permit.end();
        assert_eq!(coordinator.state(), TaskState::Idle);
        assert_eq!(coordinator.owner(), None);

        let again = coordinator.try_begin("alice").unwrap();
        drop(again);
    }

    #[tokio::test]
    async fn second_claim_reports_holder() {
        let coordinator = Arc::new(TaskCoordinator::new());
        let _permit = coordinator.try_begin("alice").unwrap();

        let err = coordinator.try_begin("bob").unwrap_err();
        match err {
            EngineError::Busy { owner } => assert_eq!(owner, "alice"),
            other => panic!("expected busy, got {other}"),
        }
    }

    #[tokio::test]
    async fn concurrent_claims_admit_exactly_one() {
        let coordinator = Arc::new(TaskCoordinator::new());
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();
        for i in 0..8 {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                let claimed = coordinator.try_begin(&format!("worker-{i}"));
                // Hold the slot until every task has attempted a claim.
                barrier.wait().await;
                claimed.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(coordinator.state(), TaskState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_from_n_to_one() {
        let coordinator = TaskCoordinator::new();
        let cancel = CancellationToken::new();
        let mut ticks = Vec::new();

        let done = coordinator
            .countdown(3, &cancel, |remaining| ticks.push(remaining))
            .await;
        assert!(done);
        assert_eq!(ticks, vec![3, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_stops_at_cancellation() {
        let coordinator = TaskCoordinator::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut ticks = Vec::new();

        let done = coordinator
            .countdown(5, &cancel, |remaining| {
                ticks.push(remaining);
                if remaining == 4 {
                    trigger.cancel();
                }
            })
            .await;
        assert!(!done);
        assert_eq!(ticks, vec![5, 4]);
    }

    #[tokio::test]
    async fn cancelled_countdown_emits_no_ticks() {
        let coordinator = TaskCoordinator::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ticks = Vec::new();

        let done = coordinator
            .countdown(5, &cancel, |remaining| ticks.push(remaining))
            .await;
        assert!(!done);
        assert!(ticks.is_empty());
    }

    #[tokio::test]
    async fn zero_second_countdown_skips_to_executing() {
        let coordinator = Arc::new(TaskCoordinator::new());
        let permit = coordinator.try_begin("alice").unwrap();
        let cancel = CancellationToken::new();

        let done = coordinator.countdown(0, &cancel, |_| {}).await;
        assert!(done);
        assert_eq!(coordinator.state(), TaskState::Executing);

        permit.end();
        assert_eq!(coordinator.state(), TaskState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_walks_the_state_machine() {
        let coordinator = Arc::new(TaskCoordinator::new());
        let permit = coordinator.try_begin("alice").unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(coordinator.state(), TaskState::Requested);

        let states = Arc::clone(&coordinator);
        let mut seen = Vec::new();
        let done = coordinator
            .countdown(2, &cancel, |_| seen.push(states.state()))
            .await;
        assert!(done);
        assert_eq!(seen, vec![TaskState::CountingDown, TaskState::CountingDown]);
        assert_eq!(coordinator.state(), TaskState::Executing);

        permit.end();
        assert_eq!(coordinator.state(), TaskState::Idle);
    }
}
