//! Confirmation handshake for destructive tasks.
//!
//! A restore announces itself and blocks until someone confirms or
//! denies it. Requests are keyed by requester: a second request from
//! the same requester replaces the first, whose waiter then resolves as
//! declined. Nothing here times out on its own; callers bound the wait.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, warn};

/// Pending confirmation requests, keyed by requester.
#[derive(Debug, Default)]
pub struct ConfirmationManager {
    pending: RwLock<HashMap<String, oneshot::Sender<bool>>>,
}

impl ConfirmationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a confirmation request for `requester` and return the
    /// channel its answer arrives on.
    ///
    /// An earlier pending request from the same requester is dropped,
    /// which resolves its receiver as declined.
    pub async fn request(&self, requester: &str) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.write().await;
        if pending.insert(requester.to_string(), tx).is_some() {
            debug!(requester, "Replacing pending confirmation");
        } else {
            debug!(requester, "Confirmation requested");
        }
        rx
    }

    /// Answer the pending request for `requester`. Returns whether a
    /// request was actually waiting.
    pub async fn respond(&self, requester: &str, confirmed: bool) -> bool {
        let tx = self.pending.write().await.remove(requester);
        match tx {
            Some(tx) => {
                // The waiter may have given up; a closed channel is fine.
                let _ = tx.send(confirmed);
                true
            }
            None => false,
        }
    }

    /// Whether `requester` has a request waiting for an answer.
    pub async fn has_pending(&self, requester: &str) -> bool {
        self.pending.read().await.contains_key(requester)
    }

    /// Register a request and wait up to `timeout` for the answer.
    ///
    /// A timeout, a denial, and a replaced request all come back as
    /// `false`; only an explicit confirmation yields `true`.
    pub async fn wait(&self, requester: &str, timeout: Duration) -> bool {
        let rx = self.request(requester).await;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(_)) => {
                debug!(requester, "Confirmation request was replaced");
                false
            }
            Err(_) => {
                warn!(requester, "Confirmation timed out");
                false
            }
        }
    }
}
