//! Host integration points around the live-tree swap.
//!
//! Replacing the live tree is only safe while the host holds no open
//! handles into it. A [`SwapHook`] brackets the restore copy: `prepare`
//! runs before the first byte of the live tree changes, `activate` runs
//! once the tree holds the restored payload. A game server would save
//! and unload the world in `prepare` and reload it in `activate`; the
//! standalone CLI has nothing to quiesce and uses [`NoopSwapHook`].
//!
//! Each restore invokes the pair exactly once, and `activate` completes
//! before any post-restore copy-back starts.

use async_trait::async_trait;

use crate::error::EngineResult;

/// Callbacks bracketing the live-tree swap during a restore.
#[async_trait]
pub trait SwapHook: Send + Sync {
    /// Quiesce the host before the live tree is rewritten.
    async fn prepare(&self) -> EngineResult<()> {
        Ok(())
    }

    /// Bring the host back up on the restored tree.
    async fn activate(&self) -> EngineResult<()> {
        Ok(())
    }
}

/// Hook for hosts with no in-process state over the live tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSwapHook;

#[async_trait]
impl SwapHook for NoopSwapHook {}
