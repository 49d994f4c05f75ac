//! Task orchestration for worldvault.
//!
//! Everything stateful lives here: the [`Engine`] owning one instance
//! root, the single-flight [`TaskCoordinator`], the confirmation
//! handshake for restores, and the [`SwapHook`] seam hosts implement
//! to quiesce themselves around the live-tree swap.
//!
//! The snapshot and filesystem layers underneath are synchronous; the
//! engine runs them on blocking workers and exposes an async surface.

pub mod config;
pub mod confirm;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod hook;

pub use config::{Config, CONFIG_FILE};
pub use confirm::ConfirmationManager;
pub use coordinator::{TaskCoordinator, TaskPermit, TaskState};
pub use engine::{BackupOptions, Engine, RestoreOptions, RestoreOutcome};
pub use error::{EngineError, EngineResult};
pub use hook::{NoopSwapHook, SwapHook};
