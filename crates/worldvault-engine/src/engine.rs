//! Snapshot pipelines over a single world instance.
//!
//! The [`Engine`] ties the pieces together: the store under
//! `backup_dir`, the live tree under `world_dir`, the single-flight
//! coordinator, the confirmation handshake, and the host swap hook.
//! Copies run on blocking workers so the async surface stays
//! responsive while trees are walked.
//!
//! A restore archives the live tree into the locked live-slot entry
//! before overwriting anything, so the state being replaced is always
//! recoverable. Restoring the live slot itself would make the capture
//! overwrite its own source; that case is staged through a temporary
//! directory and copied back into the slot once the swap is done.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use worldvault_fs::{DimensionMask, ExclusionPolicy, NullSink, ProgressSink, TreeDelete};
use worldvault_snapshot::{SnapshotEntry, SnapshotError, SnapshotInfo, SnapshotStore};

use crate::config::Config;
use crate::confirm::ConfirmationManager;
use crate::coordinator::{TaskCoordinator, TaskState};
use crate::error::{EngineError, EngineResult};
use crate::hook::{NoopSwapHook, SwapHook};

/// How a restore request ended. Declines and cancellations are normal
/// outcomes, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The live tree now holds the selected snapshot's payload.
    Completed,
    /// The confirmation was denied, timed out, or was superseded.
    Declined,
    /// Cancelled during capture, countdown, or copy.
    Cancelled,
}

/// Options for [`Engine::backup`].
pub struct BackupOptions {
    /// Replace an existing snapshot of the same name.
    pub overwrite: bool,
    /// Who is asking; shown to others while the task slot is held.
    pub requester: String,
    /// Receives copy progress.
    pub progress: Arc<dyn ProgressSink>,
    /// Aborts the copy when fired.
    pub cancel: CancellationToken,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            requester: "local".to_string(),
            progress: Arc::new(NullSink),
            cancel: CancellationToken::new(),
        }
    }
}

/// Options for [`Engine::restore`].
pub struct RestoreOptions {
    /// Restrict the restore copy to these dimensions. Files outside the
    /// selected dimension directories keep their live state.
    pub mask: DimensionMask,
    /// Override the configured countdown length.
    pub countdown_seconds: Option<u32>,
    /// Skip the confirmation handshake entirely.
    pub skip_confirmation: bool,
    /// Called once per countdown tick with the remaining seconds.
    pub on_tick: Option<Box<dyn FnMut(u32) + Send>>,
    /// Who is asking; also the confirmation key.
    pub requester: String,
    /// Receives copy progress for the capture and restore copies.
    pub progress: Arc<dyn ProgressSink>,
    /// Aborts the countdown and the copies when fired.
    pub cancel: CancellationToken,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            mask: DimensionMask::ALL,
            countdown_seconds: None,
            skip_confirmation: false,
            on_tick: None,
            requester: "local".to_string(),
            progress: Arc::new(NullSink),
            cancel: CancellationToken::new(),
        }
    }
}

/// Orchestrates snapshot tasks for one instance root.
pub struct Engine {
    root: PathBuf,
    config: Config,
    store: SnapshotStore,
    coordinator: Arc<TaskCoordinator>,
    confirmations: ConfirmationManager,
    hook: Arc<dyn SwapHook>,
}

impl Engine {
    /// Open an engine at `root`, loading `worldvault.json` if present.
    pub async fn open(root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        let config = Config::load(&root).await?;
        Self::with_config(root, config)
    }

    /// Open an engine with an explicit configuration.
    pub fn with_config(root: impl Into<PathBuf>, config: Config) -> EngineResult<Self> {
        let root = root.into();
        let store = SnapshotStore::open(config.backup_path(&root))?;
        let engine = Self {
            root,
            config,
            store,
            coordinator: Arc::new(TaskCoordinator::new()),
            confirmations: ConfirmationManager::new(),
            hook: Arc::new(NoopSwapHook),
        };
        engine.sweep_stale_staging();
        Ok(engine)
    }

    /// Replace the swap hook. Call before any restore runs.
    pub fn with_hook(mut self, hook: Arc<dyn SwapHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<TaskCoordinator> {
        &self.coordinator
    }

    pub fn confirmations(&self) -> &ConfirmationManager {
        &self.confirmations
    }

    /// The live world directory.
    pub fn live_dir(&self) -> PathBuf {
        self.config.world_path(&self.root)
    }

    fn staging_dir(&self) -> PathBuf {
        self.config.staging_path(&self.root)
    }

    fn policy(&self, mask: DimensionMask) -> EngineResult<ExclusionPolicy> {
        Ok(ExclusionPolicy::compile(&self.config.excludes)?.with_mask(mask))
    }

    /// List all snapshots, newest first.
    pub async fn list(&self) -> EngineResult<Vec<SnapshotEntry>> {
        let store = self.store.clone();
        Ok(task::spawn_blocking(move || store.list()).await??)
    }

    /// Look up one snapshot, scanning its payload size if the metadata
    /// does not carry it yet.
    pub async fn get(&self, name: &str) -> EngineResult<SnapshotEntry> {
        let store = self.store.clone();
        let name = name.to_string();
        Ok(task::spawn_blocking(move || {
            let mut entry = store.get(&name)?;
            if let Err(e) = entry.total_size() {
                warn!(name = %entry.name(), error = %e, "Could not determine snapshot size");
            }
            Ok::<_, SnapshotError>(entry)
        })
        .await??)
    }

    /// Capture the live tree into a snapshot named `name`.
    ///
    /// Returns the number of payload bytes copied. A half-written entry
    /// left by a failed or cancelled copy is discarded.
    pub async fn backup(
        &self,
        name: &str,
        description: &str,
        opts: BackupOptions,
    ) -> EngineResult<u64> {
        if name == self.config.live_name {
            return Err(SnapshotError::locked(name).into());
        }
        let permit = self.coordinator.try_begin(&opts.requester)?;
        self.coordinator
            .advance(TaskState::Requested, TaskState::Executing);

        let entry = self.store.create(name, description, opts.overwrite)?;
        info!(name, "Backup started");

        let source = self.live_dir();
        let policy = self.policy(DimensionMask::ALL)?;
        let result = task::spawn_blocking(move || {
            let mut entry = entry;
            entry.create(&source, &policy, opts.progress, opts.cancel)
        })
        .await?;

        let copied = match result {
            Ok(copied) => copied,
            Err(e) => {
                self.discard_entry(name).await;
                return Err(e.into());
            }
        };

        if self.config.max_snapshots > 0 {
            let store = self.store.clone();
            let keep = self.config.max_snapshots;
            match task::spawn_blocking(move || store.prune(keep)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Retention pruning failed"),
                Err(e) => warn!(error = %e, "Retention pruning failed"),
            }
        }

        permit.end();
        Ok(copied)
    }

    /// Restore a snapshot into the live tree.
    ///
    /// The full pipeline: confirmation (unless skipped), claiming the
    /// task slot, archiving the live tree into the live-slot entry,
    /// the countdown, the hook-bracketed swap copy, and the staged
    /// copy-back when the selected snapshot is the live slot itself.
    pub async fn restore(&self, name: &str, opts: RestoreOptions) -> EngineResult<RestoreOutcome> {
        let selected = self.store.get(name)?;
        if !selected.exists() {
            return Err(SnapshotError::NotMaterialized(name.to_string()).into());
        }

        if !opts.skip_confirmation {
            let timeout = Duration::from_secs(self.config.confirm_timeout_seconds);
            if !self.confirmations.wait(&opts.requester, timeout).await {
                info!(name, "Restore declined");
                return Ok(RestoreOutcome::Declined);
            }
        }

        let permit = self.coordinator.try_begin(&opts.requester)?;
        info!(name, "Restore started");

        let outcome = self.run_restore(selected, opts).await;

        // Whatever happened above, no staging directory survives the task.
        self.remove_staging().await;
        permit.end();

        match &outcome {
            Ok(RestoreOutcome::Completed) => info!(name, "Restore completed"),
            Ok(RestoreOutcome::Cancelled) => info!(name, "Restore cancelled"),
            Ok(RestoreOutcome::Declined) => {}
            Err(e) => warn!(name, error = %e, "Restore failed"),
        }
        outcome
    }

    async fn run_restore(
        &self,
        selected: SnapshotEntry,
        mut opts: RestoreOptions,
    ) -> EngineResult<RestoreOutcome> {
        let live_slot = self
            .store
            .live_entry(&self.config.live_name, &self.config.live_description)?;
        let staged = selected.collides(&live_slot);
        let capture_target = if staged {
            debug!("Selected snapshot is the live slot; staging the capture");
            live_slot.retarget(self.staging_dir())
        } else {
            live_slot
        };

        // Archive the current live state before anything is overwritten.
        // The previous archive is cleared first so the slot ends up
        // holding exactly this capture.
        let live_dir = self.live_dir();
        let capture_policy = self.policy(DimensionMask::ALL)?;
        let progress = Arc::clone(&opts.progress);
        let cancel = opts.cancel.clone();
        let (capture, capture_result) = task::spawn_blocking(move || {
            let mut target = capture_target;
            let result = match TreeDelete::new(target.dir()).run() {
                Ok(()) => target.create(&live_dir, &capture_policy, progress, cancel),
                Err(e) => Err(e.into()),
            };
            (target, result)
        })
        .await?;
        if let Err(e) = capture_result {
            if e.is_cancelled() {
                return Ok(RestoreOutcome::Cancelled);
            }
            return Err(e.into());
        }

        let seconds = opts
            .countdown_seconds
            .unwrap_or(self.config.countdown_seconds);
        let mut on_tick = opts
            .on_tick
            .take()
            .unwrap_or_else(|| Box::new(|remaining| info!(remaining, "Restore countdown")));
        let go = self
            .coordinator
            .countdown(seconds, &opts.cancel, |remaining| on_tick(remaining))
            .await;
        if !go {
            return Ok(RestoreOutcome::Cancelled);
        }

        self.hook.prepare().await?;

        let restore_policy = self.policy(opts.mask)?;
        let live_dir = self.live_dir();
        let progress = Arc::clone(&opts.progress);
        let cancel = opts.cancel.clone();
        let copy_result =
            task::spawn_blocking(move || selected.restore(&live_dir, &restore_policy, progress, cancel))
                .await?;
        match copy_result {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => return Ok(RestoreOutcome::Cancelled),
            Err(e) => return Err(e.into()),
        }

        self.hook.activate().await?;

        if staged {
            self.copy_back(capture, opts.progress).await?;
        }
        Ok(RestoreOutcome::Completed)
    }

    /// Move a staged capture into the live-slot entry. The slot payload
    /// is cleared first so the slot ends up holding exactly the staged
    /// state. Runs to completion even if the task was cancelled by then;
    /// stopping here would lose the only copy of the pre-restore state.
    async fn copy_back(
        &self,
        capture: SnapshotEntry,
        progress: Arc<dyn ProgressSink>,
    ) -> EngineResult<()> {
        let live_slot = self
            .store
            .live_entry(&self.config.live_name, &self.config.live_description)?;
        let slot_dir = live_slot.dir().to_path_buf();
        task::spawn_blocking(move || {
            TreeDelete::new(&slot_dir).run()?;
            let mut live_slot = live_slot;
            capture.copy_to(
                &mut live_slot,
                &ExclusionPolicy::new(),
                progress,
                CancellationToken::new(),
            )
        })
        .await??;
        debug!("Staged capture copied back into the live slot");
        Ok(())
    }

    /// Delete a snapshot. Fails on the locked live slot and on any
    /// entry locked by hand.
    pub async fn delete(&self, name: &str, requester: &str) -> EngineResult<()> {
        let entry = self.store.get(name)?;
        let permit = self.coordinator.try_begin(requester)?;
        self.coordinator
            .advance(TaskState::Requested, TaskState::Executing);

        let result =
            task::spawn_blocking(move || entry.delete(Arc::new(NullSink), CancellationToken::new()))
                .await?;
        permit.end();
        result?;
        Ok(())
    }

    /// Rename `old` to `new`, replacing an unlocked snapshot already
    /// holding the target name.
    ///
    /// The rename is a directory move. When the move is not atomic on the
    /// underlying filesystem (cross-device), the entry is copied to the
    /// target and the source directory removed instead.
    pub async fn rename(&self, old: &str, new: &str, requester: &str) -> EngineResult<()> {
        if new == self.config.live_name {
            return Err(SnapshotError::locked(new).into());
        }
        let source = self.store.get(old)?;
        if source.info().live_marker {
            return Err(SnapshotError::locked(old).into());
        }
        let target = match self.store.get(new) {
            Ok(existing) => existing,
            Err(SnapshotError::NotFound(_)) => {
                SnapshotEntry::new(self.store.entry_dir(new)?, SnapshotInfo::new(new, ""))
            }
            Err(e) => return Err(e.into()),
        };

        let permit = self.coordinator.try_begin(requester)?;
        self.coordinator
            .advance(TaskState::Requested, TaskState::Executing);
        let result = task::spawn_blocking(move || source.rename_over(&target)).await?;
        let renamed = match result {
            Ok(renamed) => renamed,
            Err(e @ SnapshotError::Io { .. }) => {
                warn!(old, new, error = %e, "Rename was not atomic, copying instead");
                self.rename_by_copy(old, new).await?
            }
            Err(e) => return Err(e.into()),
        };
        permit.end();
        info!(old, new = %renamed.name(), "Renamed snapshot");
        Ok(())
    }

    /// Copy-and-delete fallback for a failed directory move. The metadata
    /// travels with the entry; only the name changes.
    async fn rename_by_copy(&self, old: &str, new: &str) -> EngineResult<SnapshotEntry> {
        let store = self.store.clone();
        let old = old.to_string();
        let new = new.to_string();
        Ok(task::spawn_blocking(move || {
            let source = store.get(&old)?;
            let mut info = source.info().clone();
            info.name = new.clone();
            let mut target = SnapshotEntry::new(store.entry_dir(&new)?, info);
            source.copy_to(
                &mut target,
                &ExclusionPolicy::new(),
                Arc::new(NullSink),
                CancellationToken::new(),
            )?;
            // The lock state moved with the metadata; removing the source
            // directory completes the move rather than deleting a snapshot.
            TreeDelete::new(source.dir()).run()?;
            Ok::<_, SnapshotError>(target)
        })
        .await??)
    }

    /// Delete unlocked snapshots beyond the `keep` newest. Returns the
    /// deleted names.
    pub async fn prune(&self, keep: usize, requester: &str) -> EngineResult<Vec<String>> {
        let permit = self.coordinator.try_begin(requester)?;
        self.coordinator
            .advance(TaskState::Requested, TaskState::Executing);
        let store = self.store.clone();
        let result = task::spawn_blocking(move || store.prune(keep)).await?;
        permit.end();
        Ok(result?)
    }

    /// Lock or unlock a snapshot. The live slot never unlocks.
    pub async fn set_locked(&self, name: &str, locked: bool) -> EngineResult<()> {
        let store = self.store.clone();
        let owned = name.to_string();
        task::spawn_blocking(move || {
            let mut entry = store.get(&owned)?;
            entry.set_locked(locked)
        })
        .await??;
        info!(name, locked, "Updated snapshot lock");
        Ok(())
    }

    /// Best-effort removal of a half-written entry.
    async fn discard_entry(&self, name: &str) {
        let Ok(dir) = self.store.entry_dir(name) else {
            return;
        };
        match task::spawn_blocking(move || TreeDelete::new(&dir).run()).await {
            Ok(Ok(())) => debug!(name, "Discarded incomplete snapshot"),
            Ok(Err(e)) => warn!(name, error = %e, "Failed to discard incomplete snapshot"),
            Err(e) => warn!(name, error = %e, "Failed to discard incomplete snapshot"),
        }
    }

    async fn remove_staging(&self) {
        let staging = self.staging_dir();
        if !staging.exists() {
            return;
        }
        match task::spawn_blocking(move || TreeDelete::new(&staging).run()).await {
            Ok(Ok(())) => debug!("Staging directory removed"),
            Ok(Err(e)) => warn!(error = %e, "Failed to remove staging directory"),
            Err(e) => warn!(error = %e, "Failed to remove staging directory"),
        }
    }

    fn sweep_stale_staging(&self) {
        let staging = self.staging_dir();
        if !staging.exists() {
            return;
        }
        warn!(path = %staging.display(), "Removing stale staging directory");
        if let Err(e) = TreeDelete::new(&staging).run() {
            warn!(error = %e, "Failed to remove stale staging directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::tempdir;
    use worldvault_snapshot::PAYLOAD_DIR;

    fn write_file(path: &Path, contents: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    /// Minimal live tree: 8 bytes of level.dat and 32 bytes of region
    /// data, all tagged, plus a session.lock the default excludes drop.
    fn build_world(world: &Path, tag: u8) {
        write_file(&world.join("level.dat"), &[tag; 8]);
        write_file(&world.join("session.lock"), b"lock");
        write_file(&world.join("region/r.0.0.mca"), &[tag; 32]);
    }

    fn world_tag(dir: &Path) -> u8 {
        fs::read(dir.join("level.dat")).unwrap()[0]
    }

    fn payload_dir(engine: &Engine, name: &str) -> PathBuf {
        engine.store().base_dir().join(name).join(PAYLOAD_DIR)
    }

    fn test_config() -> Config {
        Config {
            countdown_seconds: 0,
            ..Config::default()
        }
    }

    fn engine_at(root: &Path) -> Engine {
        Engine::with_config(root, test_config()).unwrap()
    }

    fn restore_opts() -> RestoreOptions {
        RestoreOptions {
            skip_confirmation: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn backup_captures_live_tree() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);

        let copied = engine
            .backup("first", "initial state", BackupOptions::default())
            .await
            .unwrap();
        assert_eq!(copied, 40);

        let entry = engine.get("first").await.unwrap();
        assert!(entry.exists());
        assert_eq!(entry.info().size_bytes, Some(40));
        assert!(!payload_dir(&engine, "first").join("session.lock").exists());
        assert_eq!(engine.coordinator().state(), TaskState::Idle);
    }

    #[tokio::test]
    async fn backup_overwrite_is_explicit() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("first", "", BackupOptions::default())
            .await
            .unwrap();

        let err = engine
            .backup("first", "", BackupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Snapshot(SnapshotError::AlreadyExists(_))
        ));

        build_world(&engine.live_dir(), 2);
        let opts = BackupOptions {
            overwrite: true,
            ..Default::default()
        };
        engine.backup("first", "", opts).await.unwrap();
        assert_eq!(world_tag(&payload_dir(&engine, "first")), 2);
    }

    #[tokio::test]
    async fn backup_cannot_take_the_live_slot_name() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);

        let live_name = engine.config().live_name.clone();
        let err = engine
            .backup(&live_name, "", BackupOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(SnapshotError::Locked(_))));
    }

    #[tokio::test]
    async fn backup_applies_retention() {
        let dir = tempdir().unwrap();
        let mut config = test_config();
        config.max_snapshots = 2;
        let engine = Engine::with_config(dir.path(), config).unwrap();
        build_world(&engine.live_dir(), 1);

        for name in ["a", "b", "c"] {
            engine.backup(name, "", BackupOptions::default()).await.unwrap();
            // Distinct creation timestamps keep the ordering unambiguous.
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let names: Vec<String> = engine
            .list()
            .await
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn restore_swaps_and_archives_the_live_tree() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();

        build_world(&engine.live_dir(), 2);
        let outcome = engine.restore("clean", restore_opts()).await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Completed);

        assert_eq!(world_tag(&engine.live_dir()), 1);
        let live_name = engine.config().live_name.clone();
        let slot = engine.get(&live_name).await.unwrap();
        assert!(slot.info().locked);
        assert!(slot.info().live_marker);
        assert_eq!(world_tag(&payload_dir(&engine, &live_name)), 2);
        assert_eq!(engine.coordinator().state(), TaskState::Idle);
    }

    #[tokio::test]
    async fn restoring_the_live_slot_goes_through_staging() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();
        build_world(&engine.live_dir(), 2);
        engine.restore("clean", restore_opts()).await.unwrap();
        // The slot now archives tag 2 and the live tree is tag 1.

        build_world(&engine.live_dir(), 3);
        let live_name = engine.config().live_name.clone();
        let outcome = engine.restore(&live_name, restore_opts()).await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Completed);

        assert_eq!(world_tag(&engine.live_dir()), 2);
        assert_eq!(world_tag(&payload_dir(&engine, &live_name)), 3);
        assert!(!dir.path().join(".staging").exists());
    }

    #[tokio::test]
    async fn masked_restore_keeps_unselected_dimensions_live() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        let live = engine.live_dir();
        build_world(&live, 1);
        write_file(&live.join("DIM-1/region/r.0.0.mca"), &[1; 16]);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();

        build_world(&live, 2);
        write_file(&live.join("DIM-1/region/r.0.0.mca"), &[2; 16]);

        let opts = RestoreOptions {
            mask: DimensionMask::OVERWORLD,
            ..restore_opts()
        };
        engine.restore("clean", opts).await.unwrap();

        // The overworld came back; the nether kept its live state.
        assert_eq!(fs::read(live.join("region/r.0.0.mca")).unwrap()[0], 1);
        assert_eq!(fs::read(live.join("DIM-1/region/r.0.0.mca")).unwrap()[0], 2);
    }

    #[tokio::test]
    async fn restore_of_unknown_snapshot_fails_early() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        let err = engine.restore("ghost", restore_opts()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Snapshot(SnapshotError::NotFound(_))
        ));
        assert_eq!(engine.coordinator().state(), TaskState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_confirmation_declines_the_restore() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();
        build_world(&engine.live_dir(), 2);

        let outcome = engine
            .restore("clean", RestoreOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome, RestoreOutcome::Declined);
        assert_eq!(world_tag(&engine.live_dir()), 2);
        assert_eq!(engine.coordinator().state(), TaskState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_answer_reaches_the_restore() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();
        build_world(&engine.live_dir(), 2);

        let opts = RestoreOptions {
            requester: "cli".to_string(),
            ..Default::default()
        };
        let (outcome, answered) = tokio::join!(engine.restore("clean", opts), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            engine.confirmations().respond("cli", true).await
        });
        assert!(answered);
        assert_eq!(outcome.unwrap(), RestoreOutcome::Completed);
        assert_eq!(world_tag(&engine.live_dir()), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_confirmation_leaves_everything_alone() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();
        build_world(&engine.live_dir(), 2);

        let opts = RestoreOptions {
            requester: "cli".to_string(),
            ..Default::default()
        };
        let (outcome, _) = tokio::join!(engine.restore("clean", opts), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            engine.confirmations().respond("cli", false).await
        });
        assert_eq!(outcome.unwrap(), RestoreOutcome::Declined);
        assert_eq!(world_tag(&engine.live_dir()), 2);
        // No capture ran, so the live slot was never materialized.
        assert_eq!(engine.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn tasks_are_single_flight() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();

        let _permit = engine.coordinator().try_begin("someone").unwrap();
        let err = engine.restore("clean", restore_opts()).await.unwrap_err();
        assert!(matches!(err, EngineError::Busy { .. }));
        let err = engine.delete("clean", "local").await.unwrap_err();
        assert!(matches!(err, EngineError::Busy { .. }));
    }

    #[tokio::test]
    async fn pre_cancelled_restore_reports_cancelled() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();
        build_world(&engine.live_dir(), 2);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let opts = RestoreOptions {
            cancel,
            ..restore_opts()
        };
        let outcome = engine.restore("clean", opts).await.unwrap();
        assert_eq!(outcome, RestoreOutcome::Cancelled);
        assert_eq!(world_tag(&engine.live_dir()), 2);
        assert_eq!(engine.coordinator().state(), TaskState::Idle);
    }

    #[tokio::test]
    async fn delete_respects_locks() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("keep", "", BackupOptions::default())
            .await
            .unwrap();

        engine.set_locked("keep", true).await.unwrap();
        let err = engine.delete("keep", "local").await.unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(SnapshotError::Locked(_))));

        engine.set_locked("keep", false).await.unwrap();
        engine.delete("keep", "local").await.unwrap();
        let err = engine.get("keep").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Snapshot(SnapshotError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn the_live_slot_stays_locked() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();
        build_world(&engine.live_dir(), 2);
        engine.restore("clean", restore_opts()).await.unwrap();

        let live_name = engine.config().live_name.clone();
        let err = engine.set_locked(&live_name, false).await.unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(SnapshotError::Locked(_))));
        let err = engine.delete(&live_name, "local").await.unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(SnapshotError::Locked(_))));
    }

    #[tokio::test]
    async fn rename_moves_the_entry() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        engine
            .backup("draft", "", BackupOptions::default())
            .await
            .unwrap();

        engine.rename("draft", "final", "local").await.unwrap();
        assert!(engine.get("final").await.unwrap().exists());
        assert!(matches!(
            engine.get("draft").await.unwrap_err(),
            EngineError::Snapshot(SnapshotError::NotFound(_))
        ));

        // A locked target blocks the rename and keeps both entries.
        build_world(&engine.live_dir(), 2);
        engine
            .backup("second", "", BackupOptions::default())
            .await
            .unwrap();
        engine.set_locked("final", true).await.unwrap();
        let err = engine.rename("second", "final", "local").await.unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(SnapshotError::Locked(_))));
        assert!(engine.get("second").await.unwrap().exists());
        assert_eq!(world_tag(&payload_dir(&engine, "final")), 1);

        let live_name = engine.config().live_name.clone();
        let err = engine
            .rename("second", &live_name, "local")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Snapshot(SnapshotError::Locked(_))));
    }

    #[tokio::test]
    async fn prune_keeps_the_newest() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path());
        build_world(&engine.live_dir(), 1);
        for name in ["a", "b", "c"] {
            engine.backup(name, "", BackupOptions::default()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let deleted = engine.prune(1, "local").await.unwrap();
        assert_eq!(deleted, vec!["b".to_string(), "a".to_string()]);
        let names: Vec<String> = engine
            .list()
            .await
            .unwrap()
            .iter()
            .map(|e| e.name().to_string())
            .collect();
        assert_eq!(names, vec!["c"]);
    }

    struct RecordingHook {
        events: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl SwapHook for RecordingHook {
        async fn prepare(&self) -> EngineResult<()> {
            self.events.lock().unwrap().push("prepare");
            Ok(())
        }

        async fn activate(&self) -> EngineResult<()> {
            self.events.lock().unwrap().push("activate");
            Ok(())
        }
    }

    #[tokio::test]
    async fn hook_brackets_the_swap_exactly_once() {
        let dir = tempdir().unwrap();
        let hook = Arc::new(RecordingHook {
            events: Mutex::new(Vec::new()),
        });
        let engine = engine_at(dir.path()).with_hook(Arc::clone(&hook) as Arc<dyn SwapHook>);
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();
        build_world(&engine.live_dir(), 2);

        engine.restore("clean", restore_opts()).await.unwrap();
        assert_eq!(*hook.events.lock().unwrap(), vec!["prepare", "activate"]);
    }

    struct RefusingHook;

    #[async_trait]
    impl SwapHook for RefusingHook {
        async fn prepare(&self) -> EngineResult<()> {
            Err(EngineError::hook("world is still loaded"))
        }
    }

    #[tokio::test]
    async fn failed_prepare_aborts_before_the_copy() {
        let dir = tempdir().unwrap();
        let engine = engine_at(dir.path()).with_hook(Arc::new(RefusingHook));
        build_world(&engine.live_dir(), 1);
        engine
            .backup("clean", "", BackupOptions::default())
            .await
            .unwrap();
        build_world(&engine.live_dir(), 2);

        let err = engine.restore("clean", restore_opts()).await.unwrap_err();
        assert!(matches!(err, EngineError::Hook(_)));
        assert_eq!(world_tag(&engine.live_dir()), 2);
        assert_eq!(engine.coordinator().state(), TaskState::Idle);
    }

    #[tokio::test]
    async fn stale_staging_is_swept_at_open() {
        let dir = tempdir().unwrap();
        write_file(&dir.path().join(".staging/world/level.dat"), b"junk");

        let _engine = engine_at(dir.path());
        assert!(!dir.path().join(".staging").exists());
    }
}
