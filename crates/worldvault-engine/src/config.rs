//! Engine configuration.
//!
//! Loaded from `worldvault.json` in the instance root. A missing file
//! yields the defaults; missing fields in a present file are filled in
//! per field, so a config carrying only `{"countdown_seconds": 3}` is
//! valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Config file name, relative to the instance root.
pub const CONFIG_FILE: &str = "worldvault.json";

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Live world directory, relative to the instance root.
    pub world_dir: String,

    /// Directory holding snapshot entries, relative to the instance root.
    pub backup_dir: String,

    /// Staging directory for collision captures, relative to the
    /// instance root. Kept outside `backup_dir` so listings never see it.
    pub staging_dir: String,

    /// Glob patterns excluded from every capture.
    pub excludes: Vec<String>,

    /// Name of the locked entry archiving the pre-restore state.
    pub live_name: String,

    /// Description written into the live entry's metadata.
    pub live_description: String,

    /// Countdown length before a restore executes. Zero disables the
    /// countdown.
    pub countdown_seconds: u32,

    /// How long a restore waits for confirmation before treating it as
    /// declined.
    pub confirm_timeout_seconds: u64,

    /// Retention limit applied after each backup. Zero keeps everything.
    pub max_snapshots: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            world_dir: "world".to_string(),
            backup_dir: "snapshots".to_string(),
            staging_dir: ".staging".to_string(),
            excludes: vec!["session.lock".to_string()],
            live_name: "current-state".to_string(),
            live_description: "World state before the last restore".to_string(),
            countdown_seconds: 10,
            confirm_timeout_seconds: 60,
            max_snapshots: 0,
        }
    }
}

impl Config {
    /// Load the config from `{root}/worldvault.json`, falling back to the
    /// defaults when the file does not exist.
    pub async fn load(root: &Path) -> EngineResult<Self> {
        let path = root.join(CONFIG_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(EngineError::io(path, e)),
        }
    }

    /// Write the config to `{root}/worldvault.json` as pretty JSON.
    pub async fn save(&self, root: &Path) -> EngineResult<()> {
        let path = root.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| EngineError::io(path, e))
    }

    /// The live world directory resolved against the instance root.
    pub fn world_path(&self, root: &Path) -> PathBuf {
        root.join(&self.world_dir)
    }

    /// The snapshot store directory resolved against the instance root.
    pub fn backup_path(&self, root: &Path) -> PathBuf {
        root.join(&self.backup_dir)
    }

    /// The staging directory resolved against the instance root.
    pub fn staging_path(&self, root: &Path) -> PathBuf {
        root.join(&self.staging_dir)
    }
}
