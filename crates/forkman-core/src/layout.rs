use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use crate::ForkmanConfig;

const METADATA_FILE_NAME: &str = "fork.json";
pub const NESTED_REPO_DIR: &str = "openpilot";
const STATE_BACKUP_DIR: &str = "state-backup";
const TMP_DIR: &str = ".tmp";

/// Every on-disk location forkman touches, derived from one config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForksLayout {
    forks_root: PathBuf,
    active_link: PathBuf,
    current_pointer_path: PathBuf,
    runtime_state_dir: PathBuf,
    log_path: PathBuf,
}

impl ForksLayout {
    pub fn new(forks_root: impl Into<PathBuf>, active_link: impl Into<PathBuf>) -> Self {
        let forks_root = forks_root.into();
        Self {
            current_pointer_path: forks_root.join("current_fork"),
            runtime_state_dir: forks_root.join("params"),
            log_path: forks_root.join("forkman.log"),
            active_link: active_link.into(),
            forks_root,
        }
    }

    pub fn from_config(config: &ForkmanConfig) -> Self {
        Self {
            forks_root: config.forks_root.clone(),
            active_link: config.active_link.clone(),
            current_pointer_path: config.current_pointer_file.clone(),
            runtime_state_dir: config.runtime_state_dir.clone(),
            log_path: config.log_file.clone(),
        }
    }

    pub fn with_runtime_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_state_dir = dir.into();
        self
    }

    pub fn forks_root(&self) -> &Path {
        &self.forks_root
    }

    pub fn active_link(&self) -> &Path {
        &self.active_link
    }

    pub fn current_pointer_path(&self) -> &Path {
        &self.current_pointer_path
    }

    pub fn runtime_state_dir(&self) -> &Path {
        &self.runtime_state_dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn variant_root(&self, name: &str) -> PathBuf {
        self.forks_root.join(name)
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.variant_root(name).join(METADATA_FILE_NAME)
    }

    pub fn state_backup_dir(&self, name: &str) -> PathBuf {
        self.variant_root(name).join(STATE_BACKUP_DIR)
    }

    /// Repository locations a variant may use, newest layout first.
    pub fn repo_candidates(&self, name: &str) -> [PathBuf; 2] {
        let root = self.variant_root(name);
        [root.join(NESTED_REPO_DIR), root]
    }

    /// Where a fresh clone of `name` is placed.
    pub fn clone_destination(&self, name: &str) -> PathBuf {
        self.variant_root(name).join(NESTED_REPO_DIR)
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.forks_root.join(TMP_DIR)
    }

    pub fn tmp_path(&self, label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        self.tmp_dir()
            .join(format!("{label}-{}-{nanos}", std::process::id()))
    }

    /// Path the active link is moved to when something other than a symlink occupies it.
    pub fn displaced_link_path(&self, unix_ts: u64) -> PathBuf {
        let file_name = self
            .active_link
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "active".to_string());
        self.active_link
            .with_file_name(format!("{file_name}.displaced-{unix_ts}"))
    }

    pub fn is_reserved_entry(&self, entry_name: &str) -> bool {
        entry_name.starts_with('.')
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.forks_root.clone(), self.tmp_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
