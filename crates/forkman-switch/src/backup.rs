use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use forkman_core::{current_unix_timestamp, ForksLayout};
use tracing::{debug, info};

use crate::fs_utils::{copy_dir_recursive, remove_path_if_exists};

/// Snapshots of the runtime-state directory, one per variant.
#[derive(Debug, Clone)]
pub struct StateBackup {
    layout: ForksLayout,
}

impl StateBackup {
    pub fn new(layout: ForksLayout) -> Self {
        Self { layout }
    }

    pub fn snapshot_dir(&self, name: &str) -> PathBuf {
        self.layout.state_backup_dir(name)
    }

    pub fn has_snapshot(&self, name: &str) -> bool {
        self.snapshot_dir(name).is_dir()
    }

    /// Replaces `name`'s snapshot with a copy of the live state. Returns
    /// `false` when there is no live state to copy.
    pub fn backup(&self, name: &str) -> Result<bool> {
        let live = self.layout.runtime_state_dir();
        if !live.is_dir() {
            debug!(variant = name, live = %live.display(), "no runtime state to back up");
            return Ok(false);
        }

        let destination = self.snapshot_dir(name);
        let staged = self.layout.tmp_path(&format!("state-backup-{name}"));
        if let Err(err) = copy_dir_recursive(live, &staged) {
            let _ = remove_path_if_exists(&staged);
            return Err(err);
        }

        remove_path_if_exists(&destination)?;
        fs::rename(&staged, &destination).with_context(|| {
            format!(
                "failed to install state backup {} -> {}",
                staged.display(),
                destination.display()
            )
        })?;
        info!(variant = name, "backed up runtime state");
        Ok(true)
    }

    /// Copies `name`'s snapshot back over the live state. Returns `false`
    /// when no snapshot exists.
    pub fn restore(&self, name: &str) -> Result<bool> {
        let snapshot = self.snapshot_dir(name);
        if !snapshot.is_dir() {
            debug!(variant = name, "no state backup to restore");
            return Ok(false);
        }

        let live = self.layout.runtime_state_dir();
        let suffix = format!("{}-{}", std::process::id(), current_unix_timestamp());
        let staged = sibling(live, &format!("restore-{suffix}"));
        if let Err(err) = copy_dir_recursive(&snapshot, &staged) {
            let _ = remove_path_if_exists(&staged);
            return Err(err);
        }

        let retired = sibling(live, &format!("retired-{suffix}"));
        let had_live = fs::symlink_metadata(live).is_ok();
        if had_live {
            fs::rename(live, &retired).with_context(|| {
                format!("failed to move {} aside", live.display())
            })?;
        }
        if let Err(err) = fs::rename(&staged, live) {
            if had_live {
                let _ = fs::rename(&retired, live);
            }
            let _ = remove_path_if_exists(&staged);
            return Err(err).with_context(|| format!("failed to restore {}", live.display()));
        }
        if had_live {
            remove_path_if_exists(&retired)?;
        }
        info!(variant = name, "restored runtime state from backup");
        Ok(true)
    }
}

fn sibling(path: &Path, label: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{name}.{label}"))
}
