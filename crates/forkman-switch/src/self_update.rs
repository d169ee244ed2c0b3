use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use forkman_core::{sha256_hex, ForkError};
use tracing::info;

/// Where the reference copy of the running executable comes from.
pub trait ScriptSource {
    fn fetch_script(&self, url: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfUpdateStatus {
    UpToDate,
    UpdateAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelfUpdateOutcome {
    UpToDate,
    /// The executable on disk was replaced; the caller re-executes it.
    Replaced {
        previous_sha256: String,
        new_sha256: String,
    },
}

/// Byte-exact comparison with the reference copy.
pub fn check_self(current: &[u8], url: &str, source: &dyn ScriptSource) -> Result<SelfUpdateStatus> {
    let reference = fetch_reference(url, source)?;
    if reference == current {
        Ok(SelfUpdateStatus::UpToDate)
    } else {
        Ok(SelfUpdateStatus::UpdateAvailable)
    }
}

pub fn apply_self_update(
    executable: &Path,
    url: &str,
    source: &dyn ScriptSource,
) -> Result<SelfUpdateOutcome> {
    let reference = fetch_reference(url, source)?;
    let current = fs::read(executable)
        .with_context(|| format!("failed to read {}", executable.display()))?;
    if current == reference {
        return Ok(SelfUpdateOutcome::UpToDate);
    }

    replace_executable(executable, &reference)?;
    let outcome = SelfUpdateOutcome::Replaced {
        previous_sha256: sha256_hex(&current),
        new_sha256: sha256_hex(&reference),
    };
    info!(outcome = ?outcome, path = %executable.display(), "replaced executable");
    Ok(outcome)
}

/// Writes `bytes` next to `target` and renames it into place.
pub fn replace_executable(target: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "forkman".to_string());
    let staged = target.with_file_name(format!(".{file_name}.update-{}", std::process::id()));

    let write_result = (|| -> Result<()> {
        fs::write(&staged, bytes)
            .with_context(|| format!("failed to write {}", staged.display()))?;
        fs::set_permissions(&staged, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("failed to mark {} executable", staged.display()))?;
        fs::rename(&staged, target).with_context(|| {
            format!(
                "failed to replace {} with {}",
                target.display(),
                staged.display()
            )
        })
    })();

    if write_result.is_err() {
        let _ = fs::remove_file(&staged);
    }
    write_result
}

fn fetch_reference(url: &str, source: &dyn ScriptSource) -> Result<Vec<u8>> {
    let bytes = source.fetch_script(url).map_err(|err| ForkError::FetchError {
        url: url.to_string(),
        reason: format!("{err:#}"),
    })?;
    if bytes.is_empty() {
        return Err(ForkError::FetchError {
            url: url.to_string(),
            reason: "empty response".to_string(),
        }
        .into());
    }
    Ok(bytes)
}
