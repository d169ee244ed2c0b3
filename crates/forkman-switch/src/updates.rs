use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use forkman_core::ForkError;
use forkman_registry::{Variant, VariantRegistry};
use forkman_vcs::{IntegrateOutcome, Vcs};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Unknown,
    UpToDate,
    UpdateAvailable,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::UpToDate => "up to date",
            Self::UpdateAvailable => "update available",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantUpdate {
    Updated { from: String, to: String },
    AlreadyCurrent,
    /// The operator declined to update over local modifications.
    Declined,
}

/// Read-only: compares the local head with the remote branch head.
pub fn check_variant(variant: &Variant, vcs: &dyn Vcs) -> UpdateStatus {
    let Some(metadata) = &variant.metadata else {
        debug!(variant = %variant.name, "no metadata; skipping update check");
        return UpdateStatus::Unknown;
    };
    if !vcs.is_repository(&variant.repo_path) {
        return UpdateStatus::Unknown;
    }

    let local = match vcs.local_commit(&variant.repo_path) {
        Ok(local) => local,
        Err(err) => {
            warn!(variant = %variant.name, "cannot read local head: {err:#}");
            return UpdateStatus::Unknown;
        }
    };
    let remote = match vcs.remote_commit(&variant.repo_path, metadata.branch()) {
        Ok(remote) => remote,
        Err(err) => {
            let failure = ForkError::FetchFailed {
                url: metadata.url.clone(),
                branch: metadata.branch.clone(),
                reason: format!("{err:#}"),
            };
            warn!(variant = %variant.name, "{failure}");
            return UpdateStatus::Unknown;
        }
    };

    if local == remote {
        UpdateStatus::UpToDate
    } else {
        UpdateStatus::UpdateAvailable
    }
}

/// Checks every variant on at most `workers` threads. Results keep input order.
pub fn check_all<V: Vcs>(variants: &[Variant], vcs: &V, workers: usize) -> Vec<UpdateStatus> {
    let workers = workers.clamp(1, variants.len().max(1));
    let next = AtomicUsize::new(0);
    let (sender, receiver) = mpsc::channel();

    thread::scope(|scope| {
        for _ in 0..workers {
            let sender = sender.clone();
            let next = &next;
            scope.spawn(move || loop {
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some(variant) = variants.get(index) else {
                    break;
                };
                let _ = sender.send((index, check_variant(variant, vcs)));
            });
        }
    });
    drop(sender);

    let mut statuses = vec![UpdateStatus::Unknown; variants.len()];
    for (index, status) in receiver {
        statuses[index] = status;
    }
    statuses
}

/// Fetches and rebases `name` onto its remote branch.
///
/// `confirm_local_changes` is consulted only when the work tree is dirty;
/// returning `false` leaves the repository untouched.
pub fn update_variant<F>(
    registry: &VariantRegistry,
    vcs: &dyn Vcs,
    name: &str,
    confirm_local_changes: F,
) -> Result<VariantUpdate>
where
    F: FnOnce(&Variant) -> bool,
{
    let variant = registry.get(name)?;
    let Some(metadata) = variant.metadata.clone() else {
        return Err(ForkError::NoOrigin {
            name: name.to_string(),
        }
        .into());
    };
    let repo = &variant.repo_path;

    if vcs.has_local_changes(repo)? && !confirm_local_changes(&variant) {
        info!(variant = name, "update declined because of local changes");
        return Ok(VariantUpdate::Declined);
    }

    let before = vcs.local_commit(repo)?;
    if let Err(err) = vcs.fetch(repo, metadata.branch()) {
        return Err(ForkError::FetchFailed {
            url: metadata.url,
            branch: metadata.branch,
            reason: format!("{err:#}"),
        }
        .into());
    }
    match vcs.integrate(repo)? {
        IntegrateOutcome::Integrated => {}
        IntegrateOutcome::Conflict => {
            return Err(ForkError::MergeConflict {
                url: metadata.url,
                branch: metadata.branch,
                reason: "rebase aborted, local history unchanged".to_string(),
            }
            .into());
        }
    }

    let after = vcs.local_commit(repo)?;
    if before == after {
        return Ok(VariantUpdate::AlreadyCurrent);
    }
    info!(variant = name, from = %before, to = %after, "updated variant");
    Ok(VariantUpdate::Updated {
        from: before,
        to: after,
    })
}
