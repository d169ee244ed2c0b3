use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use forkman_core::{is_interrupted, ForkError, RetryPolicy};
use forkman_registry::{Variant, VariantRegistry};
use forkman_vcs::Vcs;
use tracing::{error, info, warn};

use crate::fs_utils::remove_path_if_exists;
use crate::{LinkState, OperationScope, PointerStore, StateBackup};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerState {
    Consistent { name: String },
    /// No usable symlink and no usable record; initial setup is required.
    Uninitialized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub state: PointerState,
    /// Set when divergence was found and repaired.
    pub healed: Option<String>,
}

impl VerifyReport {
    pub fn active_name(&self) -> Option<&str> {
        match &self.state {
            PointerState::Consistent { name } => Some(name.as_str()),
            PointerState::Uninitialized => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRequest {
    pub name: String,
    pub url: String,
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Switched {
        from: Option<String>,
        to: String,
        backed_up: bool,
    },
    AlreadyActive {
        name: String,
    },
}

/// Keeps the active symlink, the current-fork record and the registry in agreement.
///
/// The symlink is the source of truth whenever it resolves into a registered
/// variant. The record is only ever written after the symlink it describes
/// exists, so a crash between the two leaves the record naming the previous
/// variant and the next `verify` relinks that one.
#[derive(Debug)]
pub struct ActivePointerController<S, V> {
    registry: VariantRegistry,
    store: S,
    backup: StateBackup,
    vcs: V,
    retry: RetryPolicy,
}

impl<S: PointerStore, V: Vcs> ActivePointerController<S, V> {
    pub fn new(registry: VariantRegistry, store: S, vcs: V) -> Self {
        let backup = StateBackup::new(registry.layout().clone());
        Self {
            registry,
            store,
            backup,
            vcs,
            retry: RetryPolicy::once(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn backup(&self) -> &StateBackup {
        &self.backup
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn begin_operation(&self, operation: &'static str) -> Result<OperationScope<'_, S, V>> {
        let previous = self.verify()?.active_name().map(str::to_string);
        Ok(OperationScope::new(self, operation, previous))
    }

    pub fn verify(&self) -> Result<VerifyReport> {
        let pointer = self.store.load()?;

        if let LinkState::Resolved { resolved, .. } = &pointer.link {
            if let Some(name) = self.registry.variant_for_path(resolved) {
                let healed = if pointer.recorded.as_deref() == Some(name.as_str()) {
                    None
                } else {
                    let detail = ForkError::Divergent {
                        detail: format!(
                            "record names {:?} but link resolves into '{name}'",
                            pointer.recorded
                        ),
                    }
                    .to_string();
                    warn!("{detail}; rewriting record from link");
                    Some(detail)
                };
                self.store.write_name(&name)?;
                return Ok(VerifyReport {
                    state: PointerState::Consistent { name },
                    healed,
                });
            }
        }

        let link_problem = match &pointer.link {
            LinkState::Missing => "active link is missing".to_string(),
            LinkState::NotSymlink => "active path is not a symlink".to_string(),
            LinkState::Dangling { target } => {
                format!("active link target {} does not exist", target.display())
            }
            LinkState::Resolved { resolved, .. } => format!(
                "active link resolves to {}, which is not a registered variant",
                resolved.display()
            ),
        };

        let recorded = pointer
            .recorded
            .filter(|name| self.registry.exists(name));
        let Some(name) = recorded else {
            warn!("{link_problem} and no usable current fork record; setup required");
            return Ok(VerifyReport {
                state: PointerState::Uninitialized,
                healed: None,
            });
        };

        let detail = ForkError::Divergent {
            detail: format!("{link_problem}; relinking recorded variant '{name}'"),
        }
        .to_string();
        warn!("{detail}");
        let repo_path = self.registry.resolve_repo_path(&name)?;
        self.store.clear_link()?;
        self.store.create_link(&repo_path)?;
        Ok(VerifyReport {
            state: PointerState::Consistent { name },
            healed: Some(detail),
        })
    }

    /// True when at least one variant could serve as a fallback.
    pub fn has_variants(&self) -> Result<bool> {
        Ok(!self.registry.list()?.is_empty())
    }

    /// Makes `request.name` active, cloning it first when it is not registered yet.
    pub fn initial_setup(&self, request: &SetupRequest) -> Result<VerifyReport> {
        self.registry.validate_name(&request.name)?;
        let mut scope = OperationScope::new(self, "initial-setup", None);

        let variant = if self.registry.exists(&request.name) {
            info!(variant = %request.name, "adopting existing variant");
            self.registry.get(&request.name)?
        } else {
            self.clone_with_retry(&mut scope, &request.name, &request.url, &request.branch)?
        };

        self.store.clear_link()?;
        self.store.create_link(&variant.repo_path)?;
        self.store.write_name(&variant.name)?;
        scope.commit();
        info!(variant = %variant.name, "initial setup complete");
        self.verify()
    }

    /// Clones a new, inactive variant.
    pub fn clone_variant(&self, name: &str, url: &str, branch: &str) -> Result<Variant> {
        self.registry.validate_name(name)?;
        let mut scope = self.begin_operation("clone")?;
        let variant = self.clone_with_retry(&mut scope, name, url, branch)?;
        scope.commit();
        self.verify()?;
        Ok(variant)
    }

    pub fn switch_to(&self, name: &str) -> Result<SwitchOutcome> {
        let target = self.registry.get(name)?;
        let mut scope = self.begin_operation("switch")?;
        let current = scope.previous().map(str::to_string);
        if current.as_deref() == Some(name) {
            scope.commit();
            self.verify()?;
            return Ok(SwitchOutcome::AlreadyActive {
                name: name.to_string(),
            });
        }

        check_interrupt()?;
        let backed_up = match &current {
            Some(current) => {
                let backed_up = self.backup.backup(current)?;
                if backed_up {
                    scope.mark_backup_taken();
                }
                backed_up
            }
            None => false,
        };

        check_interrupt()?;
        self.store.clear_link()?;
        if let Err(err) = self.store.create_link(&target.repo_path) {
            error!(
                variant = name,
                "failed to link {}: {err:#}",
                target.repo_path.display()
            );
            return Err(err);
        }
        self.store.write_name(name)?;
        scope.commit();

        self.verify()?;
        info!(from = ?current, to = name, "switched active variant");
        Ok(SwitchOutcome::Switched {
            from: current,
            to: name.to_string(),
            backed_up,
        })
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let report = self.verify()?;
        let result = self.registry.remove(name, report.active_name());
        self.verify()?;
        result
    }

    pub fn rename(&self, name: &str, new_name: &str) -> Result<Variant> {
        let report = self.verify()?;
        let result = self.registry.rename(name, new_name, report.active_name());
        self.verify()?;
        result
    }

    /// Removes leftovers of operations that never finished.
    pub fn sweep_transient(&self) -> Result<usize> {
        let tmp = self.registry.layout().tmp_dir();
        if !tmp.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&tmp)
            .with_context(|| format!("failed to read {}", tmp.display()))?
        {
            let path = entry?.path();
            remove_path_if_exists(&path)?;
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "removed stale transient files");
        }
        Ok(removed)
    }

    /// A pre-existing root is never tracked, so cleanup cannot remove it.
    fn clone_with_retry(
        &self,
        scope: &mut OperationScope<'_, S, V>,
        name: &str,
        url: &str,
        branch: &str,
    ) -> Result<Variant> {
        let root = self.registry.layout().variant_root(name);
        if root.exists() {
            return Err(ForkError::AlreadyExists {
                name: name.to_string(),
            }
            .into());
        }
        scope.track_transient(root);
        self.retry
            .run("clone", |_| self.registry.create(name, url, branch, &self.vcs))
    }

    /// Best-effort rollback used by `OperationScope` on every unfinished exit.
    pub(crate) fn cleanup(
        &self,
        operation: &str,
        previous: Option<&str>,
        backup_taken: bool,
        transient: &[PathBuf],
    ) {
        warn!(operation, "operation did not complete; running cleanup");
        for path in transient {
            if let Err(err) = remove_path_if_exists(path) {
                error!(path = %path.display(), "cleanup could not remove: {err:#}");
            }
        }

        let Some(previous) = previous else {
            return;
        };
        if let Err(err) = self.relink(previous) {
            error!(variant = previous, "cleanup could not relink: {err:#}");
        }
        if backup_taken {
            if let Err(err) = self.backup.restore(previous) {
                error!(variant = previous, "cleanup could not restore state: {err:#}");
            }
        }
    }

    fn relink(&self, name: &str) -> Result<()> {
        let repo_path = self.registry.resolve_repo_path(name)?;
        let already_linked = match self.store.read_link()? {
            LinkState::Resolved { resolved, .. } => {
                self.registry.variant_for_path(&resolved).as_deref() == Some(name)
            }
            _ => false,
        };
        if !already_linked {
            self.store.clear_link()?;
            self.store.create_link(&repo_path)?;
        }
        self.store.write_name(name)
    }
}

fn check_interrupt() -> Result<()> {
    if is_interrupted() {
        return Err(ForkError::Interrupted.into());
    }
    Ok(())
}
