use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use forkman_core::{validate_variant_name, ForkError, ForksLayout, NESTED_REPO_DIR};
use forkman_vcs::Vcs;
use tracing::{info, warn};

use crate::{read_metadata, write_metadata, VariantMetadata};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub name: String,
    pub root_dir: PathBuf,
    pub repo_path: PathBuf,
    pub metadata: Option<VariantMetadata>,
}

/// Variants are the directories under the forks root that hold a repository.
///
/// Callers are expected to be the only process mutating the forks root.
#[derive(Debug, Clone)]
pub struct VariantRegistry {
    layout: ForksLayout,
}

impl VariantRegistry {
    pub fn new(layout: ForksLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ForksLayout {
        &self.layout
    }

    pub fn validate_name(&self, name: &str) -> Result<(), ForkError> {
        validate_variant_name(name)
    }

    /// Sorted by name.
    pub fn list(&self) -> Result<Vec<Variant>> {
        let root = self.layout.forks_root();
        if !root.exists() {
            return Ok(Vec::new());
        }

        let mut variants = Vec::new();
        for entry in fs::read_dir(root)
            .with_context(|| format!("failed to read forks root: {}", root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if self.layout.is_reserved_entry(&name) || validate_variant_name(&name).is_err() {
                continue;
            }
            if let Some(variant) = self.load(&name) {
                variants.push(variant);
            }
        }

        variants.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(variants)
    }

    pub fn get(&self, name: &str) -> Result<Variant> {
        validate_variant_name(name)?;
        self.load(name).ok_or_else(|| {
            ForkError::NotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_variant_name(name).is_ok() && self.resolve_repo_path(name).is_ok()
    }

    /// Stored `repo_dir` wins; otherwise the first layout candidate holding a repository.
    pub fn resolve_repo_path(&self, name: &str) -> Result<PathBuf> {
        validate_variant_name(name)?;
        let metadata = self.readable_metadata(name);
        self.resolve_with_metadata(name, metadata.as_ref())
            .ok_or_else(|| {
                ForkError::NotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }

    /// Maps a fully resolved path back to the registered variant containing it.
    pub fn variant_for_path(&self, resolved: &Path) -> Option<String> {
        let root = self.layout.forks_root();
        let canonical_root = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let relative = resolved
            .strip_prefix(&canonical_root)
            .or_else(|_| resolved.strip_prefix(root))
            .ok()?;
        let Some(Component::Normal(first)) = relative.components().next() else {
            return None;
        };
        let name = first.to_str()?.to_string();
        if self.exists(&name) {
            Some(name)
        } else {
            None
        }
    }

    /// Clones `url` into a new variant. The variant root must not exist yet.
    pub fn create(&self, name: &str, url: &str, branch: &str, vcs: &dyn Vcs) -> Result<Variant> {
        validate_variant_name(name)?;
        let root = self.layout.variant_root(name);
        if root.exists() {
            return Err(ForkError::AlreadyExists {
                name: name.to_string(),
            }
            .into());
        }

        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create variant dir: {}", root.display()))?;
        let metadata = VariantMetadata {
            repo_dir: Some(NESTED_REPO_DIR.to_string()),
            ..VariantMetadata::new(name, url, branch)
        };
        let destination = self.layout.clone_destination(name);
        info!(variant = name, url, branch = %metadata.branch, "cloning variant");
        if let Err(err) = vcs.clone_repo(url, metadata.branch(), &destination) {
            let _ = fs::remove_dir_all(&root);
            return Err(ForkError::CloneFailed {
                url: url.to_string(),
                branch: metadata.branch.clone(),
                reason: format!("{err:#}"),
            }
            .into());
        }

        if let Err(err) = write_metadata(&self.layout, &metadata) {
            let _ = fs::remove_dir_all(&root);
            return Err(err);
        }

        Ok(Variant {
            name: name.to_string(),
            root_dir: root,
            repo_path: destination,
            metadata: Some(metadata),
        })
    }

    /// Irreversible. `active` is the name the active pointer currently holds.
    pub fn remove(&self, name: &str, active: Option<&str>) -> Result<()> {
        validate_variant_name(name)?;
        if active == Some(name) {
            return Err(ForkError::IsActive {
                name: name.to_string(),
            }
            .into());
        }
        let root = self.layout.variant_root(name);
        if !root.is_dir() {
            return Err(ForkError::NotFound {
                name: name.to_string(),
            }
            .into());
        }

        fs::remove_dir_all(&root)
            .with_context(|| format!("failed to remove variant dir: {}", root.display()))?;
        info!(variant = name, "removed variant");
        Ok(())
    }

    /// Moves a variant to a new name. The result is a new registry entry.
    pub fn rename(&self, name: &str, new_name: &str, active: Option<&str>) -> Result<Variant> {
        validate_variant_name(name)?;
        validate_variant_name(new_name)?;
        if active == Some(name) {
            return Err(ForkError::IsActive {
                name: name.to_string(),
            }
            .into());
        }
        let from = self.layout.variant_root(name);
        if !from.is_dir() {
            return Err(ForkError::NotFound {
                name: name.to_string(),
            }
            .into());
        }
        let to = self.layout.variant_root(new_name);
        if to.exists() {
            return Err(ForkError::AlreadyExists {
                name: new_name.to_string(),
            }
            .into());
        }

        fs::rename(&from, &to).with_context(|| {
            format!("failed to move {} -> {}", from.display(), to.display())
        })?;
        if let Some(mut metadata) = self.readable_metadata(new_name) {
            metadata.name = new_name.to_string();
            write_metadata(&self.layout, &metadata)?;
        }
        info!(from = name, to = new_name, "renamed variant");
        self.get(new_name)
    }

    fn load(&self, name: &str) -> Option<Variant> {
        let metadata = self.readable_metadata(name);
        let repo_path = self.resolve_with_metadata(name, metadata.as_ref())?;
        Some(Variant {
            name: name.to_string(),
            root_dir: self.layout.variant_root(name),
            repo_path,
            metadata,
        })
    }

    /// A damaged metadata file demotes the variant to one without metadata.
    fn readable_metadata(&self, name: &str) -> Option<VariantMetadata> {
        match read_metadata(&self.layout, name) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(variant = name, "ignoring unreadable metadata: {err:#}");
                None
            }
        }
    }

    fn resolve_with_metadata(
        &self,
        name: &str,
        metadata: Option<&VariantMetadata>,
    ) -> Option<PathBuf> {
        let root = self.layout.variant_root(name);
        if let Some(repo_dir) = metadata.and_then(|metadata| metadata.repo_dir.as_deref()) {
            let recorded = if repo_dir.is_empty() || repo_dir == "." {
                root.clone()
            } else {
                root.join(repo_dir)
            };
            if holds_repository(&recorded) {
                return Some(recorded);
            }
        }

        self.layout
            .repo_candidates(name)
            .into_iter()
            .find(|candidate| holds_repository(candidate))
    }
}

fn holds_repository(path: &Path) -> bool {
    path.join(".git").exists()
}
