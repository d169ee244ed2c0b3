use std::cell::{Cell, RefCell};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use forkman_core::{current_unix_timestamp, ForksLayout};
use tracing::warn;

/// What currently occupies the active link path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Missing,
    NotSymlink,
    Dangling { target: PathBuf },
    /// `resolved` is the fully dereferenced target.
    Resolved { target: PathBuf, resolved: PathBuf },
}

/// The two redundant records of which variant is active, as last read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePointer {
    pub link: LinkState,
    pub recorded: Option<String>,
}

/// Persistence port for the active pointer.
pub trait PointerStore {
    fn read_link(&self) -> Result<LinkState>;

    /// Empties the link path. Anything that is not a symlink is moved aside, never deleted.
    fn clear_link(&self) -> Result<()>;

    fn create_link(&self, target: &Path) -> Result<()>;

    fn read_name(&self) -> Result<Option<String>>;

    fn write_name(&self, name: &str) -> Result<()>;

    fn load(&self) -> Result<ActivePointer> {
        Ok(ActivePointer {
            link: self.read_link()?,
            recorded: self.read_name()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FsPointerStore {
    layout: ForksLayout,
}

impl FsPointerStore {
    pub fn new(layout: ForksLayout) -> Self {
        Self { layout }
    }
}

impl PointerStore for FsPointerStore {
    fn read_link(&self) -> Result<LinkState> {
        let link = self.layout.active_link();
        let metadata = match fs::symlink_metadata(link) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(LinkState::Missing),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to inspect active link: {}", link.display()));
            }
        };
        if !metadata.file_type().is_symlink() {
            return Ok(LinkState::NotSymlink);
        }

        let target = fs::read_link(link)
            .with_context(|| format!("failed to read symlink {}", link.display()))?;
        match fs::canonicalize(link) {
            Ok(resolved) => Ok(LinkState::Resolved { target, resolved }),
            Err(_) => Ok(LinkState::Dangling { target }),
        }
    }

    fn clear_link(&self) -> Result<()> {
        let link = self.layout.active_link();
        let metadata = match fs::symlink_metadata(link) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to inspect active link: {}", link.display()));
            }
        };

        if metadata.file_type().is_symlink() {
            return fs::remove_file(link)
                .with_context(|| format!("failed to remove symlink {}", link.display()));
        }

        let displaced = self.layout.displaced_link_path(current_unix_timestamp());
        warn!(
            path = %link.display(),
            moved_to = %displaced.display(),
            "active path is not a symlink; moving it aside"
        );
        fs::rename(link, &displaced).with_context(|| {
            format!(
                "failed to move {} aside to {}",
                link.display(),
                displaced.display()
            )
        })
    }

    fn create_link(&self, target: &Path) -> Result<()> {
        let link = self.layout.active_link();
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!(
                "failed to create symlink {} -> {}",
                link.display(),
                target.display()
            )
        })
    }

    fn read_name(&self) -> Result<Option<String>> {
        let path = self.layout.current_pointer_path();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read current fork file: {}", path.display()));
            }
        };

        let name = raw.trim();
        if name.is_empty() {
            return Ok(None);
        }
        Ok(Some(name.to_string()))
    }

    fn write_name(&self, name: &str) -> Result<()> {
        let path = self.layout.current_pointer_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let staged = path.with_extension("tmp");
        let mut file = fs::File::create(&staged)
            .with_context(|| format!("failed to create {}", staged.display()))?;
        file.write_all(format!("{name}\n").as_bytes())
            .with_context(|| format!("failed to write {}", staged.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to flush {}", staged.display()))?;
        fs::rename(&staged, path)
            .with_context(|| format!("failed to replace current fork file: {}", path.display()))
    }
}

/// Keeps the pointer in memory. Used for tests and dry runs.
#[derive(Debug)]
pub struct MemoryPointerStore {
    link: RefCell<LinkState>,
    name: RefCell<Option<String>>,
    fail_next_create_link: Cell<bool>,
}

impl Default for MemoryPointerStore {
    fn default() -> Self {
        Self {
            link: RefCell::new(LinkState::Missing),
            name: RefCell::new(None),
            fail_next_create_link: Cell::new(false),
        }
    }
}

impl MemoryPointerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_link(&self, state: LinkState) {
        *self.link.borrow_mut() = state;
    }

    pub fn set_name(&self, name: Option<&str>) {
        *self.name.borrow_mut() = name.map(str::to_string);
    }

    pub fn fail_next_create_link(&self) {
        self.fail_next_create_link.set(true);
    }

    pub fn link_target(&self) -> Option<PathBuf> {
        match &*self.link.borrow() {
            LinkState::Resolved { target, .. } | LinkState::Dangling { target } => {
                Some(target.clone())
            }
            LinkState::Missing | LinkState::NotSymlink => None,
        }
    }
}

impl PointerStore for MemoryPointerStore {
    fn read_link(&self) -> Result<LinkState> {
        Ok(self.link.borrow().clone())
    }

    fn clear_link(&self) -> Result<()> {
        *self.link.borrow_mut() = LinkState::Missing;
        Ok(())
    }

    fn create_link(&self, target: &Path) -> Result<()> {
        if self.fail_next_create_link.replace(false) {
            anyhow::bail!("failed to create symlink -> {}", target.display());
        }
        if !matches!(&*self.link.borrow(), LinkState::Missing) {
            anyhow::bail!("link path is occupied");
        }
        *self.link.borrow_mut() = LinkState::Resolved {
            target: target.to_path_buf(),
            resolved: target.to_path_buf(),
        };
        Ok(())
    }

    fn read_name(&self) -> Result<Option<String>> {
        Ok(self.name.borrow().clone())
    }

    fn write_name(&self, name: &str) -> Result<()> {
        *self.name.borrow_mut() = Some(name.to_string());
        Ok(())
    }
}
