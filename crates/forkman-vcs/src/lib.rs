mod git_ops;

use std::path::Path;

use anyhow::Result;

pub use git_ops::{base_git_command, GitCli};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrateOutcome {
    Integrated,
    Conflict,
}

/// Version-control capability used by the registry, controller and update checker.
///
/// `branch` of `None` means the remote's default branch.
pub trait Vcs: Sync {
    fn is_available(&self) -> bool;

    fn is_repository(&self, repo: &Path) -> bool;

    fn clone_repo(&self, url: &str, branch: Option<&str>, destination: &Path) -> Result<()>;

    fn fetch(&self, repo: &Path, branch: Option<&str>) -> Result<()>;

    fn local_commit(&self, repo: &Path) -> Result<String>;

    /// Head of the remote branch as advertised right now. Never touches the work tree.
    fn remote_commit(&self, repo: &Path, branch: Option<&str>) -> Result<String>;

    fn has_local_changes(&self, repo: &Path) -> Result<bool>;

    /// Rebases local history onto what the last `fetch` brought in.
    fn integrate(&self, repo: &Path) -> Result<IntegrateOutcome>;
}

#[cfg(test)]
mod tests;
