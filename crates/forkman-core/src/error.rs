use thiserror::Error;

/// Failures the operator can act on. Carried inside `anyhow::Error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForkError {
    #[error("invalid variant name '{name}': use only letters, digits, '-' and '_'")]
    InvalidName { name: String },
    #[error("variant '{name}' already exists")]
    AlreadyExists { name: String },
    #[error("variant '{name}' not found")]
    NotFound { name: String },
    #[error("variant '{name}' is active and cannot be removed")]
    IsActive { name: String },
    #[error("variant '{name}' has no origin record; cannot update")]
    NoOrigin { name: String },
    #[error("clone of {url} ({}) failed: {reason}", branch_label(branch))]
    CloneFailed {
        url: String,
        branch: String,
        reason: String,
    },
    #[error("fetch of {url} ({}) failed: {reason}", branch_label(branch))]
    FetchFailed {
        url: String,
        branch: String,
        reason: String,
    },
    #[error("integrating {url} ({}) conflicts with local history: {reason}", branch_label(branch))]
    MergeConflict {
        url: String,
        branch: String,
        reason: String,
    },
    #[error("active pointer diverged: {detail}")]
    Divergent { detail: String },
    #[error("could not fetch reference copy from {url}: {reason}")]
    FetchError { url: String, reason: String },
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
    #[error("operation interrupted")]
    Interrupted,
    #[error("required tool '{name}' is not available")]
    MissingCapability { name: String },
    #[error("forkman must run as root")]
    PrivilegeRequired,
}

fn branch_label(branch: &str) -> &str {
    if branch.is_empty() {
        "default branch"
    } else {
        branch
    }
}

impl ForkError {
    /// Failures after which the process cannot continue serving the operator.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RetriesExhausted { .. }
                | Self::Interrupted
                | Self::MissingCapability { .. }
                | Self::PrivilegeRequired
        )
    }
}
