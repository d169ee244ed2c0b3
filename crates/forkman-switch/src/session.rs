use std::path::PathBuf;

use forkman_vcs::Vcs;
use tracing::debug;

use crate::{ActivePointerController, PointerStore};

/// An operation in progress. Dropping it without `commit` runs the cleanup
/// path: transient paths are removed, the previously active variant is
/// relinked and, if its state was backed up during this operation, restored.
///
/// Error returns, `?` propagation, panics and interrupt-triggered aborts all
/// leave through `Drop`.
pub struct OperationScope<'c, S: PointerStore, V: Vcs> {
    controller: &'c ActivePointerController<S, V>,
    operation: &'static str,
    previous: Option<String>,
    backup_taken: bool,
    transient: Vec<PathBuf>,
    committed: bool,
}

impl<'c, S: PointerStore, V: Vcs> OperationScope<'c, S, V> {
    pub(crate) fn new(
        controller: &'c ActivePointerController<S, V>,
        operation: &'static str,
        previous: Option<String>,
    ) -> Self {
        debug!(operation, previous = ?previous, "operation started");
        Self {
            controller,
            operation,
            previous,
            backup_taken: false,
            transient: Vec::new(),
            committed: false,
        }
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Registers a path that must not survive an unfinished operation.
    pub fn track_transient(&mut self, path: PathBuf) {
        self.transient.push(path);
    }

    pub fn mark_backup_taken(&mut self) {
        self.backup_taken = true;
    }

    pub fn commit(&mut self) {
        self.committed = true;
        debug!(operation = self.operation, "operation committed");
    }
}

impl<S: PointerStore, V: Vcs> Drop for OperationScope<'_, S, V> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        self.controller.cleanup(
            self.operation,
            self.previous.as_deref(),
            self.backup_taken,
            &self.transient,
        );
    }
}
