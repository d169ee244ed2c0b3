mod backup;
mod controller;
mod fs_utils;
mod pointer;
mod self_update;
mod session;
mod updates;

pub use backup::StateBackup;
pub use controller::{
    ActivePointerController, PointerState, SetupRequest, SwitchOutcome, VerifyReport,
};
pub use pointer::{ActivePointer, FsPointerStore, LinkState, MemoryPointerStore, PointerStore};
pub use self_update::{
    apply_self_update, check_self, replace_executable, ScriptSource, SelfUpdateOutcome,
    SelfUpdateStatus,
};
pub use session::OperationScope;
pub use updates::{check_all, check_variant, update_variant, UpdateStatus, VariantUpdate};
