use anyhow::{Context, Result};
use forkman_core::request_interrupt;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

extern "C" fn on_terminate(_signal: nix::libc::c_int) {
    request_interrupt();
}

/// Routes SIGINT and SIGTERM to the process-wide interrupt flag.
///
/// No `SA_RESTART`: a blocking prompt read returns early so the shell can
/// notice the flag and unwind through the cleanup path.
pub fn install_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_terminate),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only stores to an atomic flag.
        unsafe { sigaction(signal, &action) }
            .with_context(|| format!("failed to install {signal} handler"))?;
    }
    Ok(())
}
