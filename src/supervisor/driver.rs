//! The outer run loop and its one-shot interrupt handler.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

use crate::error::Result;
use crate::supervisor::event_loop::{Progress, Supervisor};

/// Set by the first SIGINT; the loop exits at the next iteration boundary.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signo: i32) {
    INTERRUPTED.store(true, Ordering::Release);
}

/// Install the one-shot SIGINT handler.
///
/// `SA_RESETHAND` restores the default disposition the moment the handler
/// fires, so a second SIGINT terminates the process immediately.
fn install_interrupt_handler() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_interrupt),
        SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic, which is
    // async-signal-safe.
    unsafe { sigaction(Signal::SIGINT, &action) }?;
    Ok(())
}

/// Drive `resume` until the first SIGINT.
///
/// Iteration errors are reported and survived; this tool never stops
/// itself, the operator stops it. Iterations that made no progress yield
/// the scheduler so the loop does not spin between readiness events.
pub fn run(mut supervisor: Supervisor) -> Result<()> {
    install_interrupt_handler()?;
    while !INTERRUPTED.load(Ordering::Acquire) {
        match supervisor.resume() {
            Ok(Progress::Advanced) => {}
            Ok(Progress::Idle) => std::thread::yield_now(),
            Err(err) => {
                tracing::error!(error = %err, "supervisor iteration failed");
                std::thread::yield_now();
            }
        }
    }
    Ok(())
}
