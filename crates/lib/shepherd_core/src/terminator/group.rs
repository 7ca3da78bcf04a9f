//! Process-group termination (Unix).
//!
//! The child is spawned with `setpgid(0, 0)`, so its pid doubles as the
//! process-group id and one `killpg` reaches every descendant that stayed in
//! the group.

use std::io;
use std::time::Duration;

use crate::error::TerminationError;
use crate::pid_watch;
use crate::signal::StopSignal;

use super::{CONFIRM_TIMEOUT, Terminator};

/// Signals the child's process group, escalating to `SIGKILL`.
#[derive(Debug, Clone)]
pub struct GroupTerminator {
    grace: Duration,
}

impl GroupTerminator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl Terminator for GroupTerminator {
    fn kill_tree(&self, pid: u32, signal: StopSignal) -> Result<(), TerminationError> {
        let mut errors = Vec::new();

        if signal.is_graceful() {
            match signal_group(pid, signal) {
                Ok(()) => {
                    log::debug!("sent {signal} to process group {pid}");
                    if pid_watch::wait_until(self.grace, || !pid_watch::is_group_alive(pid)) {
                        return Ok(());
                    }
                    log::warn!(
                        "process group {pid} still running {:?} after {signal}; sending SIGKILL",
                        self.grace
                    );
                }
                Err(e) if e.raw_os_error() == Some(libc::ESRCH) => return Ok(()),
                Err(e) => {
                    log::warn!("failed to send {signal} to process group {pid}: {e}");
                    errors.push(format!("{signal} to group {pid}: {e}"));
                }
            }
        }

        match signal_group(pid, StopSignal::Kill) {
            Ok(()) => log::debug!("sent SIGKILL to process group {pid}"),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {}
            Err(e) => {
                log::warn!("failed to send SIGKILL to process group {pid}: {e}");
                errors.push(format!("SIGKILL to group {pid}: {e}"));
            }
        }

        // The leader may already be reaped while the rest of its group is not.
        if pid_watch::wait_for_exit(pid, CONFIRM_TIMEOUT)
            && pid_watch::wait_until(CONFIRM_TIMEOUT, || !pid_watch::is_group_alive(pid))
        {
            Ok(())
        } else {
            Err(TerminationError::NotConfirmed { pid, errors })
        }
    }

    fn needs_process_group(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "process-group"
    }
}

/// Send `signal` to every member of process group `pgid`.
fn signal_group(pgid: u32, signal: StopSignal) -> io::Result<()> {
    let raw = libc::pid_t::try_from(pgid)
        .ok()
        .filter(|raw| *raw > 1)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "refusing to signal pgid <= 1"))?;

    // SAFETY: killpg has no memory-safety preconditions; the pgid was range-checked.
    if unsafe { libc::killpg(raw, signal.as_raw()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
