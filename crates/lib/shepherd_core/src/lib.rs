//! # shepherd_core
//!
//! Process supervision and termination cascade for a single child process.
//!
//! A [`Supervisor`] spawns the command described by a [`SupervisionSpec`],
//! waits for it, and makes sure the child and everything it spawned is gone
//! when the supervisor is asked to stop, when the host process is stopped, or
//! when the optional timeout elapses.

pub mod error;
mod handle;
pub mod outcome;
pub mod pid_watch;
mod registry;
pub mod signal;
pub mod spec;
pub mod state;
mod supervisor;
mod terminal;
pub mod terminator;
mod title;

pub use error::{Result, SpecError, SupervisorError, TerminationError};
pub use handle::TerminationHandle;
pub use outcome::{ExitOutcome, HostSignal, StopCause};
pub use signal::{ParseSignalError, StopSignal};
pub use spec::{IoMode, SupervisionSpec};
pub use state::State;
pub use supervisor::{DEFAULT_FORCE_EXIT_AFTER, Supervisor, SupervisorOptions};
#[cfg(unix)]
pub use terminator::GroupTerminator;
pub use terminator::{ProcessTable, SysinfoTable, Terminator, TerminatorKind, TreeTerminator};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
