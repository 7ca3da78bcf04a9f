//! Exit outcome of a supervised child and what caused it to stop.

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use crate::signal::StopSignal;

/// Exit status reported when the supervisor stopped the child on timeout
/// (same convention as GNU `timeout`).
pub const EXIT_TIMED_OUT: i32 = 124;

/// Base added to a signal number when the child died from that signal.
pub const EXIT_SIGNAL_BASE: i32 = 128;

/// Termination request delivered to the supervisor by its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostSignal {
    /// SIGINT / Ctrl-C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGHUP.
    HangUp,
    /// Windows Ctrl-Break.
    Break,
    /// Windows console window closing.
    ConsoleClose,
}

impl HostSignal {
    /// Signal relayed to the child's tree for this request.
    pub fn relayed(self) -> StopSignal {
        match self {
            HostSignal::Interrupt | HostSignal::Break => StopSignal::Interrupt,
            HostSignal::Terminate | HostSignal::ConsoleClose => StopSignal::Terminate,
            HostSignal::HangUp => StopSignal::HangUp,
        }
    }

    /// Status the supervisor exits with if it has to give up on the child.
    pub fn exit_code(self) -> i32 {
        match self {
            HostSignal::Interrupt | HostSignal::Break => EXIT_SIGNAL_BASE + 2,
            HostSignal::Terminate => EXIT_SIGNAL_BASE + 15,
            HostSignal::HangUp | HostSignal::ConsoleClose => EXIT_SIGNAL_BASE + 1,
        }
    }
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostSignal::Interrupt => "SIGINT",
            HostSignal::Terminate => "SIGTERM",
            HostSignal::HangUp => "SIGHUP",
            HostSignal::Break => "Ctrl-Break",
            HostSignal::ConsoleClose => "console close",
        };
        f.write_str(s)
    }
}

/// Which trigger won the termination latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// Explicit `terminate` call.
    Requested,
    /// The configured deadline elapsed.
    Timeout { after: Duration },
    /// The supervisor's host asked it to stop.
    Signal(HostSignal),
    /// The supervising process panicked.
    Fault,
    /// The supervisor went away while the child was still running.
    Shutdown,
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::Requested => f.write_str("stop requested"),
            StopCause::Timeout { after } => write!(f, "timed out after {after:?}"),
            StopCause::Signal(sig) => write!(f, "received {sig}"),
            StopCause::Fault => f.write_str("supervisor fault"),
            StopCause::Shutdown => f.write_str("supervisor shutting down"),
        }
    }
}

/// Resolved result of one supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, when the child exited normally.
    pub code: Option<i32>,
    /// Terminating signal, when the child was killed by one.
    pub signal: Option<i32>,
    /// Set when the supervisor initiated the stop.
    pub cause: Option<StopCause>,
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus, cause: Option<StopCause>) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            cause,
        }
    }

    /// Whether the supervisor stopped the child because its deadline passed.
    pub fn timed_out(&self) -> bool {
        matches!(self.cause, Some(StopCause::Timeout { .. }))
    }

    /// Single status to report to the caller.
    ///
    /// Timeout wins, then the child's own code, then `128 + signal`.
    pub fn exit_code(&self) -> i32 {
        if self.timed_out() {
            return EXIT_TIMED_OUT;
        }
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(sig)) => EXIT_SIGNAL_BASE + sig,
            (None, None) => 1,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code() == 0
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}")?,
            (None, Some(sig)) => write!(f, "signal {sig}")?,
            (None, None) => f.write_str("unknown status")?,
        }
        if let Some(cause) = self.cause {
            write!(f, " ({cause})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(code: Option<i32>, signal: Option<i32>, cause: Option<StopCause>) -> ExitOutcome {
        ExitOutcome {
            code,
            signal,
            cause,
        }
    }

    #[test]
    fn plain_exit_code_passes_through() {
        assert_eq!(outcome(Some(3), None, None).exit_code(), 3);
        assert!(outcome(Some(0), None, None).success());
    }

    #[test]
    fn signal_death_uses_shell_convention() {
        assert_eq!(outcome(None, Some(15), None).exit_code(), 143);
        assert_eq!(outcome(None, Some(9), None).exit_code(), 137);
    }

    #[test]
    fn timeout_is_distinguishable() {
        let timed_out = outcome(
            None,
            Some(15),
            Some(StopCause::Timeout {
                after: Duration::from_millis(500),
            }),
        );
        assert!(timed_out.timed_out());
        assert_eq!(timed_out.exit_code(), EXIT_TIMED_OUT);

        let requested = outcome(None, Some(15), Some(StopCause::Requested));
        assert!(!requested.timed_out());
        assert_eq!(requested.exit_code(), 143);
    }

    #[test]
    fn displays_cause() {
        let o = outcome(
            None,
            Some(2),
            Some(StopCause::Signal(HostSignal::Interrupt)),
        );
        assert_eq!(o.to_string(), "signal 2 (received SIGINT)");
    }

    #[test]
    fn host_signals_relay_matching_stop_signal() {
        assert_eq!(HostSignal::Interrupt.relayed(), StopSignal::Interrupt);
        assert_eq!(HostSignal::HangUp.relayed(), StopSignal::HangUp);
        assert_eq!(HostSignal::ConsoleClose.relayed(), StopSignal::Terminate);
        assert_eq!(HostSignal::Terminate.exit_code(), 143);
    }
}
