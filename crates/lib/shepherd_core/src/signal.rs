//! Stop signals understood by the terminators.

use std::fmt;
use std::str::FromStr;

/// Signal used for the first phase of a tree termination.
///
/// Everything except [`StopSignal::Kill`] is graceful: the child may catch it
/// and shut down on its own before the forced phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StopSignal {
    Interrupt,
    #[default]
    Terminate,
    HangUp,
    Kill,
}

impl StopSignal {
    pub fn is_graceful(self) -> bool {
        !matches!(self, StopSignal::Kill)
    }

    /// Conventional signal name (`SIGTERM` etc.).
    pub fn name(self) -> &'static str {
        match self {
            StopSignal::Interrupt => "SIGINT",
            StopSignal::Terminate => "SIGTERM",
            StopSignal::HangUp => "SIGHUP",
            StopSignal::Kill => "SIGKILL",
        }
    }

    /// Raw signal number, as used by `kill(2)`.
    #[cfg(unix)]
    pub fn as_raw(self) -> libc::c_int {
        match self {
            StopSignal::Interrupt => libc::SIGINT,
            StopSignal::Terminate => libc::SIGTERM,
            StopSignal::HangUp => libc::SIGHUP,
            StopSignal::Kill => libc::SIGKILL,
        }
    }

    pub(crate) fn to_sysinfo(self) -> sysinfo::Signal {
        match self {
            StopSignal::Interrupt => sysinfo::Signal::Interrupt,
            StopSignal::Terminate => sysinfo::Signal::Term,
            StopSignal::HangUp => sysinfo::Signal::Hangup,
            StopSignal::Kill => sysinfo::Signal::Kill,
        }
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a signal name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stop signal `{0}` (expected INT, TERM, HUP or KILL)")]
pub struct ParseSignalError(String);

impl FromStr for StopSignal {
    type Err = ParseSignalError;

    /// Accepts `TERM`, `SIGTERM`, `term`, and the numeric forms `2`, `15`, `1`, `9`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("SIG").unwrap_or(&upper);
        match name {
            "INT" | "2" => Ok(StopSignal::Interrupt),
            "TERM" | "15" => Ok(StopSignal::Terminate),
            "HUP" | "1" => Ok(StopSignal::HangUp),
            "KILL" | "9" => Ok(StopSignal::Kill),
            _ => Err(ParseSignalError(s.to_string())),
        }
    }
}
