//! Error types for supervision and termination.

use std::io;

use thiserror::Error;

/// Exit status used when the executable could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;

/// Exit status used when the executable exists but cannot be run.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit status used for internal supervisor faults (`EX_SOFTWARE`).
pub const EXIT_SOFTWARE: i32 = 70;

/// Errors returned by [`Supervisor::start`](crate::Supervisor::start).
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("supervisor for {label} was already started")]
    AlreadyStarted { label: String },

    #[error("invalid supervision spec: {0}")]
    InvalidSpec(#[from] SpecError),

    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("supervisor fault while watching {label}: {source}")]
    Fault {
        label: String,
        #[source]
        source: io::Error,
    },
}

impl SupervisorError {
    /// Maps the error to the status a CLI caller should exit with.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::Spawn { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => EXIT_NOT_FOUND,
                io::ErrorKind::PermissionDenied => EXIT_NOT_EXECUTABLE,
                _ => 1,
            },
            SupervisorError::Fault { .. } => EXIT_SOFTWARE,
            SupervisorError::AlreadyStarted { .. } | SupervisorError::InvalidSpec(_) => 1,
        }
    }
}

/// Spec validation failures.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("command must not be empty")]
    EmptyCommand,

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

/// The terminator could not confirm that a process tree stopped.
///
/// Only ever logged; termination is best-effort.
#[derive(Debug, Error)]
pub enum TerminationError {
    #[error("process {pid} still present after forced kill ({} signal error(s))", errors.len())]
    NotConfirmed { pid: u32, errors: Vec<String> },
}

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
