//! Supervisor lifecycle state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a single supervised child.
///
/// Ordered: a supervisor only ever moves forward through these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    NotStarted = 0,
    Running = 1,
    Terminating = 2,
    Exited = 3,
}

impl State {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => State::NotStarted,
            1 => State::Running,
            2 => State::Terminating,
            _ => State::Exited,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::NotStarted => "not started",
            State::Running => "running",
            State::Terminating => "terminating",
            State::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// Lock-free cell that only accepts forward transitions.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(State::NotStarted as u8))
    }

    pub(crate) fn get(&self) -> State {
        State::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Moves to `next` if it lies ahead of the current state.
    ///
    /// Returns `false` (and changes nothing) for backward or repeated moves.
    pub(crate) fn advance(&self, next: State) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                (next as u8 > cur).then_some(next as u8)
            })
            .is_ok()
    }
}
