//! Shared termination latch.
//!
//! A [`TerminationHandle`] is the only way anything outside
//! [`Supervisor::start`](crate::Supervisor::start) can stop the child. Every
//! trigger (explicit calls, host signals, the deadline, panics, drop) funnels
//! through [`TerminationHandle::request`], and the first one to claim the
//! latch runs the kill sequence. Everything after that is a no-op.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

use crate::outcome::StopCause;
use crate::signal::StopSignal;
use crate::state::{AtomicState, State};
use crate::terminator::Terminator;

/// Latch and pid, guarded together so that "claim the latch + read the pid"
/// and "publish the pid + read a pending claim" cannot interleave.
#[derive(Debug, Default)]
struct Control {
    pid: Option<u32>,
    claim: Option<(StopCause, StopSignal)>,
    /// Set once the child is reaped; later claims are lost.
    closed: bool,
    /// A kill sequence has been handed a pid.
    killing: bool,
}

struct Shared {
    label: String,
    terminator: Arc<dyn Terminator>,
    state: AtomicState,
    control: Mutex<Control>,
    requests: AtomicUsize,
    kill_attempts: AtomicUsize,
    kill_done: AtomicBool,
    kill_finished: Notify,
}

/// Cloneable handle to one supervisor's termination latch.
#[derive(Clone)]
pub struct TerminationHandle {
    shared: Arc<Shared>,
}

impl TerminationHandle {
    pub(crate) fn new(label: String, terminator: Arc<dyn Terminator>) -> Self {
        Self {
            shared: Arc::new(Shared {
                label,
                terminator,
                state: AtomicState::new(),
                control: Mutex::new(Control::default()),
                requests: AtomicUsize::new(0),
                kill_attempts: AtomicUsize::new(0),
                kill_done: AtomicBool::new(false),
                kill_finished: Notify::new(),
            }),
        }
    }

    /// Stop the child's process tree, starting with `signal`.
    ///
    /// Idempotent and safe to call concurrently from anywhere. Never blocks:
    /// the kill sequence runs on its own thread.
    pub fn terminate(&self, signal: StopSignal) {
        self.request(StopCause::Requested, signal);
    }

    /// Claim the latch for `cause` and start the kill sequence in the background.
    ///
    /// Returns `true` if this call won the latch.
    pub(crate) fn request(&self, cause: StopCause, signal: StopSignal) -> bool {
        match self.claim(cause, signal) {
            Claim::Kill(pid) => {
                self.spawn_kill(pid, signal);
                true
            }
            Claim::Deferred => true,
            Claim::Lost => false,
        }
    }

    /// Like [`request`](Self::request), but runs the kill sequence on the
    /// calling thread. Used from drop and panic paths where nothing else will.
    pub(crate) fn request_blocking(&self, cause: StopCause, signal: StopSignal) -> bool {
        match self.claim(cause, signal) {
            Claim::Kill(pid) => {
                self.run_kill(pid, signal);
                true
            }
            Claim::Deferred => true,
            Claim::Lost => false,
        }
    }

    fn claim(&self, cause: StopCause, signal: StopSignal) -> Claim {
        self.shared.requests.fetch_add(1, Ordering::SeqCst);

        let mut control = self.control();
        if control.claim.is_some() || control.closed || self.shared.state.get() == State::Exited
        {
            return Claim::Lost;
        }
        control.claim = Some((cause, signal));

        match control.pid {
            Some(pid) => {
                control.killing = true;
                self.shared.state.advance(State::Terminating);
                log::warn!("{}: {cause}; stopping process tree {pid}", self.shared.label);
                Claim::Kill(pid)
            }
            None => {
                log::info!("{}: {cause} before spawn; stop deferred", self.shared.label);
                Claim::Deferred
            }
        }
    }

    /// Publish the child's pid. Returns the pending claim if `terminate` won
    /// the latch before the pid was known; the caller must then kill.
    pub(crate) fn attach(&self, pid: u32) -> Option<StopSignal> {
        let mut control = self.control();
        control.pid = Some(pid);
        self.shared.state.advance(State::Running);

        let (cause, signal) = control.claim?;
        control.killing = true;
        self.shared.state.advance(State::Terminating);
        log::warn!("{}: {cause}; stopping process tree {pid}", self.shared.label);
        Some(signal)
    }

    /// The child has been reaped: drop the pid and refuse further claims, so
    /// a late trigger can neither signal a recycled pid nor rewrite the cause.
    ///
    /// Returns `true` if a kill sequence was started and may still be running.
    pub(crate) fn close(&self) -> bool {
        let mut control = self.control();
        control.closed = true;
        control.pid = None;
        control.killing
    }

    /// Wait up to `bound` for a started kill sequence to finish. Returns
    /// `false` on timeout.
    pub(crate) async fn settled(&self, bound: Duration) -> bool {
        let mut finished = std::pin::pin!(self.shared.kill_finished.notified());
        finished.as_mut().enable();
        if self.shared.kill_done.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::timeout(bound, finished).await.is_ok()
    }

    /// Record the exit: drop the pid and move to `Exited`.
    pub(crate) fn detach(&self) {
        let mut control = self.control();
        control.pid = None;
        self.shared.state.advance(State::Exited);
    }

    pub(crate) fn spawn_kill(&self, pid: u32, signal: StopSignal) {
        let handle = self.clone();
        let spawned = std::thread::Builder::new()
            .name("shepherd-terminate".into())
            .spawn(move || handle.run_kill(pid, signal));
        if let Err(e) = spawned {
            log::warn!("cannot spawn terminate thread ({e}); terminating inline");
            self.run_kill(pid, signal);
        }
    }

    fn run_kill(&self, pid: u32, signal: StopSignal) {
        self.shared.kill_attempts.fetch_add(1, Ordering::SeqCst);
        let terminator = &self.shared.terminator;
        log::debug!(
            "{}: {} termination of {pid} with {signal}",
            self.shared.label,
            terminator.name()
        );
        match terminator.kill_tree(pid, signal) {
            Ok(()) => log::debug!("{}: process tree {pid} stopped", self.shared.label),
            Err(e) => log::warn!("{}: {e}", self.shared.label),
        }
        self.shared.kill_done.store(true, Ordering::SeqCst);
        self.shared.kill_finished.notify_waiters();
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        self.shared
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Diagnostic label of the supervised child.
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Pid of the running child, if any.
    pub fn pid(&self) -> Option<u32> {
        self.control().pid
    }

    pub fn state(&self) -> State {
        self.shared.state.get()
    }

    /// `true` once the child has exited and cleanup is done.
    pub fn is_terminated(&self) -> bool {
        self.state() == State::Exited
    }

    /// Trigger that won the latch, if any.
    pub fn cause(&self) -> Option<StopCause> {
        self.control().claim.map(|(cause, _)| cause)
    }

    /// Number of termination requests received, including no-ops.
    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    /// Number of kill sequences actually started (0 or 1).
    pub fn kill_attempts(&self) -> usize {
        self.shared.kill_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn needs_process_group(&self) -> bool {
        self.shared.terminator.needs_process_group()
    }
}

impl std::fmt::Debug for TerminationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationHandle")
            .field("label", &self.shared.label)
            .field("state", &self.state())
            .field("terminator", &self.shared.terminator.name())
            .finish()
    }
}

enum Claim {
    /// Latch won and the pid is known.
    Kill(u32),
    /// Latch won before spawn; `attach` will start the kill.
    Deferred,
    /// Someone else already won, or the child is gone.
    Lost,
}
