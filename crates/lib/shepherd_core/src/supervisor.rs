//! The supervisor: spawn one child, watch it, stop its tree on demand.

use std::process::Stdio;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::{Result, SupervisorError};
use crate::handle::TerminationHandle;
use crate::outcome::{ExitOutcome, StopCause};
use crate::pid_watch;
use crate::registry;
use crate::signal::StopSignal;
use crate::spec::SupervisionSpec;
use crate::state::State;
use crate::terminal::Foreground;
use crate::terminator::{CONFIRM_TIMEOUT, DEFAULT_GRACE_PERIOD, TerminatorKind};
use crate::title;

/// Default delay before an interrupted supervisor gives up on its child and
/// exits on its own.
pub const DEFAULT_FORCE_EXIT_AFTER: Duration = Duration::from_secs(5);

/// Slack on top of grace + confirmation when waiting for a kill sequence.
const SETTLE_MARGIN: Duration = Duration::from_secs(1);

/// Runtime knobs that are not part of the child's contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    pub terminator: TerminatorKind,
    /// Wait between the graceful and forced kill phases.
    pub grace_period: Duration,
    /// Relay host interruption signals to the child's tree.
    pub relay_signals: bool,
    /// Stop the child's tree when the supervising process panics.
    pub handle_faults: bool,
    /// After a relayed host signal, exit the process if the child is still
    /// running this long afterwards. `None` waits forever.
    pub force_exit_after: Option<Duration>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            terminator: TerminatorKind::default(),
            grace_period: DEFAULT_GRACE_PERIOD,
            relay_signals: true,
            handle_faults: true,
            force_exit_after: Some(DEFAULT_FORCE_EXIT_AFTER),
        }
    }
}

impl SupervisorOptions {
    pub fn terminator(mut self, kind: TerminatorKind) -> Self {
        self.terminator = kind;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn relay_signals(mut self, enabled: bool) -> Self {
        self.relay_signals = enabled;
        self
    }

    pub fn handle_faults(mut self, enabled: bool) -> Self {
        self.handle_faults = enabled;
        self
    }

    pub fn force_exit_after(mut self, after: Option<Duration>) -> Self {
        self.force_exit_after = after;
        self
    }
}

/// Supervises a single child process. Single use: [`start`](Self::start)
/// runs at most once.
///
/// ```no_run
/// # async fn demo() -> shepherd_core::Result<()> {
/// use shepherd_core::{SupervisionSpec, Supervisor};
///
/// let spec = SupervisionSpec::new("npx").arg("some-server");
/// let supervisor = Supervisor::new(spec);
/// let outcome = supervisor.start().await?;
/// std::process::exit(outcome.exit_code());
/// # }
/// ```
pub struct Supervisor {
    spec: SupervisionSpec,
    options: SupervisorOptions,
    handle: TerminationHandle,
    started: AtomicBool,
    outcome: OnceLock<ExitOutcome>,
}

impl Supervisor {
    pub fn new(spec: SupervisionSpec) -> Self {
        Self::with_options(spec, SupervisorOptions::default())
    }

    pub fn with_options(spec: SupervisionSpec, options: SupervisorOptions) -> Self {
        let terminator = options.terminator.build(options.grace_period);
        let handle = TerminationHandle::new(spec.label(), terminator);
        Self {
            spec,
            options,
            handle,
            started: AtomicBool::new(false),
            outcome: OnceLock::new(),
        }
    }

    /// Spawn the child and wait for it to exit.
    ///
    /// Resolves once the child is gone, any kill sequence it triggered has
    /// finished with its descendants, and every cleanup handler has been
    /// removed. Dropping the future early stops the child's tree.
    pub async fn start(&self) -> Result<ExitOutcome> {
        let label = self.handle.label().to_owned();
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SupervisorError::AlreadyStarted { label });
        }

        if let Err(e) = self.spec.validate() {
            self.handle.detach();
            return Err(e.into());
        }

        // Restored on every way out, including a failed exec.
        let terminal = self.lend_terminal();

        let mut child = match self.command(terminal.is_some()).spawn() {
            Ok(child) => child,
            Err(source) => {
                log::debug!("{label}: spawn of `{}` failed: {source}", self.spec.command);
                self.handle.detach();
                return Err(SupervisorError::Spawn {
                    command: self.spec.command.clone(),
                    source,
                });
            }
        };

        // Handlers go in before the pid is published: a trigger in between
        // is deferred by the latch and picked up by `attach`.
        let registration = registry::register(&self.handle, &self.options);

        if let Some(pid) = child.id() {
            if let Some(signal) = self.handle.attach(pid) {
                self.handle.spawn_kill(pid, signal);
            }
            title::set(&label, pid);
            log::info!(
                "{label}: started `{}` as pid {pid} ({} termination)",
                self.spec.command,
                self.options.terminator
            );
        }

        let deadline = self
            .spec
            .timeout_duration()
            .map(|after| Deadline::arm(self.handle.clone(), after));

        let status = match child.wait().await {
            Ok(status) => status,
            Err(source) => {
                drop(deadline);
                log::error!("{label}: lost track of child: {source}");
                self.handle.request(StopCause::Fault, StopSignal::Terminate);
                if let Err(e) = child.start_kill() {
                    log::warn!("{label}: cannot kill child: {e}");
                }
                if self.handle.close() {
                    self.settle().await;
                }
                self.handle.detach();
                registration.deregister();
                drop(terminal);
                return Err(SupervisorError::Fault { label, source });
            }
        };

        // Close the latch before the deadline can fire on a reaped child.
        let killing = self.handle.close();
        drop(deadline);
        if killing {
            self.settle().await;
        }

        self.handle.detach();
        registration.deregister();
        drop(terminal);

        let outcome = ExitOutcome::from_status(status, self.handle.cause());
        log::info!("{label}: exited with {outcome}");
        // `started` guarantees a single writer.
        let _ = self.outcome.set(outcome);
        Ok(outcome)
    }

    /// Stop the child's tree. Idempotent; returns immediately.
    pub fn terminate(&self, signal: StopSignal) {
        self.handle.terminate(signal);
    }

    /// A cloneable handle for stopping the child from elsewhere.
    pub fn handle(&self) -> TerminationHandle {
        self.handle.clone()
    }

    pub fn spec(&self) -> &SupervisionSpec {
        &self.spec
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.pid()
    }

    pub fn state(&self) -> State {
        self.handle.state()
    }

    pub fn is_terminated(&self) -> bool {
        self.handle.is_terminated()
    }

    /// The resolved outcome, once `start` has returned successfully.
    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.outcome.get().copied()
    }

    pub fn kill_attempts(&self) -> usize {
        self.handle.kill_attempts()
    }

    /// Wait for the kill sequence to finish with the descendants.
    async fn settle(&self) {
        let bound = self.options.grace_period + CONFIRM_TIMEOUT * 2 + SETTLE_MARGIN;
        if !self.handle.settled(bound).await {
            log::warn!(
                "{}: kill sequence still running after {bound:?}",
                self.handle.label()
            );
        }
    }

    /// Hand the terminal to the child's own process group, if it gets one
    /// and the supervisor holds the foreground.
    fn lend_terminal(&self) -> Option<Foreground> {
        if !self.spec.detached && self.handle.needs_process_group() {
            Foreground::lend()
        } else {
            None
        }
    }

    fn command(&self, take_terminal: bool) -> Command {
        let spec = &self.spec;
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.arguments)
            .envs(&spec.environment)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_directory {
            command.current_dir(dir);
        }
        self.place(&mut command, take_terminal);
        command
    }

    /// Session and process-group placement.
    #[cfg(unix)]
    fn place(&self, command: &mut Command, take_terminal: bool) {
        let detached = self.spec.detached;
        let die_with_parent = self.spec.die_with_parent;

        // setsid also makes the child a group leader, and fails if it already is one.
        if !detached && self.handle.needs_process_group() {
            command.process_group(0);
        }

        #[cfg(not(target_os = "linux"))]
        {
            if die_with_parent {
                log::debug!("dieWithParent is only supported on Linux");
            }
        }

        if detached || die_with_parent || take_terminal {
            // SAFETY: the hook only makes async-signal-safe syscalls.
            unsafe {
                command.pre_exec(move || {
                    if detached && libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    // Runs after setpgid, so this hands over the child's own group.
                    if take_terminal {
                        let _ = crate::terminal::take_foreground();
                    }
                    #[cfg(target_os = "linux")]
                    {
                        if die_with_parent
                            && libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1
                        {
                            return Err(std::io::Error::last_os_error());
                        }
                    }
                    Ok(())
                });
            }
        }
    }

    #[cfg(windows)]
    fn place(&self, command: &mut Command, _take_terminal: bool) {
        use windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP;

        if self.spec.detached {
            command.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn place(&self, _command: &mut Command, _take_terminal: bool) {}
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("spec", &self.spec)
            .field("options", &self.options)
            .field("handle", &self.handle)
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// One-shot timeout task, aborted when dropped.
struct Deadline(JoinHandle<()>);

impl Deadline {
    fn arm(handle: TerminationHandle, after: Duration) -> Self {
        Self(tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Finished in time but not reaped yet: not a timeout.
            if handle.pid().is_some_and(pid_watch::is_pid_alive) {
                handle.request(StopCause::Timeout { after }, StopSignal::Terminate);
            }
        }))
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.0.abort();
    }
}
