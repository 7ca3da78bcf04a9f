//! Per-instance cleanup handler registration.
//!
//! [`register`] wires one supervisor's [`TerminationHandle`] to the process
//! level triggers that must stop its child: host interruption signals,
//! panics, and the registration itself being dropped while still armed.
//! Every trigger goes through a [`Dispatcher`] owned by that registration,
//! so disarming it makes all of them no-ops at once.

mod fault;
mod signals;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::handle::TerminationHandle;
use crate::outcome::{HostSignal, StopCause};
use crate::pid_watch;
use crate::signal::StopSignal;
use crate::supervisor::SupervisorOptions;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Routes a trigger to one supervisor's handle while armed.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    id: u64,
    armed: Arc<AtomicBool>,
    handle: TerminationHandle,
}

impl Dispatcher {
    fn new(handle: TerminationHandle) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            armed: Arc::new(AtomicBool::new(true)),
            handle,
        }
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Returns `true` if this trigger won the latch.
    pub(crate) fn fire(&self, cause: StopCause, signal: StopSignal) -> bool {
        self.is_armed() && self.handle.request(cause, signal)
    }

    pub(crate) fn fire_blocking(&self, cause: StopCause, signal: StopSignal) -> bool {
        self.is_armed() && self.handle.request_blocking(cause, signal)
    }

    /// Relay a host signal to the child's tree and arm the exit watchdog.
    fn relay(&self, host: HostSignal, force_exit_after: Option<Duration>) {
        if !self.fire(StopCause::Signal(host), host.relayed()) {
            return;
        }
        if let Some(after) = force_exit_after {
            spawn_watchdog(self.handle.clone(), host, after);
        }
    }
}

/// Exit the whole process if the child outlives `after` following `host`.
fn spawn_watchdog(handle: TerminationHandle, host: HostSignal, after: Duration) {
    let spawned = std::thread::Builder::new()
        .name("shepherd-watchdog".into())
        .spawn(move || {
            if pid_watch::wait_until(after, || handle.is_terminated()) {
                return;
            }
            log::error!(
                "{}: child still running {after:?} after {host}; exiting",
                handle.label()
            );
            std::process::exit(host.exit_code());
        });
    if let Err(e) = spawned {
        log::warn!("cannot spawn exit watchdog: {e}");
    }
}

/// Live registration of one supervisor's triggers.
///
/// Dropping it while armed counts as shutdown. Outside a runtime the child's
/// tree is stopped on the dropping thread before the handlers go away; inside
/// one the kill sequence moves to its own thread so no worker is stalled.
pub(crate) struct Registration {
    dispatcher: Dispatcher,
    listeners: Vec<JoinHandle<()>>,
    faults: bool,
}

/// Register the triggers enabled in `options` for `handle`.
///
/// Signal listeners are tokio tasks, so this must run inside a runtime when
/// `relay_signals` is set.
pub(crate) fn register(handle: &TerminationHandle, options: &SupervisorOptions) -> Registration {
    let dispatcher = Dispatcher::new(handle.clone());

    let listeners = if options.relay_signals {
        signals::listen(&dispatcher, options.force_exit_after)
    } else {
        Vec::new()
    };
    if options.handle_faults {
        fault::add(dispatcher.clone());
    }

    log::debug!(
        "{}: registered cleanup handlers #{} ({} signal listener(s), faults: {})",
        handle.label(),
        dispatcher.id,
        listeners.len(),
        options.handle_faults
    );

    Registration {
        dispatcher,
        listeners,
        faults: options.handle_faults,
    }
}

impl Registration {
    /// Remove every handler of this instance. Later triggers are no-ops.
    pub(crate) fn deregister(mut self) {
        self.disarm();
    }

    fn disarm(&mut self) {
        if !self.dispatcher.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
        if self.faults {
            fault::remove(self.dispatcher.id);
        }
        log::debug!(
            "{}: deregistered cleanup handlers #{}",
            self.dispatcher.handle.label(),
            self.dispatcher.id
        );
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.dispatcher.is_armed() {
            if tokio::runtime::Handle::try_current().is_ok() {
                self.dispatcher.fire(StopCause::Shutdown, StopSignal::Terminate);
            } else {
                self.dispatcher
                    .fire_blocking(StopCause::Shutdown, StopSignal::Terminate);
            }
            self.disarm();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::handle::tests::{RecordingTerminator, SlowTerminator};

    fn quiet_options() -> SupervisorOptions {
        SupervisorOptions {
            relay_signals: false,
            handle_faults: false,
            ..SupervisorOptions::default()
        }
    }

    fn running_handle(pid: u32) -> (TerminationHandle, Arc<RecordingTerminator>) {
        let terminator = Arc::new(RecordingTerminator::default());
        let handle = TerminationHandle::new("registry".into(), terminator.clone());
        handle.attach(pid);
        (handle, terminator)
    }

    #[test]
    fn triggers_after_deregister_are_ignored() {
        let (handle, terminator) = running_handle(11);
        let registration = register(&handle, &quiet_options());
        let dispatcher = registration.dispatcher.clone();

        registration.deregister();

        assert!(!dispatcher.fire_blocking(StopCause::Fault, StopSignal::Terminate));
        assert!(!dispatcher.fire(StopCause::Requested, StopSignal::Terminate));
        assert_eq!(handle.requests(), 0);
        assert!(terminator.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn dropping_armed_registration_stops_child() {
        let (handle, terminator) = running_handle(12);

        drop(register(&handle, &quiet_options()));

        assert_eq!(handle.cause(), Some(StopCause::Shutdown));
        assert_eq!(
            *terminator.calls.lock().unwrap(),
            vec![(12, StopSignal::Terminate)]
        );
    }

    #[tokio::test]
    async fn dropping_inside_a_runtime_does_not_block_the_worker() {
        let terminator = Arc::new(SlowTerminator::new(Duration::from_secs(2)));
        let handle = TerminationHandle::new("registry".into(), terminator.clone());
        handle.attach(13);
        let registration = register(&handle, &quiet_options());

        let started = std::time::Instant::now();
        drop(registration);

        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(handle.cause(), Some(StopCause::Shutdown));
        assert!(!terminator.finished());
        assert!(handle.close());
        assert!(handle.settled(Duration::from_secs(5)).await);
        assert!(terminator.finished());
    }

    #[test]
    fn dispatchers_only_reach_their_own_handle() {
        let (first, first_kills) = running_handle(21);
        let (second, second_kills) = running_handle(22);
        let a = register(&first, &quiet_options());
        let b = register(&second, &quiet_options());

        assert!(a.dispatcher.fire_blocking(StopCause::Fault, StopSignal::Kill));

        assert_eq!(*first_kills.calls.lock().unwrap(), vec![(21, StopSignal::Kill)]);
        assert!(second_kills.calls.lock().unwrap().is_empty());
        assert_ne!(a.dispatcher.id, b.dispatcher.id);

        a.deregister();
        b.deregister();
    }

    #[test]
    fn fault_table_tracks_entries_per_instance() {
        let (first, _) = running_handle(31);
        let (second, _) = running_handle(32);
        let options = SupervisorOptions {
            relay_signals: false,
            ..SupervisorOptions::default()
        };

        let a = register(&first, &options);
        let b = register(&second, &options);
        let (a_id, b_id) = (a.dispatcher.id, b.dispatcher.id);
        assert!(fault::registered().contains(&a_id));
        assert!(fault::registered().contains(&b_id));

        a.deregister();
        let ids = fault::registered();
        assert!(!ids.contains(&a_id));
        assert!(ids.contains(&b_id));

        b.deregister();
        assert!(!fault::registered().contains(&b_id));
    }
}
