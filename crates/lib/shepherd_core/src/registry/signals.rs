//! Host interruption listeners.
//!
//! Unix: SIGINT, SIGTERM and SIGHUP. Windows: Ctrl-C, Ctrl-Break and console
//! close. Each listener is a tokio task holding a clone of the instance's
//! dispatcher; deregistration aborts the task.
//!
//! tokio keeps its OS-level handler installed after the stream is dropped,
//! so once a supervisor has run these signals no longer terminate the host
//! by default.

use std::time::Duration;

use tokio::task::JoinHandle;

use super::Dispatcher;
#[cfg(any(unix, windows))]
use crate::outcome::HostSignal;

#[cfg(unix)]
pub(super) fn listen(
    dispatcher: &Dispatcher,
    force_exit_after: Option<Duration>,
) -> Vec<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let triggers = [
        (SignalKind::interrupt(), HostSignal::Interrupt),
        (SignalKind::terminate(), HostSignal::Terminate),
        (SignalKind::hangup(), HostSignal::HangUp),
    ];

    triggers
        .into_iter()
        .filter_map(|(kind, host)| match signal(kind) {
            Ok(mut stream) => {
                let dispatcher = dispatcher.clone();
                Some(tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        dispatcher.relay(host, force_exit_after);
                    }
                }))
            }
            Err(e) => {
                log::warn!("cannot listen for {host}: {e}");
                None
            }
        })
        .collect()
}

#[cfg(windows)]
pub(super) fn listen(
    dispatcher: &Dispatcher,
    force_exit_after: Option<Duration>,
) -> Vec<JoinHandle<()>> {
    use tokio::signal::windows;

    let mut listeners = Vec::new();

    // Each console event has its own stream type.
    macro_rules! listen_to {
        ($open:path, $host:expr) => {
            match $open() {
                Ok(mut stream) => {
                    let dispatcher = dispatcher.clone();
                    listeners.push(tokio::spawn(async move {
                        while stream.recv().await.is_some() {
                            dispatcher.relay($host, force_exit_after);
                        }
                    }));
                }
                Err(e) => log::warn!("cannot listen for {}: {e}", $host),
            }
        };
    }

    listen_to!(windows::ctrl_c, HostSignal::Interrupt);
    listen_to!(windows::ctrl_break, HostSignal::Break);
    listen_to!(windows::ctrl_close, HostSignal::ConsoleClose);

    listeners
}

#[cfg(not(any(unix, windows)))]
pub(super) fn listen(
    _dispatcher: &Dispatcher,
    _force_exit_after: Option<Duration>,
) -> Vec<JoinHandle<()>> {
    log::debug!("host signal relay is unavailable on this platform");
    Vec::new()
}
