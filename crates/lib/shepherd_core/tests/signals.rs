//! Host signal relay. Runs alone in its own binary: it signals the test process.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use shepherd_core::{HostSignal, StopCause, SupervisionSpec, Supervisor, SupervisorOptions};

fn raise(signal: libc::c_int) {
    // SAFETY: signalling our own pid; tokio owns the handler for this signal.
    let rc = unsafe { libc::kill(std::process::id() as libc::pid_t, signal) };
    assert_eq!(rc, 0);
}

#[tokio::test]
async fn host_hangup_is_relayed_then_deregistered() {
    let options = SupervisorOptions::default()
        .handle_faults(false)
        .force_exit_after(None);
    let spec = SupervisionSpec::new("sleep").arg("30");
    let supervisor = Arc::new(Supervisor::with_options(spec, options));
    let runner = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start().await }
    });

    // Handlers are registered before the pid is published.
    let mut pid = None;
    for _ in 0..500 {
        pid = supervisor.pid();
        if pid.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(pid.is_some(), "child never started");

    raise(libc::SIGHUP);
    let outcome = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("child stopped")
        .unwrap()
        .unwrap();

    assert_eq!(outcome.cause, Some(StopCause::Signal(HostSignal::HangUp)));
    assert_eq!(outcome.signal, Some(libc::SIGHUP));
    assert_eq!(outcome.exit_code(), 128 + libc::SIGHUP);

    let handle = supervisor.handle();
    let requests = handle.requests();
    raise(libc::SIGHUP);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(handle.requests(), requests);
    assert_eq!(handle.kill_attempts(), 1);
}
