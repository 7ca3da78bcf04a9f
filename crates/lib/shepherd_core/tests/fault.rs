//! Panic trigger. Runs alone in its own binary: it installs a process-wide hook.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use shepherd_core::pid_watch;
use shepherd_core::{StopCause, SupervisionSpec, Supervisor, SupervisorOptions};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panic_stops_supervised_child() {
    let options = SupervisorOptions::default()
        .relay_signals(false)
        .grace_period(Duration::from_secs(1));
    let spec = SupervisionSpec::new("sleep").arg("30");
    let supervisor = Arc::new(Supervisor::with_options(spec, options));
    let runner = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start().await }
    });

    let mut pid = None;
    for _ in 0..500 {
        pid = supervisor.pid();
        if pid.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let pid = pid.expect("child never started");

    let caught: std::thread::Result<()> =
        std::panic::catch_unwind(|| panic!("simulated supervisor fault"));
    assert!(caught.is_err());

    let outcome = tokio::time::timeout(Duration::from_secs(5), runner)
        .await
        .expect("child stopped")
        .unwrap()
        .unwrap();

    assert_eq!(outcome.cause, Some(StopCause::Fault));
    assert!(!outcome.success());
    assert!(!pid_watch::is_pid_alive(pid));
}
