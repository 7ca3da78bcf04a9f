use assert_cmd::Command;
use predicates::prelude::*;

fn shepherd() -> Command {
    let mut cmd = Command::cargo_bin("shepherd").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("SHEPHERD_TIMEOUT_MS")
        .env_remove("SHEPHERD_GRACE_MS")
        .env_remove("SHEPHERD_STRATEGY");
    cmd
}

#[test]
fn version_prints_both_crates() {
    shepherd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("shepherd_cli"))
        .stdout(predicate::str::contains("shepherd_core"));
}

#[test]
fn run_without_command_fails() {
    shepherd()
        .arg("run")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no command given"));
}

#[test]
fn malformed_env_flag_is_rejected() {
    shepherd()
        .args(["run", "--env", "NOVALUE", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn missing_executable_exits_127() {
    shepherd()
        .args(["run", "--", "shepherd-test-no-such-binary"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .code(127)
        .stderr(predicate::str::contains("failed to start `shepherd-test-no-such-binary`"));
}

#[cfg(unix)]
mod unix {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn child_exit_code_propagates() {
        shepherd()
            .args(["run", "--", "sh", "-c", "exit 3"])
            .assert()
            .code(3);
    }

    #[test]
    fn child_stdout_is_inherited() {
        shepherd()
            .args(["run", "--", "sh", "-c", "echo hello from child"])
            .assert()
            .success()
            .stdout(predicate::str::contains("hello from child"));
    }

    #[test]
    fn timeout_exits_124() {
        let started = Instant::now();
        shepherd()
            .args(["run", "--timeout-ms", "300", "--", "sleep", "30"])
            .timeout(Duration::from_secs(10))
            .assert()
            .code(124)
            .stderr(predicate::str::contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// Present and not a zombie, per `/proc`.
    #[cfg(target_os = "linux")]
    fn is_running(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.trim_start().chars().next()
            })
            .is_some_and(|state| state != 'Z')
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn timeout_takes_down_grandchild_ignoring_term() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("grandchild.pid");
        let script = format!(
            "(trap '' TERM; exec sleep 30) & echo $! > '{}'; wait",
            pidfile.display()
        );

        shepherd()
            .args(["run", "--timeout-ms", "300", "--grace-ms", "500", "--"])
            .args(["sh", "-c", &script])
            .timeout(Duration::from_secs(10))
            .assert()
            .code(124);

        let grandchild: u32 = std::fs::read_to_string(&pidfile)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!is_running(grandchild), "grandchild {grandchild} outlived shepherd");
    }

    #[test]
    fn timeout_from_environment() {
        shepherd()
            .env("SHEPHERD_TIMEOUT_MS", "200")
            .env("SHEPHERD_STRATEGY", "tree")
            .args(["run", "--", "sleep", "30"])
            .timeout(Duration::from_secs(10))
            .assert()
            .code(124);
    }

    #[test]
    fn env_and_cwd_reach_the_child() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        shepherd()
            .arg("run")
            .arg("--cwd")
            .arg(dir.path())
            .args(["--env", "SHEPHERD_PROBE=ok", "--"])
            .args(["sh", "-c", r#"test -f marker && test "$SHEPHERD_PROBE" = ok"#])
            .assert()
            .success();
    }

    #[test]
    fn spec_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("spec.json");
        std::fs::write(
            &file,
            r#"{"command":"sh","arguments":["-c","exit $CODE"],"environment":{"CODE":"5"}}"#,
        )
        .unwrap();

        shepherd()
            .arg("run")
            .arg("--spec")
            .arg(&file)
            .assert()
            .code(5);
    }

    #[test]
    fn invalid_spec_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("spec.json");
        std::fs::write(&file, "{ not json").unwrap();

        shepherd()
            .arg("run")
            .arg("--spec")
            .arg(&file)
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Json"));
    }
}
