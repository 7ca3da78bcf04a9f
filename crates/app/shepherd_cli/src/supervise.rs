//! `shepherd run`: assemble the spec, supervise, report the exit status.

use std::time::Duration;

use shepherd_core::{SupervisionSpec, Supervisor, SupervisorOptions};

use crate::cli::RunArgs;
use crate::{Error, Result, resolve};

/// Supervise the command and return the status shepherd should exit with.
pub fn run(args: RunArgs) -> Result<i32> {
    let spec = build_spec(&args)?;
    let options = SupervisorOptions::default()
        .terminator(args.strategy)
        .grace_period(Duration::from_millis(args.grace_ms));
    log::debug!("supervising {spec:?} with {options:?}");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let supervisor = Supervisor::with_options(spec, options);
    let outcome = runtime.block_on(supervisor.start())?;

    Ok(outcome.exit_code())
}

/// Spec file first (if any), then command-line flags on top.
fn build_spec(args: &RunArgs) -> Result<SupervisionSpec> {
    let mut spec = match &args.spec {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                Error::Custom(format!("cannot read spec file {}: {e}", path.display()))
            })?;
            serde_json::from_str::<SupervisionSpec>(&text)?
        }
        None => SupervisionSpec::new(""),
    };

    if let Some((command, arguments)) = args.command.split_first() {
        spec.command = command.clone();
        spec.arguments = arguments.to_vec();
    }
    if spec.command.trim().is_empty() {
        return Err(Error::Custom(
            "no command given (pass one after `--` or use --spec)".into(),
        ));
    }
    if !args.no_resolve {
        spec.command = resolve::resolve(&spec.command);
    }

    if let Some(timeout) = args.timeout_ms {
        spec.timeout_millis = Some(timeout);
    }
    if let Some(cwd) = &args.cwd {
        spec.working_directory = Some(cwd.clone());
    }
    if let Some(label) = &args.label {
        spec.label = Some(label.clone());
    }
    spec.environment.extend(args.env.iter().cloned());
    spec.detached |= args.detach;
    spec.die_with_parent |= args.die_with_parent;

    Ok(spec)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Commands};

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::parse_from(["shepherd", "run"].iter().chain(argv));
        match cli.command {
            Commands::Run(args) => args,
            Commands::Version => panic!("expected run"),
        }
    }

    #[test]
    fn flags_build_the_spec() {
        let args = run_args(&[
            "--timeout-ms",
            "1500",
            "--cwd",
            "/tmp",
            "--env",
            "A=1",
            "--label",
            "fs",
            "--no-resolve",
            "--",
            "npx",
            "-y",
            "server",
        ]);

        let spec = build_spec(&args).unwrap();

        assert_eq!(spec.command, "npx");
        assert_eq!(spec.arguments, ["-y", "server"]);
        assert_eq!(spec.timeout_millis, Some(1500));
        assert_eq!(spec.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(spec.environment.get("A").map(String::as_str), Some("1"));
        assert_eq!(spec.label(), "fs");
    }

    #[test]
    fn flags_override_spec_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("spec.json");
        std::fs::write(
            &file,
            r#"{"command":"node","arguments":["a.js"],"environment":{"A":"file","B":"file"},"timeoutMillis":9000}"#,
        )
        .unwrap();
        let file = file.to_string_lossy().into_owned();
        let args = run_args(&["--spec", &file, "--env", "A=flag", "--timeout-ms", "100", "--no-resolve"]);

        let spec = build_spec(&args).unwrap();

        assert_eq!(spec.command, "node");
        assert_eq!(spec.arguments, ["a.js"]);
        assert_eq!(spec.environment["A"], "flag");
        assert_eq!(spec.environment["B"], "file");
        assert_eq!(spec.timeout_millis, Some(100));
    }

    #[test]
    fn missing_command_is_an_error() {
        let err = build_spec(&run_args(&[])).unwrap_err();
        assert!(err.to_string().contains("no command given"));
    }

    #[test]
    fn unreadable_spec_file_names_the_path() {
        let err = build_spec(&run_args(&["--spec", "/no/such/spec.json"])).unwrap_err();
        assert!(err.to_string().contains("/no/such/spec.json"));
    }
}
