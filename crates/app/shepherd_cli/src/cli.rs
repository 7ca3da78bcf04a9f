use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use shepherd_core::TerminatorKind;

#[derive(Parser, Debug)]
#[command(name = "shepherd", version, about = "Run a command and take its whole process tree down with it")]
pub struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Supervise a command until it exits
    Run(RunArgs),
    /// Print version information
    Version,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Stop the command after this many milliseconds (exit status 124)
    #[arg(long, env = "SHEPHERD_TIMEOUT_MS", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Wait between the graceful and forced kill phases
    #[arg(long, env = "SHEPHERD_GRACE_MS", value_name = "MS", default_value_t = 3000)]
    pub grace_ms: u64,

    /// How to find the command's descendants: auto, group or tree
    #[arg(long, env = "SHEPHERD_STRATEGY", default_value_t = TerminatorKind::Auto)]
    pub strategy: TerminatorKind,

    /// Working directory for the command
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable for the command (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Name used in log messages (defaults to the command's file name)
    #[arg(long)]
    pub label: Option<String>,

    /// Load the supervision spec from a JSON file; other flags override it
    #[arg(long, value_name = "FILE")]
    pub spec: Option<PathBuf>,

    /// Start the command in a new session
    #[arg(long)]
    pub detach: bool,

    /// Kill the command if shepherd itself dies (Linux)
    #[arg(long)]
    pub die_with_parent: bool,

    /// Use the command name as given instead of searching PATH
    #[arg(long)]
    pub no_resolve: bool,

    /// Command to run, followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{s}`")),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_env_pairs() {
        assert_eq!(parse_env("A=b=c"), Ok(("A".into(), "b=c".into())));
        assert_eq!(parse_env("EMPTY="), Ok(("EMPTY".into(), String::new())));
        assert!(parse_env("=x").is_err());
        assert!(parse_env("novalue").is_err());
    }

    #[test]
    fn trailing_arguments_belong_to_the_command() {
        let cli = Cli::parse_from([
            "shepherd", "run", "--timeout-ms", "250", "--strategy", "tree", "--", "npx", "-y",
            "server", "--port", "1",
        ]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.timeout_ms, Some(250));
        assert_eq!(args.strategy, TerminatorKind::ProcessTree);
        assert_eq!(args.command, ["npx", "-y", "server", "--port", "1"]);
    }
}
