// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use clap::Parser;
use cli::{Cli, Commands};

mod cli;
mod logging;
mod resolve;
mod supervise;

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            log::error!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let args = Cli::parse();

    logging::init(args.verbose)?;

    match args.command {
        Commands::Run(run) => supervise::run(run),
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            println!("shepherd_core {}", shepherd_core::version());
            Ok(0)
        }
    }
}
