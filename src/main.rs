#![forbid(unsafe_code)]

use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use cubecheck::cli::{Cli, Command};
use cubecheck::commands::{self, EXIT_FAILURE, EXIT_SUCCESS};
use tracing_subscriber::EnvFilter;

const EXIT_USAGE_ERROR: u8 = 64;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::from(EXIT_SUCCESS),
                _ => ExitCode::from(EXIT_USAGE_ERROR),
            };
        }
    };

    let default_filter = if cli.connection.verbose {
        "cubecheck=debug,warn"
    } else {
        "cubecheck=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Command::Run(args) => commands::run(args, &cli.connection).await,
        Command::List(args) => commands::list(args),
        Command::Query(args) => commands::query(args, &cli.connection).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(error) => {
            eprintln!("cubecheck: {error:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
