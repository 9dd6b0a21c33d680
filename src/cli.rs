use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cubecheck",
    version,
    about = "Run metric queries against a Cube API and check the results"
)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    /// Cube API base URL, e.g. https://host/cubejs-api/v1
    #[arg(long, global = true, env = "CUBE_API_URL", value_name = "URL")]
    pub url: Option<String>,

    #[arg(long, global = true, env = "CUBE_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// API secret used to sign a token when none is given
    #[arg(long, global = true, env = "CUBE_API_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Request timeout in seconds (default: suite setting, then 30)
    #[arg(
        long,
        global = true,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: Option<u64>,

    /// Print descriptions and query JSON; enable debug logging
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a suite of metric checks
    Run(RunArgs),
    /// List the cases in a suite
    List(ListArgs),
    /// Run one ad-hoc query and print the rows
    Query(QueryArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Suite file (TOML); the built-in high-risk suite when omitted
    #[arg(value_name = "SUITE")]
    pub suite: Option<PathBuf>,

    /// Only run these case ids
    #[arg(long = "case", value_name = "ID")]
    pub cases: Vec<String>,

    /// Write a JSON report here
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    #[arg(value_name = "SUITE")]
    pub suite: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// Query object as JSON
    #[arg(value_name = "JSON")]
    pub query: String,

    /// Sort rows by this numeric field, largest first
    #[arg(long, value_name = "FIELD")]
    pub sort_by: Option<String>,

    /// Append a TOTAL row
    #[arg(long, default_value_t = false)]
    pub totals: bool,
}
