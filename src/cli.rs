use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Runs SQL queries on a schedule and logs what changed")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the query schedule until stopped or the timeout tick passes
    Run(RunArgs),

    /// Show the stored results queries are diffed against
    Results(ResultsArgs),

    /// Drop the stored results for a query so its next run starts fresh
    Forget(ForgetArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Path to the TOML config file
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Stop after this tick (overrides schedule_timeout, 0 runs forever)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Time between ticks, e.g. "1s" or "250ms" (overrides the config)
    #[arg(long)]
    pub tick: Option<String>,

    /// Record memory and wall time for every query
    #[arg(long, default_value_t = false)]
    pub monitor: bool,

    /// Emit diagnostics as JSON lines
    #[arg(long, default_value_t = false)]
    pub json_logs: bool,

    /// Log at debug level
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,
}

#[derive(Parser)]
pub struct ResultsArgs {
    /// Path to the TOML config file
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Show the stored rows of one query
    #[arg(long)]
    pub name: Option<String>,

    /// List every query with stored results (default when no name is given)
    #[arg(long, default_value_t = false)]
    pub list: bool,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ForgetArgs {
    /// Path to the TOML config file
    #[arg(long, short = 'c')]
    pub config: PathBuf,

    /// Query whose stored results should be dropped
    pub name: String,
}
