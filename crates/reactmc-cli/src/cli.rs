use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "reactmc developers",
    version,
    about = "reactmc - Metropolis Monte Carlo for molecular systems with reaction-ensemble moves and replica exchange.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single Monte Carlo simulation.
    Run(RunArgs),
    /// Run several replicas with parallel tempering, one thread per replica.
    Temper(TemperArgs),
}

/// Overrides shared by every command that reads a simulation config.
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Override the number of sweeps from the config file.
    #[arg(long, value_name = "INT")]
    pub sweeps: Option<u64>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S temperature=310
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the simulation configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path for the TOML report of the finished run.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Override the random seed from the config file.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Arguments for the `temper` subcommand.
#[derive(Args, Debug)]
pub struct TemperArgs {
    /// One configuration file per replica, in replica order.
    #[arg(short, long = "config", required = true, value_name = "PATH", num_args(1..))]
    pub configs: Vec<PathBuf>,

    /// Prefix for the per-replica reports; replica `i` is written to `<PREFIX>-<i>.toml`.
    #[arg(short, long, value_name = "PREFIX")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}
