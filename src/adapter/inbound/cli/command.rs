//! Command-line interface definitions.
//!
//! Defines the CLI structure for slotkeeper using `clap`: run the
//! scheduler, validate a configuration file, or print a one-off
//! leaderboard from the poll provider.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Bounded live-subscription scheduler for market-data feeds
#[derive(Parser, Debug)]
#[command(name = "slotkeeper")]
#[command(version)]
pub struct Cli {
    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until Ctrl-C
    Run(RunArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),

    /// Poll the universe and print the current leaderboard
    Scan(ScanArgs),
}

/// Subcommands for `slotkeeper check`.
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate the configuration file syntax and semantics.
    Config(ConfigPathArg),
}

/// Config file location shared by every command.
///
/// Without `--config`, `config.toml` in the working directory is used when
/// present and built-in defaults otherwise.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigPathArg {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for `slotkeeper run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,

    /// Use the simulated market for both providers
    #[arg(long)]
    pub simulate: bool,

    /// Log level (overrides config)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Live slot cap (overrides config)
    #[arg(long, value_name = "N")]
    pub max_live_slots: Option<usize>,
}

/// Arguments for `slotkeeper scan`.
#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub config: ConfigPathArg,

    /// Use the simulated market
    #[arg(long)]
    pub simulate: bool,

    /// Rows to print
    #[arg(long, default_value_t = 20)]
    pub top: usize,

    /// Scanner passes; the first pass only sets the baseline
    #[arg(long, default_value_t = 2)]
    pub passes: u32,

    /// Pause between passes in milliseconds (defaults to the poll interval)
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,
}
