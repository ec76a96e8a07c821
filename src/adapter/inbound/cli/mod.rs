//! Command-line adapter.

pub mod check;
pub mod command;
pub mod config;
pub mod output;
pub mod run;
pub mod scan;

use command::{CheckCommand, Cli, Commands};
use output::OutputConfig;

use crate::error::Result;

/// Configure output from the global flags and run the chosen command.
pub async fn dispatch(cli: Cli) -> Result<()> {
    output::configure(OutputConfig::new(
        cli.json,
        cli.quiet,
        cli.verbose,
        &cli.color,
    ));

    match cli.command {
        Commands::Run(args) => run::execute(&args).await,
        Commands::Check(CheckCommand::Config(arg)) => check::execute_config(arg.config.as_deref()),
        Commands::Scan(args) => scan::execute(&args).await,
    }
}
