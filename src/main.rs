use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use slotkeeper::adapter::inbound::cli::{self, command::Cli, output};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    // wss:// and https:// share one TLS backend.
    let _ = rustls::crypto::ring::default_provider().install_default();
    let cli = Cli::parse();

    match cli::dispatch(cli).await.context("slotkeeper failed") {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output::error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
