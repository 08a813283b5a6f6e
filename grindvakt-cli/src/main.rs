//! ## grindvakt-cli
//! **Operator interface to the connection enforcement engine**
//!
//! `grindvakt run` starts the scan loop; the `rules` and `criteria`
//! subcommands inspect and change what it enforces.

use anyhow::Result;
use clap::Parser;
use grindvakt_telemetry::EventLogger;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_ref())?;

    EventLogger::init(&config.telemetry.log_level, config.telemetry.json)
        .map_err(|e| anyhow::anyhow!("initializing logging: {e}"))?;

    commands::run_command(cli.command, &config).await
}
