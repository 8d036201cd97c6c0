//! # pairlink
//!
//! Lobby broker binary: loads configuration, installs logging and metrics,
//! and runs the server until ctrl-c.

#![deny(unsafe_code)]

mod config;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use pairlink_server::metrics::install_recorder;
use pairlink_server::server::LobbyServer;

use config::{AppConfig, Cli, generate_config_template};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    let config = AppConfig::load(&cli).context("failed to load configuration")?;
    logging::init(&config.logging)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pairlink starting");

    let metrics = install_recorder().context("failed to install metrics recorder")?;
    let server = LobbyServer::new(config.server).with_metrics(metrics);
    let handle = server.listen().await.context("failed to bind server")?;
    tracing::info!("pairlink listening on ws://{}/ws", handle.addr());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    server
        .shutdown()
        .graceful_shutdown(handle.into_tasks(), None)
        .await;
    tracing::info!("shutdown complete");
    Ok(())
}
