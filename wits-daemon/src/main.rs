//! WITS generator daemon
//!
//! Listens on a TCP port and streams synthetic WITS0 record blocks to the
//! first client that connects, until Ctrl-C / SIGTERM or the client leaves.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::info;
use wits_broadcaster::{RunOutcome, TcpSession, WitsGenerator, WitsServer};

use wits_daemon::cli::Cli;
use wits_daemon::config::DaemonConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    info!("Starting WITS generator v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load_from(path),
        None => DaemonConfig::load(),
    }
    .context("Failed to load configuration")?;

    info!("Configuration loaded from {}", config.config_path.display());
    config.apply_cli(&cli);

    let broadcast = config.broadcast_config()?;
    let generator = WitsGenerator::new(config.channel_table()?);

    info!("  - Port: {}", broadcast.port());
    info!("  - Frequency: {:?}", broadcast.frequency());
    info!("  - Records: {}, items: {}", broadcast.records(), broadcast.items());

    let session = Arc::new(TcpSession::new(broadcast.port()));
    let server = Arc::new(WitsServer::new(session, generator, broadcast));

    let runner = Arc::clone(&server);
    let mut run = tokio::spawn(async move { runner.start().await });

    tokio::select! {
        result = &mut run => {
            report(result)?;
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal");
            server.stop().await;
            report(run.await)?;
        }
    }

    info!("WITS generator stopped");

    Ok(())
}

fn report(
    result: std::result::Result<wits_broadcaster::Result<RunOutcome>, JoinError>,
) -> Result<()> {
    let outcome = result
        .context("Broadcast task failed")?
        .context("Broadcast error")?;

    match outcome {
        RunOutcome::Stopped => info!("Broadcast stopped"),
        RunOutcome::ConnectionLost => info!("Client disconnected, shutting down"),
    }
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
