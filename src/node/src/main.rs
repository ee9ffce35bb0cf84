//! VeriQoS Committee Node - Main Binary
//!
//! Byzantine fault tolerant verification of media-transcoding QoS
//! attestations:
//! - framed JSON transport between committee members
//! - PBFT consensus with a conflict-resolution second round
//! - HTTP ingress for verifier attestations on PORT + 1000
//! - Prometheus metrics

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::{error, info};

mod config;
mod node;

use config::{Cli, NodeConfig};
use node::VeriqosNode;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},veriqos_node=debug", log_level).into()),
        )
        .with_target(true)
        .init();

    info!("Starting VeriQoS Committee Node v{}", env!("CARGO_PKG_VERSION"));

    let config = NodeConfig::from_cli(&cli)?;
    info!(
        node_id = %config.node_id,
        is_leader = config.is_leader,
        port = config.port,
        http_port = config.http_port(),
        peers = config.peers.len(),
        "configuration loaded"
    );

    let mut node = VeriqosNode::new(config)?;

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                error!("Node error: {}", e);
                return Err(e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal (Ctrl+C)");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal (SIGTERM)");
        }
    }

    info!("Node stopped");
    Ok(())
}

/// Cross-platform shutdown signal handling.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");

    sigterm.recv().await;
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    std::future::pending::<()>().await
}
