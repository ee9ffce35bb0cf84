//! Committee node orchestrator integrating all subsystems.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, warn};
use veriqos_api_server::{AppState, Server, ServerConfig};
use veriqos_committee::{CommitteeConfig, CommitteeNode, Outbound};
use veriqos_consensus::ConsensusMessage;
use veriqos_core::TracingEventSink;
use veriqos_crypto::{Ed25519Scheme, Keyring};
use veriqos_network::{Transport, TransportConfig};

use crate::config::NodeConfig;

const SUPPLEMENTARY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const GC_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// One running committee node: pipeline, transport, HTTP ingress, and
/// the periodic sweeps.
pub struct VeriqosNode {
    config: NodeConfig,
    node: Arc<CommitteeNode>,
    transport: Arc<Transport>,
    outbound_rx: Option<tokio::sync::mpsc::UnboundedReceiver<Outbound>>,
    inbound_rx: Option<tokio::sync::mpsc::UnboundedReceiver<ConsensusMessage>>,
}

impl VeriqosNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        info!("Initializing committee node '{}'", config.node_id);

        // 1. Cryptographic identity. Peer keys are registered out of
        //    band; a fresh keypair is generated per process.
        let keyring = Arc::new(Keyring::generate(Arc::new(Ed25519Scheme::new())));

        // 2. Task pipeline.
        let (node, outbound_rx) = CommitteeNode::new(
            CommitteeConfig {
                node_id: config.node_id.clone(),
                is_leader: config.is_leader,
                total_nodes: config.total_nodes,
            },
            keyring,
            Arc::new(TracingEventSink),
        );
        let node = Arc::new(node);
        info!(
            is_leader = config.is_leader,
            total_nodes = config.total_nodes,
            "task pipeline initialized"
        );

        // 3. Inter-node transport.
        let (transport, inbound_rx) = Transport::new(TransportConfig {
            node_id: config.node_id.clone(),
            listen_port: config.port,
            peers: config.peers.clone(),
        });

        Ok(Self {
            config,
            node,
            transport,
            outbound_rx: Some(outbound_rx),
            inbound_rx: Some(inbound_rx),
        })
    }

    /// Run the node until the process is shut down.
    pub async fn run(&mut self) -> Result<()> {
        let addr = self
            .transport
            .start()
            .await
            .context("Failed to start transport")?;
        info!(%addr, "transport started");

        // Inbound pump: transport frames into the pipeline.
        let node = self.node.clone();
        let mut inbound_rx = self.inbound_rx.take().expect("run called once");
        tokio::spawn(async move {
            while let Some(message) = inbound_rx.recv().await {
                node.handle_message(message);
            }
            warn!("inbound channel closed");
        });

        // Outbound pump: pipeline messages onto the wire.
        let transport = self.transport.clone();
        let mut outbound_rx = self.outbound_rx.take().expect("run called once");
        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::Broadcast(message) => transport.broadcast(&message),
                    Outbound::Direct { to, message } => transport.send_to(&to, &message),
                }
            }
            warn!("outbound channel closed");
        });

        // Supplementary-timeout sweep.
        let node = self.node.clone();
        tokio::spawn(async move {
            let mut ticker = interval(SUPPLEMENTARY_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                node.sweep_supplementary_timeouts();
            }
        });

        // Hourly GC of stale pending tasks.
        let node = self.node.clone();
        tokio::spawn(async move {
            let mut ticker = interval(GC_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                node.gc_sweep();
            }
        });

        // HTTP ingress on PORT + 1000.
        let server = Server::new(
            ServerConfig {
                host: "0.0.0.0".to_string(),
                port: self.config.http_port(),
            },
            AppState::new(self.node.clone(), self.transport.clone()),
        );
        if let Err(e) = server.run().await {
            error!(error = %e, "API server exited");
            return Err(e);
        }
        Ok(())
    }
}
