//! Node configuration loading and validation.

use anyhow::Result;
use clap::Parser;
use veriqos_network::PeerConfig;

/// VeriQoS Committee Node CLI. Every flag is also readable from the
/// environment, which is how container deployments configure nodes.
#[derive(Debug, Parser)]
#[command(name = "veriqos-node")]
#[command(about = "VeriQoS committee node - BFT consensus over transcoding QoS attestations")]
#[command(version)]
pub struct Cli {
    /// This node's identifier
    #[arg(long, env = "NODE_ID")]
    pub node_id: String,

    /// Whether this node is the configured leader
    #[arg(long, env = "IS_LEADER", default_value_t = false)]
    pub is_leader: bool,

    /// Transport listen port; the HTTP API listens on PORT + 1000
    #[arg(long, env = "PORT")]
    pub port: u16,

    /// Comma-separated peers as nodeId:host:port
    #[arg(long, env = "PEERS", default_value = "")]
    pub peers: String,

    /// Committee size including this node
    #[arg(long, env = "TOTAL_NODES")]
    pub total_nodes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: String,
    pub is_leader: bool,
    pub port: u16,
    pub peers: Vec<PeerConfig>,
    pub total_nodes: usize,
}

impl NodeConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let peers = parse_peers(&cli.peers)?;
        let config = Self {
            node_id: cli.node_id.clone(),
            is_leader: cli.is_leader,
            port: cli.port,
            peers,
            total_nodes: cli.total_nodes,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.is_empty() {
            anyhow::bail!("NODE_ID must not be empty");
        }
        if self.total_nodes == 0 {
            anyhow::bail!("TOTAL_NODES must be at least 1");
        }
        if self.peers.len() + 1 > self.total_nodes {
            anyhow::bail!(
                "PEERS lists {} peers but TOTAL_NODES is {}",
                self.peers.len(),
                self.total_nodes
            );
        }
        if self.peers.iter().any(|p| p.node_id == self.node_id) {
            anyhow::bail!("PEERS must not contain this node's own id");
        }
        Ok(())
    }

    /// HTTP ingress port, fixed at transport port + 1000.
    pub fn http_port(&self) -> u16 {
        self.port + 1000
    }
}

fn parse_peers(spec: &str) -> Result<Vec<PeerConfig>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Ok(s.parse::<PeerConfig>()?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(peers: &str, total: usize) -> Cli {
        Cli {
            node_id: "node-1".into(),
            is_leader: true,
            port: 9001,
            peers: peers.into(),
            total_nodes: total,
            verbose: false,
        }
    }

    #[test]
    fn parses_peer_list() {
        let config =
            NodeConfig::from_cli(&cli("node-2:127.0.0.1:9002, node-3:127.0.0.1:9003", 4)).unwrap();
        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[1].node_id, "node-3");
        assert_eq!(config.http_port(), 10001);
    }

    #[test]
    fn empty_peer_list_is_allowed() {
        let config = NodeConfig::from_cli(&cli("", 1)).unwrap();
        assert!(config.peers.is_empty());
    }

    #[test]
    fn rejects_oversized_peer_list() {
        assert!(NodeConfig::from_cli(&cli("node-2:h:1,node-3:h:2,node-4:h:3", 3)).is_err());
    }

    #[test]
    fn rejects_self_in_peer_list() {
        assert!(NodeConfig::from_cli(&cli("node-1:127.0.0.1:9001", 4)).is_err());
    }

    #[test]
    fn rejects_malformed_peer() {
        assert!(NodeConfig::from_cli(&cli("node-2@127.0.0.1@9002", 4)).is_err());
    }
}
