//! TCP transport with length-delimited JSON frames.
//!
//! Each peer pair keeps one persistent bidirectional stream. Both sides
//! may dial; whichever connection most recently completed the `IDENT`
//! exchange becomes the pair's writer and the stale one is evicted. Lost
//! connections are redialed with exponential backoff; consensus may
//! stall while a peer is away, which the protocol accepts.

use crate::error::{NetworkError, Result};
use crate::frame::{ControlFrame, WireFrame};
use bytes::Bytes;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};
use veriqos_consensus::ConsensusMessage;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// One configured peer, parsed from `nodeId:host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub node_id: String,
    pub host: String,
    pub port: u16,
}

impl PeerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for PeerConfig {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let [node_id, host, port] = parts.as_slice() else {
            return Err(NetworkError::InvalidPeerSpec(s.to_string()));
        };
        if node_id.is_empty() || host.is_empty() {
            return Err(NetworkError::InvalidPeerSpec(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| NetworkError::InvalidPeerSpec(s.to_string()))?;
        Ok(PeerConfig {
            node_id: node_id.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub node_id: String,
    pub listen_port: u16,
    pub peers: Vec<PeerConfig>,
}

/// Connection summary for the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total: usize,
    pub connected: usize,
    pub peers: Vec<PeerStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerStatus {
    pub node_id: String,
    pub connected: bool,
}

struct PeerHandle {
    tx: mpsc::UnboundedSender<Bytes>,
}

/// Framed TCP transport for one committee node.
pub struct Transport {
    config: TransportConfig,
    peers: DashMap<String, PeerHandle>,
    inbound_tx: mpsc::UnboundedSender<ConsensusMessage>,
}

impl Transport {
    /// Build the transport and the receiving end of its inbound channel.
    pub fn new(config: TransportConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<ConsensusMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                config,
                peers: DashMap::new(),
                inbound_tx,
            }),
            inbound_rx,
        )
    }

    /// Bind the listener, start the accept loop and one dialer per
    /// configured peer. Returns the bound address.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.listen_port))
            .await
            .map_err(|source| NetworkError::Bind {
                port: self.config.listen_port,
                source,
            })?;
        let local_addr = listener.local_addr()?;
        info!(node = %self.config.node_id, %local_addr, "transport listening");

        let transport = self.clone();
        tokio::spawn(async move {
            transport.accept_loop(listener).await;
        });

        for peer in self.config.peers.clone() {
            let transport = self.clone();
            tokio::spawn(async move {
                transport.maintain_peer(peer).await;
            });
        }

        Ok(local_addr)
    }

    /// Send a message to every currently connected peer.
    pub fn broadcast(&self, message: &ConsensusMessage) {
        let Ok(bytes) = encode_frame(&WireFrame::from(message.clone())) else {
            return;
        };
        for entry in self.peers.iter() {
            if entry.value().tx.send(bytes.clone()).is_err() {
                debug!(peer = %entry.key(), "broadcast to stale peer skipped");
            }
        }
    }

    /// Send a message to one peer, if connected.
    pub fn send_to(&self, peer_id: &str, message: &ConsensusMessage) {
        let Ok(bytes) = encode_frame(&WireFrame::from(message.clone())) else {
            return;
        };
        match self.peers.get(peer_id) {
            Some(handle) => {
                if handle.tx.send(bytes).is_err() {
                    debug!(peer = %peer_id, "send to stale peer skipped");
                }
            }
            None => debug!(peer = %peer_id, "send skipped: peer not connected"),
        }
    }

    /// Connection stats over the configured peer set.
    pub fn connection_stats(&self) -> ConnectionStats {
        let peers: Vec<PeerStatus> = self
            .config
            .peers
            .iter()
            .map(|p| PeerStatus {
                node_id: p.node_id.clone(),
                connected: self.peers.contains_key(&p.node_id),
            })
            .collect();
        ConnectionStats {
            total: peers.len(),
            connected: peers.iter().filter(|p| p.connected).count(),
            peers,
        }
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, remote)) => {
                    debug!(%remote, "inbound connection");
                    let transport = self.clone();
                    tokio::spawn(async move {
                        transport.run_accepted(stream).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Accepted side: the peer must identify itself before anything else.
    async fn run_accepted(self: Arc<Self>, stream: TcpStream) {
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

        let peer_id = match framed.next().await {
            Some(Ok(bytes)) => match serde_json::from_slice::<WireFrame>(&bytes) {
                Ok(WireFrame::Control(ControlFrame::Ident { node_id })) => node_id,
                Ok(_) => {
                    warn!("peer sent a non-IDENT first frame, dropping half-open connection");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "undecodable first frame, dropping connection");
                    return;
                }
            },
            _ => return,
        };

        // Answer with our own identity so the dialer can bind the pair.
        if let Ok(bytes) = encode_frame(&WireFrame::ident(&self.config.node_id)) {
            let _ = framed.send(bytes).await;
        }

        self.run_connection(framed, peer_id).await;
    }

    /// Dial a configured peer forever, with exponential backoff.
    async fn maintain_peer(self: Arc<Self>, peer: PeerConfig) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match TcpStream::connect(peer.addr()).await {
                Ok(stream) => {
                    debug!(peer = %peer.node_id, addr = %peer.addr(), "connected");
                    backoff = INITIAL_BACKOFF;

                    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
                    match encode_frame(&WireFrame::ident(&self.config.node_id)) {
                        Ok(bytes) => {
                            if framed.send(bytes).await.is_err() {
                                continue;
                            }
                        }
                        Err(_) => continue,
                    }

                    self.clone()
                        .run_connection(framed, peer.node_id.clone())
                        .await;
                    debug!(peer = %peer.node_id, "connection closed, redialing");
                }
                Err(e) => {
                    debug!(peer = %peer.node_id, error = %e, "dial failed, backing off");
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Pump one identified connection until it closes. Registering the
    /// writer evicts any previous connection for the same peer.
    async fn run_connection(
        self: Arc<Self>,
        framed: Framed<TcpStream, LengthDelimitedCodec>,
        peer_id: String,
    ) {
        let (mut sink, mut stream) = framed.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let my_tx = tx.clone();
        self.peers.insert(peer_id.clone(), PeerHandle { tx });
        info!(node = %self.config.node_id, peer = %peer_id, "peer registered");

        let writer = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if sink.send(bytes).await.is_err() {
                    break;
                }
            }
            // Cooperative close when the handle is evicted or dropped.
            if let Ok(bytes) = encode_frame(&WireFrame::disconnect()) {
                let _ = sink.send(bytes).await;
            }
        });

        while let Some(frame) = stream.next().await {
            let bytes = match frame {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(peer = %peer_id, error = %e, "read error, closing connection");
                    break;
                }
            };
            match serde_json::from_slice::<WireFrame>(&bytes) {
                Ok(WireFrame::Consensus(message)) => {
                    if self.inbound_tx.send(*message).is_err() {
                        break;
                    }
                }
                Ok(WireFrame::Control(ControlFrame::Disconnect)) => {
                    debug!(peer = %peer_id, "peer disconnected cooperatively");
                    break;
                }
                Ok(WireFrame::Control(ControlFrame::Ident { .. })) => {
                    // Redundant ident on an established stream; ignore.
                }
                Err(e) => {
                    warn!(peer = %peer_id, error = %e, "undecodable frame dropped");
                }
            }
        }

        // Only deregister if this connection is still the registered one;
        // a replacement connection keeps its own handle.
        self.peers
            .remove_if(&peer_id, |_, handle| handle.tx.same_channel(&my_tx));
        writer.abort();
    }
}

fn encode_frame(frame: &WireFrame) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(frame)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_spec_parsing() {
        let peer: PeerConfig = "node-2:127.0.0.1:9002".parse().unwrap();
        assert_eq!(peer.node_id, "node-2");
        assert_eq!(peer.addr(), "127.0.0.1:9002");

        assert!("node-2:127.0.0.1".parse::<PeerConfig>().is_err());
        assert!("node-2:host:notaport".parse::<PeerConfig>().is_err());
        assert!(":host:9002".parse::<PeerConfig>().is_err());
    }
}
