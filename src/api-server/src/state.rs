use std::sync::Arc;
use std::time::Instant;
use veriqos_committee::CommitteeNode;
use veriqos_network::Transport;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Task pipeline of this committee node.
    pub node: Arc<CommitteeNode>,

    /// Inter-node transport, for connection stats.
    pub transport: Arc<Transport>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(node: Arc<CommitteeNode>, transport: Arc<Transport>) -> Self {
        Self {
            node,
            transport,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
