//! Prometheus metrics for consensus

use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Consensus metrics exposed to Prometheus.
pub struct ConsensusMetrics {
    /// Consensus rounds started by this node as leader
    pub rounds_started: IntCounter,

    /// Sequences finalized
    pub sequences_finalized: IntCounter,

    /// Prepare votes received
    pub prepares_received: IntCounter,

    /// Commit votes received
    pub commits_received: IntCounter,

    /// Messages dropped (wrong view, bad digest, wrong state, completed)
    pub messages_dropped: IntCounter,

    /// Messages buffered ahead of the local phase
    pub messages_buffered: IntCounter,

    /// Current view number
    pub current_view: IntGauge,

    /// Current sequence number
    pub current_sequence: IntGauge,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl ConsensusMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let rounds_started = IntCounter::with_opts(
            Opts::new("consensus_rounds_started_total", "Consensus rounds started as leader")
                .namespace("veriqos"),
        )
        .unwrap();
        registry.register(Box::new(rounds_started.clone())).unwrap();

        let sequences_finalized = IntCounter::with_opts(
            Opts::new("consensus_sequences_finalized_total", "Sequences finalized")
                .namespace("veriqos"),
        )
        .unwrap();
        registry
            .register(Box::new(sequences_finalized.clone()))
            .unwrap();

        let prepares_received = IntCounter::with_opts(
            Opts::new("consensus_prepares_received_total", "Prepare votes received")
                .namespace("veriqos"),
        )
        .unwrap();
        registry
            .register(Box::new(prepares_received.clone()))
            .unwrap();

        let commits_received = IntCounter::with_opts(
            Opts::new("consensus_commits_received_total", "Commit votes received")
                .namespace("veriqos"),
        )
        .unwrap();
        registry
            .register(Box::new(commits_received.clone()))
            .unwrap();

        let messages_dropped = IntCounter::with_opts(
            Opts::new("consensus_messages_dropped_total", "Messages dropped by validation")
                .namespace("veriqos"),
        )
        .unwrap();
        registry
            .register(Box::new(messages_dropped.clone()))
            .unwrap();

        let messages_buffered = IntCounter::with_opts(
            Opts::new(
                "consensus_messages_buffered_total",
                "Votes buffered ahead of the local phase",
            )
            .namespace("veriqos"),
        )
        .unwrap();
        registry
            .register(Box::new(messages_buffered.clone()))
            .unwrap();

        let current_view = IntGauge::with_opts(
            Opts::new("consensus_current_view", "Current view number").namespace("veriqos"),
        )
        .unwrap();
        registry.register(Box::new(current_view.clone())).unwrap();

        let current_sequence = IntGauge::with_opts(
            Opts::new("consensus_current_sequence", "Current sequence number")
                .namespace("veriqos"),
        )
        .unwrap();
        registry
            .register(Box::new(current_sequence.clone()))
            .unwrap();

        Self {
            rounds_started,
            sequences_finalized,
            prepares_received,
            commits_received,
            messages_dropped,
            messages_buffered,
            current_view,
            current_sequence,
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

impl Default for ConsensusMetrics {
    fn default() -> Self {
        Self::new()
    }
}
