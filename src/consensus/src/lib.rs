//! # VeriQoS Consensus
//!
//! Single-slot PBFT engine for the attestation committee. One node is the
//! configured leader; the committee of N nodes tolerates
//! f = ⌊(N−1)/3⌋ faulty members with a quorum threshold of 2f+1.
//!
//! ## Protocol
//!
//! 1. **Pre-Prepare**: the leader proposes an attestation payload
//! 2. **Prepare**: nodes validate and broadcast prepare votes
//! 3. **Commit**: after 2f+1 prepares, nodes broadcast commit votes
//! 4. After 2f+1 commits the slot finalizes and the outcome is handed
//!    back to the task pipeline
//!
//! The engine drives exactly one slot at a time. Votes arriving before
//! this node has entered the corresponding phase are buffered and drained
//! exactly once, atomically with the phase transition; votes for
//! finalized sequences are suppressed outright.

pub mod engine;
pub mod message;
pub mod metrics;
pub mod state;

pub use engine::{ConsensusOutcome, PbftEngine};
pub use message::{
    Commit, ConsensusMessage, ConsensusType, PrePrepare, Prepare, StatusUpdate, SupplementaryAck,
    SupplementaryReady,
};
pub use metrics::ConsensusMetrics;
pub use state::{PbftPhase, SlotKey, VoteLog};

/// Consensus view number (monotonically increasing; view changes are out
/// of scope, so it stays at its initial value in practice).
pub type ViewNumber = u64;

/// Consensus sequence number (monotonically increasing, leader-assigned).
pub type SequenceNumber = u64;

/// Quorum threshold 2f+1 for a committee of `total_nodes`.
pub fn quorum_threshold(total_nodes: usize) -> usize {
    let f = (total_nodes.saturating_sub(1)) / 3;
    2 * f + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_calculation() {
        // For 4 nodes, f=1, quorum = 2f+1 = 3
        assert_eq!(quorum_threshold(4), 3);

        // For 7 nodes, f=2, quorum = 2f+1 = 5
        assert_eq!(quorum_threshold(7), 5);

        // For 10 nodes, f=3, quorum = 2f+1 = 7
        assert_eq!(quorum_threshold(10), 7);
    }
}
