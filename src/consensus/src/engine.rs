//! Single-slot PBFT engine.

use crate::message::{Commit, ConsensusType, PrePrepare, Prepare};
use crate::metrics::ConsensusMetrics;
use crate::state::{PbftPhase, SlotKey, VoteLog};
use crate::{quorum_threshold, SequenceNumber, ViewNumber};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use veriqos_core::QoSProof;
use veriqos_crypto::{digest_hex, Keyring};

/// Result of a finalized slot, handed back to the task pipeline.
#[derive(Debug, Clone)]
pub struct ConsensusOutcome {
    pub task_id: String,
    pub proposal: QoSProof,
    pub consensus_type: ConsensusType,
    pub view_number: ViewNumber,
    pub sequence_number: SequenceNumber,
}

/// PBFT state machine for one committee node.
///
/// The engine drives at most one slot at a time and never fails loudly:
/// invalid or untimely messages are dropped with a log line, and the
/// caller learns about progress only through returned votes and the
/// final [`ConsensusOutcome`]. The pipeline owns the engine and feeds it
/// under the node's single lock.
pub struct PbftEngine {
    node_id: String,
    is_leader: bool,
    total_nodes: usize,
    view_number: ViewNumber,
    sequence_number: SequenceNumber,
    phase: PbftPhase,
    current_proposal: Option<QoSProof>,
    current_digest: Option<String>,
    current_consensus_type: ConsensusType,
    current_task_id: Option<String>,
    votes: VoteLog,
    completed_sequences: HashSet<SequenceNumber>,
    keyring: Arc<Keyring>,
    metrics: Arc<ConsensusMetrics>,
}

impl PbftEngine {
    pub fn new(
        node_id: impl Into<String>,
        is_leader: bool,
        total_nodes: usize,
        keyring: Arc<Keyring>,
        metrics: Arc<ConsensusMetrics>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            is_leader,
            total_nodes,
            view_number: 0,
            sequence_number: 0,
            phase: PbftPhase::Idle,
            current_proposal: None,
            current_digest: None,
            current_consensus_type: ConsensusType::Normal,
            current_task_id: None,
            votes: VoteLog::new(),
            completed_sequences: HashSet::new(),
            keyring,
            metrics,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn phase(&self) -> PbftPhase {
        self.phase
    }

    pub fn view_number(&self) -> ViewNumber {
        self.view_number
    }

    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    /// Quorum threshold 2f+1 for this committee.
    pub fn quorum(&self) -> usize {
        quorum_threshold(self.total_nodes)
    }

    pub fn completed_sequences(&self) -> &HashSet<SequenceNumber> {
        &self.completed_sequences
    }

    fn current_key(&self) -> SlotKey {
        (self.view_number, self.sequence_number)
    }

    /// Start a consensus round for `proposal` (leader only, engine idle).
    /// Returns the pre-prepare to broadcast, or nothing if the
    /// preconditions fail.
    pub fn start_consensus(
        &mut self,
        proposal: QoSProof,
        consensus_type: ConsensusType,
    ) -> Option<PrePrepare> {
        if !self.is_leader {
            debug!(node = %self.node_id, "start_consensus ignored: not the leader");
            return None;
        }
        if self.phase != PbftPhase::Idle {
            debug!(node = %self.node_id, phase = self.phase.as_tag(), "start_consensus ignored: slot busy");
            return None;
        }

        let payload = match serde_json::to_vec(&proposal) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "proposal serialization failed");
                return None;
            }
        };

        let digest = digest_hex(&payload);
        let task_id = proposal.task_id.clone();
        let sequence = self.sequence_number + 1;

        let mut pre_prepare = PrePrepare::new(
            consensus_type,
            self.view_number,
            sequence,
            self.node_id.clone(),
            task_id.clone(),
            digest.clone(),
            proposal.clone(),
        );
        pre_prepare.signature = self.sign(&pre_prepare.signing_bytes())?;

        self.sequence_number = sequence;
        self.current_proposal = Some(proposal);
        self.current_digest = Some(digest);
        self.current_consensus_type = consensus_type;
        self.current_task_id = Some(task_id);
        self.phase = PbftPhase::PrePrepared;

        self.metrics.rounds_started.inc();
        self.metrics.current_sequence.set(self.sequence_number as i64);
        debug!(
            node = %self.node_id,
            seq = self.sequence_number,
            consensus_type = consensus_type.as_str(),
            "consensus round started"
        );
        Some(pre_prepare)
    }

    /// Handle a pre-prepare: adopt the proposal and answer with this
    /// node's prepare vote. The returned prepare is already counted in
    /// this node's own prepare set, and any buffered prepares for the
    /// slot are drained at the same time.
    pub fn handle_pre_prepare(&mut self, msg: &PrePrepare) -> Option<Prepare> {
        if self.completed_sequences.contains(&msg.sequence_number) {
            self.drop_message("PRE_PREPARE", "sequence already completed");
            return None;
        }
        if msg.view_number != self.view_number {
            self.drop_message("PRE_PREPARE", "view mismatch");
            return None;
        }

        // The digest must be reproducible from the payload.
        let payload = serde_json::to_vec(&msg.data).ok()?;
        if digest_hex(&payload) != msg.digest {
            self.drop_message("PRE_PREPARE", "digest mismatch");
            return None;
        }
        if !self.keyring.verify_hex(&msg.node_id, &msg.signing_bytes(), &msg.signature) {
            self.drop_message("PRE_PREPARE", "invalid signature");
            return None;
        }

        // Followers accept in Idle; the leader consumes its own
        // pre-prepare right after start_consensus moved it to PrePrepared.
        let own_echo = self.is_leader
            && self.phase == PbftPhase::PrePrepared
            && msg.node_id == self.node_id;
        if self.phase != PbftPhase::Idle && !own_echo {
            self.drop_message("PRE_PREPARE", "slot busy");
            return None;
        }

        let mut prepare = Prepare::new(
            msg.consensus_type,
            msg.view_number,
            msg.sequence_number,
            self.node_id.clone(),
            msg.task_id.clone(),
            msg.digest.clone(),
        );
        prepare.signature = self.sign(&prepare.signing_bytes())?;

        self.current_proposal = Some(msg.data.clone());
        self.current_digest = Some(msg.digest.clone());
        self.current_consensus_type = msg.consensus_type;
        self.sequence_number = msg.sequence_number;
        self.current_task_id = Some(msg.task_id.clone());
        if self.phase == PbftPhase::Idle {
            self.phase = PbftPhase::PrePrepared;
        }
        self.metrics.current_sequence.set(self.sequence_number as i64);

        // Seed the slot with our own vote, then drain whatever arrived
        // before we pre-prepared. The drain happens exactly once: the
        // pending buffer is consumed.
        let key = self.current_key();
        self.votes.insert_prepare(prepare.clone());
        self.votes.drain_pending_prepares(key);

        debug!(node = %self.node_id, seq = msg.sequence_number, "pre-prepare adopted");
        Some(prepare)
    }

    /// Handle a prepare vote. Returns this node's commit vote when the
    /// prepare quorum is reached.
    pub fn handle_prepare(&mut self, msg: &Prepare) -> Option<Commit> {
        if self.completed_sequences.contains(&msg.sequence_number) {
            self.drop_message("PREPARE", "sequence already completed");
            return None;
        }
        if msg.view_number != self.view_number {
            self.drop_message("PREPARE", "view mismatch");
            return None;
        }
        if !self.keyring.verify_hex(&msg.node_id, &msg.signing_bytes(), &msg.signature) {
            self.drop_message("PREPARE", "invalid signature");
            return None;
        }

        self.metrics.prepares_received.inc();
        let key = (msg.view_number, msg.sequence_number);

        // A vote for a slot we have not entered yet waits in the pending
        // buffer; a vote for a slot we already advanced past is dropped.
        if key != self.current_key() || self.phase < PbftPhase::PrePrepared {
            self.votes.buffer_prepare(msg.clone());
            self.metrics.messages_buffered.inc();
            debug!(node = %self.node_id, seq = msg.sequence_number, "prepare buffered");
            return None;
        }
        if self.phase > PbftPhase::PrePrepared {
            self.drop_message("PREPARE", "already prepared");
            return None;
        }

        let count = self.votes.insert_prepare(msg.clone());
        if count < self.quorum() {
            return None;
        }

        let digest = self.current_digest.clone()?;
        let task_id = self.current_task_id.clone()?;
        let mut commit = Commit::new(
            self.current_consensus_type,
            self.view_number,
            self.sequence_number,
            self.node_id.clone(),
            task_id,
            digest,
        );
        commit.signature = self.sign(&commit.signing_bytes())?;
        self.phase = PbftPhase::Prepared;

        // Same own-vote-then-drain discipline as the prepare phase.
        self.votes.insert_commit(commit.clone());
        self.votes.drain_pending_commits(key);

        debug!(node = %self.node_id, seq = self.sequence_number, "prepared, sending commit");
        Some(commit)
    }

    /// Handle a commit vote. Returns the consensus outcome when the
    /// commit quorum is reached; the engine resets to idle afterwards.
    pub fn handle_commit(&mut self, msg: &Commit) -> Option<ConsensusOutcome> {
        if self.completed_sequences.contains(&msg.sequence_number) {
            self.drop_message("COMMIT", "sequence already completed");
            return None;
        }
        if msg.view_number != self.view_number {
            self.drop_message("COMMIT", "view mismatch");
            return None;
        }
        if !self.keyring.verify_hex(&msg.node_id, &msg.signing_bytes(), &msg.signature) {
            self.drop_message("COMMIT", "invalid signature");
            return None;
        }

        self.metrics.commits_received.inc();
        let key = (msg.view_number, msg.sequence_number);

        if key != self.current_key() || self.phase < PbftPhase::Prepared {
            self.votes.buffer_commit(msg.clone());
            self.metrics.messages_buffered.inc();
            debug!(node = %self.node_id, seq = msg.sequence_number, "commit buffered");
            return None;
        }
        if self.phase > PbftPhase::Prepared {
            self.drop_message("COMMIT", "already committed");
            return None;
        }

        let count = self.votes.insert_commit(msg.clone());
        if count < self.quorum() {
            return None;
        }

        let (Some(task_id), Some(proposal)) =
            (self.current_task_id.take(), self.current_proposal.take())
        else {
            return None;
        };

        self.phase = PbftPhase::Committed;
        self.completed_sequences.insert(msg.sequence_number);
        self.metrics.sequences_finalized.inc();

        let outcome = ConsensusOutcome {
            task_id,
            proposal,
            consensus_type: self.current_consensus_type,
            view_number: self.view_number,
            sequence_number: self.sequence_number,
        };

        // Slot done: reset for the next round and forget its votes.
        self.phase = PbftPhase::Idle;
        self.current_digest = None;
        self.votes.clear_slot(key);

        debug!(
            node = %self.node_id,
            seq = outcome.sequence_number,
            consensus_type = outcome.consensus_type.as_str(),
            "consensus reached"
        );
        Some(outcome)
    }

    fn sign(&self, bytes: &[u8]) -> Option<String> {
        match self.keyring.sign_hex(bytes) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(node = %self.node_id, error = %e, "message signing failed");
                None
            }
        }
    }

    fn drop_message(&self, message_type: &str, reason: &str) {
        self.metrics.messages_dropped.inc();
        debug!(node = %self.node_id, message_type, reason, "message dropped");
    }
}
