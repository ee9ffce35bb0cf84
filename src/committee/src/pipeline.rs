//! Task pipeline: ingestion, consensus queueing, and the supplementary
//! two-stage protocol.

use crate::error::{PipelineError, Result};
use crate::record::TaskRecord;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use veriqos_consensus::{
    Commit, ConsensusMessage, ConsensusMetrics, ConsensusOutcome, ConsensusType, PbftEngine,
    PrePrepare, Prepare, StatusUpdate, SupplementaryAck, SupplementaryReady,
};
use veriqos_core::{
    now_millis, ConsensusResult, Event, EventKind, EventSink, QoSProof, SupplementaryInfo,
    TaskState, TaskStatus,
};
use veriqos_crypto::{digest_hex, Keyring};
use veriqos_validator::{
    classify_conflict, deep_validate, quick_validate, resolve_with_supplementary,
};

/// How long a task waits in `AwaitingSupplementary` before it is routed
/// to manual review.
pub const SUPPLEMENTARY_TIMEOUT_MS: i64 = 2 * 60 * 60 * 1000;

/// Pending tasks older than this are expired by the GC sweep.
pub const TASK_EXPIRY_MS: i64 = 24 * 60 * 60 * 1000;

/// Static committee parameters for one node.
#[derive(Debug, Clone)]
pub struct CommitteeConfig {
    pub node_id: String,
    pub is_leader: bool,
    pub total_nodes: usize,
}

/// Outcome of ingesting one verifier attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted { task_id: String },
    Rejected { task_id: String, reason: String },
    Duplicate { task_id: String },
}

/// Message leaving this node through the transport adapter.
#[derive(Debug, Clone)]
pub enum Outbound {
    Broadcast(ConsensusMessage),
    Direct { to: String, message: ConsensusMessage },
}

/// One queued consensus round.
#[derive(Debug, Clone)]
struct QueuedRound {
    task_id: String,
    consensus_type: ConsensusType,
}

/// A committee node's task pipeline.
///
/// All state lives behind a single mutex; every public method locks it
/// for the duration of its logic and never blocks while holding it.
/// Outbound messages are pushed onto an unbounded channel the transport
/// layer drains.
pub struct CommitteeNode {
    node_id: String,
    is_leader: bool,
    metrics: Arc<ConsensusMetrics>,
    state: Mutex<PipelineState>,
}

struct PipelineState {
    config: CommitteeConfig,
    tasks: HashMap<String, TaskRecord>,
    consensus_queue: VecDeque<QueuedRound>,
    processing_consensus: bool,
    current_consensus_task: Option<String>,
    /// Pre-prepares that arrived before this node held two proofs.
    pending_pre_prepare: HashMap<String, PrePrepare>,
    /// Second-round pre-prepares that arrived before this node finished
    /// its supplementary handling.
    pending_final_pre_prepare: HashMap<String, PrePrepare>,
    /// Leader only: replicas ready for the final round, per task.
    supplementary_ready: HashMap<String, HashSet<String>>,
    /// Leader only: deferred final-round payloads, per task.
    pending_supplementary_consensus: HashMap<String, QoSProof>,
    /// Learned from pre-prepare and readiness traffic; acks go here.
    known_leader: Option<String>,
    engine: PbftEngine,
    keyring: Arc<Keyring>,
    events: Arc<dyn EventSink>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
}

impl CommitteeNode {
    /// Build a pipeline and the receiving end of its outbound channel.
    pub fn new(
        config: CommitteeConfig,
        keyring: Arc<Keyring>,
        events: Arc<dyn EventSink>,
    ) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(ConsensusMetrics::new());
        let engine = PbftEngine::new(
            config.node_id.clone(),
            config.is_leader,
            config.total_nodes,
            keyring.clone(),
            metrics.clone(),
        );
        let node = Self {
            node_id: config.node_id.clone(),
            is_leader: config.is_leader,
            metrics,
            state: Mutex::new(PipelineState {
                config,
                tasks: HashMap::new(),
                consensus_queue: VecDeque::new(),
                processing_consensus: false,
                current_consensus_task: None,
                pending_pre_prepare: HashMap::new(),
                pending_final_pre_prepare: HashMap::new(),
                supplementary_ready: HashMap::new(),
                pending_supplementary_consensus: HashMap::new(),
                known_leader: None,
                engine,
                keyring,
                events,
                outbound_tx,
            }),
        };
        (node, outbound_rx)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn metrics(&self) -> Arc<ConsensusMetrics> {
        self.metrics.clone()
    }

    /// Ingest one verifier attestation (HTTP ingress entry point).
    pub fn ingest_proof(&self, proof: QoSProof) -> IngestOutcome {
        self.state.lock().ingest_proof(proof, now_millis())
    }

    /// Ingest a supplementary attestation for a conflicted task.
    pub fn ingest_supplementary(&self, task_id: &str, proof: QoSProof) -> Result<()> {
        self.state
            .lock()
            .ingest_supplementary(task_id, proof, now_millis())
    }

    /// Dispatch one inbound transport message.
    pub fn handle_message(&self, message: ConsensusMessage) {
        self.state.lock().handle_message(message, now_millis());
    }

    /// Force the supplementary-timeout check for one task. Idempotent:
    /// no-ops unless the task is still waiting with no supplementary
    /// attestation recorded.
    pub fn check_supplementary_timeout(&self, task_id: &str) -> bool {
        self.state
            .lock()
            .check_supplementary_timeout(task_id, now_millis())
    }

    /// Periodic sweep applying the supplementary timeout to every task
    /// whose deadline has passed.
    pub fn sweep_supplementary_timeouts(&self) {
        self.sweep_supplementary_timeouts_at(now_millis());
    }

    pub fn sweep_supplementary_timeouts_at(&self, now_ms: i64) {
        self.state.lock().sweep_supplementary_timeouts(now_ms);
    }

    /// Hourly GC: pending tasks idle for 24 hours become `Expired`.
    pub fn gc_sweep(&self) {
        self.gc_sweep_at(now_millis());
    }

    pub fn gc_sweep_at(&self, now_ms: i64) {
        self.state.lock().gc_sweep(now_ms);
    }

    /// Externally visible record for one task.
    pub fn task_status(&self, task_id: &str) -> Option<TaskStatus> {
        self.state
            .lock()
            .tasks
            .get(task_id)
            .map(|r| r.status.clone())
    }

    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.state.lock().tasks.get(task_id).map(|r| r.status.state)
    }

    /// Engine phase tag for the status surface.
    pub fn pbft_phase_tag(&self) -> &'static str {
        self.state.lock().engine.phase().as_tag()
    }

    /// Sequences this node has finalized.
    pub fn completed_sequences(&self) -> Vec<u64> {
        let state = self.state.lock();
        let mut seqs: Vec<u64> = state.engine.completed_sequences().iter().copied().collect();
        seqs.sort_unstable();
        seqs
    }

    /// Whether a consensus window is currently open on this node.
    pub fn processing_consensus(&self) -> bool {
        self.state.lock().processing_consensus
    }
}

impl PipelineState {
    fn node_id(&self) -> &str {
        &self.config.node_id
    }

    fn is_leader(&self) -> bool {
        self.config.is_leader
    }

    fn record_event(&self, kind: EventKind, task_id: &str) {
        self.events
            .record_event(Event::new(kind, self.node_id()).with_task(task_id));
    }

    fn broadcast(&self, message: ConsensusMessage) {
        let _ = self.outbound_tx.send(Outbound::Broadcast(message));
    }

    fn send_to(&self, peer: &str, message: ConsensusMessage) {
        let _ = self.outbound_tx.send(Outbound::Direct {
            to: peer.to_string(),
            message,
        });
    }

    fn sign(&self, bytes: &[u8]) -> String {
        self.keyring.sign_hex(bytes).unwrap_or_default()
    }

    // ---- ingestion -----------------------------------------------------

    fn ingest_proof(&mut self, proof: QoSProof, now_ms: i64) -> IngestOutcome {
        let task_id = proof.task_id.clone();
        self.record_event(EventKind::ProofReceived, &task_id);

        // Malformed proofs are dropped without touching task state.
        let quick = quick_validate(&proof, now_ms, self.keyring.as_ref());
        if !quick.valid {
            debug!(task = %task_id, reason = %quick.details, "proof rejected by quick validation");
            self.record_event(EventKind::ProofRejected, &task_id);
            return IngestOutcome::Rejected {
                task_id,
                reason: quick.details,
            };
        }

        if !self.tasks.contains_key(&task_id) {
            self.tasks
                .insert(task_id.clone(), TaskRecord::new(&task_id, now_ms));
            self.record_event(EventKind::TaskCreated, &task_id);
        }

        if self.tasks[&task_id].has_verifier(&proof.verifier_id) {
            debug!(task = %task_id, verifier = %proof.verifier_id, "duplicate proof dropped");
            self.record_event(EventKind::DuplicateProof, &task_id);
            return IngestOutcome::Duplicate { task_id };
        }

        {
            let record = self.tasks.get_mut(&task_id).expect("record just ensured");
            record.status.proof_count += 1;
            record.status.verifier_ids.push(proof.verifier_id.clone());
            record.status.updated_at = now_ms;
            record.proofs.push(proof);

            if record.status.state == TaskState::Pending {
                record.status.state = TaskState::Validating;
            }
        }

        // The leader starts consensus once two verifiers have reported.
        let ready_for_consensus = {
            let record = &self.tasks[&task_id];
            self.is_leader()
                && record.status.proof_count >= 2
                && matches!(
                    record.status.state,
                    TaskState::Pending | TaskState::Validating
                )
        };
        if ready_for_consensus {
            let consensus_type = self.run_deep_validation(&task_id);
            {
                let record = self.tasks.get_mut(&task_id).expect("record exists");
                record.status.state = TaskState::Consensus;
                record.status.updated_at = now_ms;
            }
            self.consensus_queue.push_back(QueuedRound {
                task_id: task_id.clone(),
                consensus_type,
            });
            self.drain_queue(now_ms);
        }

        // A follower that was short on proofs may now unblock a buffered
        // pre-prepare.
        if !self.is_leader() {
            if let Some(pre_prepare) = self.pending_pre_prepare.remove(&task_id) {
                debug!(task = %task_id, "replaying buffered pre-prepare");
                self.handle_pre_prepare_message(pre_prepare, now_ms);
            }
        }

        IngestOutcome::Accepted { task_id }
    }

    /// Deep-validate the stored proofs, recording conflict details on the
    /// task. Returns the consensus tag for the next round.
    fn run_deep_validation(&mut self, task_id: &str) -> ConsensusType {
        let record = self.tasks.get_mut(task_id).expect("record exists");
        let deep = deep_validate(&record.proofs);
        if !deep.valid && deep.has_conflict {
            let conflict_type = classify_conflict(&deep);
            let info = record.status.validation_info_mut();
            info.conflict_type = Some(conflict_type);
            info.conflict_details = Some(deep.details.clone());
            record.deep_result = Some(deep);
            record.consensus_type = ConsensusType::Conflict;
            ConsensusType::Conflict
        } else {
            record.consensus_type = ConsensusType::Normal;
            ConsensusType::Normal
        }
    }

    // ---- consensus queue -----------------------------------------------

    /// Serial queue drain: at most one consensus round runs per node; the
    /// consensus-reached path reopens the window and re-enters.
    fn drain_queue(&mut self, now_ms: i64) {
        while !self.processing_consensus {
            let Some(round) = self.consensus_queue.pop_front() else {
                break;
            };
            let Some(record) = self.tasks.get(&round.task_id) else {
                continue;
            };
            // Tasks parked for supplementary verification are not driven
            // through the ordinary queue.
            if record.status.state == TaskState::AwaitingSupplementary {
                continue;
            }
            if record.status.state != TaskState::Consensus {
                continue;
            }
            let Some(first_proof) = record.proofs.first().cloned() else {
                continue;
            };

            self.processing_consensus = true;
            self.current_consensus_task = Some(round.task_id.clone());

            let Some(pre_prepare) = self
                .engine
                .start_consensus(first_proof, round.consensus_type)
            else {
                self.processing_consensus = false;
                self.current_consensus_task = None;
                continue;
            };

            self.record_event(EventKind::ConsensusStarted, &round.task_id);
            self.broadcast(ConsensusMessage::PrePrepare(pre_prepare.clone()));

            // The leader consumes its own pre-prepare so its prepare vote
            // is broadcast and counted like everyone else's.
            if let Some(prepare) = self.engine.handle_pre_prepare(&pre_prepare) {
                self.broadcast(ConsensusMessage::Prepare(prepare.clone()));
                self.feed_prepare(prepare, now_ms);
            }
        }
    }

    // ---- inbound dispatch ----------------------------------------------

    fn handle_message(&mut self, message: ConsensusMessage, now_ms: i64) {
        match message {
            ConsensusMessage::PrePrepare(pre_prepare) => {
                if self.filtered(&pre_prepare.task_id) {
                    return;
                }
                self.handle_pre_prepare_message(pre_prepare, now_ms);
            }
            ConsensusMessage::Prepare(prepare) => {
                if self.filtered(&prepare.task_id) {
                    return;
                }
                if let Some(commit) = self.engine.handle_prepare(&prepare) {
                    self.broadcast(ConsensusMessage::Commit(commit.clone()));
                    self.feed_commit(commit, now_ms);
                }
            }
            ConsensusMessage::Commit(commit) => {
                if self.filtered(&commit.task_id) {
                    return;
                }
                self.feed_commit(commit, now_ms);
            }
            ConsensusMessage::StatusUpdate(update) => {
                debug!(
                    task = %update.task_id,
                    from = %update.node_id,
                    "status update received"
                );
            }
            ConsensusMessage::SupplementaryReady(ready) => {
                self.handle_supplementary_ready(ready);
            }
            ConsensusMessage::SupplementaryAck(ack) => {
                self.handle_supplementary_ack(ack, now_ms);
            }
        }
    }

    /// Consensus traffic for anything but the active task is dropped.
    fn filtered(&self, task_id: &str) -> bool {
        match &self.current_consensus_task {
            Some(current) if current != task_id => {
                debug!(task = %task_id, current = %current, "message for inactive task dropped");
                true
            }
            _ => false,
        }
    }

    fn handle_pre_prepare_message(&mut self, pre_prepare: PrePrepare, now_ms: i64) {
        if pre_prepare.node_id != self.node_id() {
            self.known_leader = Some(pre_prepare.node_id.clone());
        }
        if let Some(prepare) = self.process_pre_prepare(pre_prepare, now_ms) {
            self.broadcast(ConsensusMessage::Prepare(prepare.clone()));
            self.feed_prepare(prepare, now_ms);
        }
    }

    /// Pipeline-level pre-prepare processing: buffers the message until
    /// this node holds enough proofs, recognizes second-round proposals,
    /// and otherwise validates locally before handing it to the engine.
    fn process_pre_prepare(&mut self, pre_prepare: PrePrepare, now_ms: i64) -> Option<Prepare> {
        let task_id = pre_prepare.task_id.clone();
        self.current_consensus_task = Some(task_id.clone());

        let proof_count = self
            .tasks
            .get(&task_id)
            .map(|r| r.proofs.len())
            .unwrap_or(0);
        if proof_count < 2 {
            debug!(task = %task_id, proof_count, "pre-prepare buffered until enough local proofs");
            self.pending_pre_prepare.insert(task_id, pre_prepare);
            return None;
        }

        let state = self.tasks.get(&task_id).map(|r| r.status.state)?;

        // A Normal-tagged proposal for a task already past its conflict
        // is the leader's final round.
        if pre_prepare.consensus_type == ConsensusType::Normal {
            if state == TaskState::Validated {
                let record = self.tasks.get_mut(&task_id)?;
                record.status.state = TaskState::Consensus;
                record.status.updated_at = now_ms;
                return self.engine.handle_pre_prepare(&pre_prepare);
            }
            if state == TaskState::AwaitingSupplementary {
                debug!(task = %task_id, "final-round pre-prepare buffered until supplementary is processed");
                self.pending_final_pre_prepare.insert(task_id, pre_prepare);
                return None;
            }
        }

        // Ordinary first round: quick-check the payload, deep-check our
        // own proofs, then adopt.
        let quick = quick_validate(&pre_prepare.data, now_ms, self.keyring.as_ref());
        if !quick.valid {
            debug!(task = %task_id, reason = %quick.details, "pre-prepare payload failed quick validation");
            return None;
        }

        self.run_deep_validation(&task_id);
        {
            let record = self.tasks.get_mut(&task_id)?;
            record.status.state = TaskState::Consensus;
            record.status.updated_at = now_ms;
        }
        self.engine.handle_pre_prepare(&pre_prepare)
    }

    /// Feed one of our own prepare votes back into the engine and follow
    /// through on a resulting commit.
    fn feed_prepare(&mut self, prepare: Prepare, now_ms: i64) {
        if let Some(commit) = self.engine.handle_prepare(&prepare) {
            self.broadcast(ConsensusMessage::Commit(commit.clone()));
            self.feed_commit(commit, now_ms);
        }
    }

    fn feed_commit(&mut self, commit: Commit, now_ms: i64) {
        if let Some(outcome) = self.engine.handle_commit(&commit) {
            self.on_consensus_reached(outcome, now_ms);
        }
    }

    // ---- consensus reached ---------------------------------------------

    fn on_consensus_reached(&mut self, outcome: ConsensusOutcome, now_ms: i64) {
        let task_id = outcome.task_id.clone();
        match outcome.consensus_type {
            ConsensusType::Normal => {
                if let Some(record) = self.tasks.get_mut(&task_id) {
                    record.status.state = TaskState::Finalized;
                    record.status.result = Some(ConsensusResult {
                        consensus_timestamp: now_ms,
                        tx_hash: None,
                    });
                    record.status.updated_at = now_ms;
                }
                info!(task = %task_id, seq = outcome.sequence_number, "task finalized");
                self.record_event(EventKind::ConsensusReachNormal, &task_id);
                self.broadcast_status_update(&outcome);
            }
            ConsensusType::Conflict => {
                if let Some(record) = self.tasks.get_mut(&task_id) {
                    record.status.state = TaskState::AwaitingSupplementary;
                    record.status.updated_at = now_ms;
                    record.supplementary_deadline = Some(now_ms + SUPPLEMENTARY_TIMEOUT_MS);
                    let info = record.status.validation_info_mut();
                    info.supplementary_requested = true;
                    info.supplementary_request_time = Some(now_ms);
                }
                info!(task = %task_id, "conflict consensus reached, awaiting supplementary attestation");
                self.record_event(EventKind::ConsensusReachConflict, &task_id);
            }
        }

        if self
            .consensus_queue
            .front()
            .map(|q| q.task_id == task_id)
            .unwrap_or(false)
        {
            self.consensus_queue.pop_front();
        }
        self.processing_consensus = false;
        self.current_consensus_task = None;
        self.drain_queue(now_ms);
    }

    /// Informational broadcast after a finalization; receivers only log.
    fn broadcast_status_update(&mut self, outcome: &ConsensusOutcome) {
        let digest = serde_json::to_vec(&outcome.proposal)
            .map(|bytes| digest_hex(&bytes))
            .unwrap_or_default();
        let mut update = StatusUpdate::new(
            outcome.consensus_type,
            outcome.view_number,
            outcome.sequence_number,
            self.node_id().to_string(),
            outcome.task_id.clone(),
            digest,
        );
        update.signature = self.sign(&update.signing_bytes());
        self.broadcast(ConsensusMessage::StatusUpdate(update));
    }

    // ---- supplementary protocol ----------------------------------------

    fn ingest_supplementary(
        &mut self,
        task_id: &str,
        mut proof: QoSProof,
        now_ms: i64,
    ) -> Result<()> {
        proof.task_id = task_id.to_string();

        {
            let record = self
                .tasks
                .get(task_id)
                .ok_or_else(|| PipelineError::UnknownTask(task_id.to_string()))?;
            if record.status.state != TaskState::AwaitingSupplementary {
                return Err(PipelineError::InvalidState {
                    task_id: task_id.to_string(),
                    state: record.status.state.as_tag(),
                });
            }
            if record.proofs.len() < 2 {
                return Err(PipelineError::InsufficientProofs(task_id.to_string()));
            }
        }

        self.record_event(EventKind::SupplementaryReceived, task_id);

        let quick = quick_validate(&proof, now_ms, self.keyring.as_ref());
        if !quick.valid {
            warn!(task = %task_id, reason = %quick.details, "supplementary proof failed quick validation");
            let record = self.tasks.get_mut(task_id).expect("checked above");
            record.status.state = TaskState::Failed;
            record.status.updated_at = now_ms;
            record.status.validation_info_mut().error_message =
                Some(format!("supplementary proof invalid: {}", quick.details));
            return Ok(());
        }

        if proof.id.is_none() {
            proof.id = Some(Uuid::new_v4().to_string());
        }
        let supplementary_id = proof.id.clone().expect("id just ensured");

        let resolution = {
            let record = self.tasks.get_mut(task_id).expect("checked above");
            record
                .status
                .supplementary_verifier_ids
                .get_or_insert_with(Vec::new)
                .push(proof.verifier_id.clone());
            record.supplementary_proofs.push(proof.clone());
            record.status.updated_at = now_ms;

            // A follower whose own proofs agreed may have adopted the
            // conflict only through the consensus tag; derive the
            // disputed field on demand.
            let prior = record
                .deep_result
                .clone()
                .unwrap_or_else(|| deep_validate(&record.proofs));
            let resolution = resolve_with_supplementary(&record.proofs, &proof, &prior);

            record.status.validation_info_mut().resolved_result =
                Some(serde_json::json!({
                    "resolvedBy": resolution.resolved_by.as_str(),
                    "majorityValue": resolution.majority_value,
                    "medianValue": resolution.median_value,
                    "reliableVerifiers": resolution.reliable_verifiers,
                    "unreliableVerifiers": resolution.unreliable_verifiers,
                }));
            resolution
        };

        if resolution.valid {
            self.record_event(EventKind::SupplementaryResolved, task_id);
            {
                let record = self.tasks.get_mut(task_id).expect("checked above");
                record.status.state = TaskState::Validated;
                record.status.updated_at = now_ms;
            }

            if self.is_leader() {
                // Defer the final round until 2f+1 replicas are ready.
                let mut payload = self.tasks[task_id].proofs[0].clone();
                payload.supplementary_info = Some(SupplementaryInfo {
                    supplementary_proof_id: supplementary_id.clone(),
                    resolved_by: resolution.resolved_by.as_str().to_string(),
                    reliable_verifiers: resolution.reliable_verifiers.clone(),
                    unreliable_verifiers: resolution.unreliable_verifiers.clone(),
                });
                self.pending_supplementary_consensus
                    .insert(task_id.to_string(), payload);

                let mut ready = SupplementaryReady::new(
                    self.node_id().to_string(),
                    task_id.to_string(),
                    supplementary_id,
                );
                ready.signature = self.sign(&ready.signing_bytes());
                self.broadcast(ConsensusMessage::SupplementaryReady(ready));

                let node_id = self.node_id().to_string();
                self.supplementary_ready
                    .entry(task_id.to_string())
                    .or_default()
                    .insert(node_id);
            } else if let Some(pre_prepare) = self.pending_final_pre_prepare.remove(task_id) {
                // The leader's final round already arrived; run it now.
                debug!(task = %task_id, "replaying buffered final-round pre-prepare");
                self.handle_pre_prepare_message(pre_prepare, now_ms);
            } else {
                let mut ack = SupplementaryAck::new(
                    self.node_id().to_string(),
                    task_id.to_string(),
                    supplementary_id,
                );
                ack.signature = self.sign(&ack.signing_bytes());
                match self.known_leader.clone() {
                    Some(leader) => self.send_to(&leader, ConsensusMessage::SupplementaryAck(ack)),
                    None => self.broadcast(ConsensusMessage::SupplementaryAck(ack)),
                }
            }
        } else if resolution.needs_manual_review {
            let record = self.tasks.get_mut(task_id).expect("checked above");
            record.status.state = TaskState::NeedsManualReview;
            record.status.updated_at = now_ms;
            info!(task = %task_id, "resolution inconclusive, task routed to manual review");
        } else {
            let record = self.tasks.get_mut(task_id).expect("checked above");
            record.status.state = TaskState::Failed;
            record.status.updated_at = now_ms;
        }

        Ok(())
    }

    fn handle_supplementary_ready(&mut self, ready: SupplementaryReady) {
        if ready.node_id != self.node_id() {
            self.known_leader = Some(ready.node_id.clone());
        }
        if self.is_leader() {
            return;
        }

        let Some(record) = self.tasks.get(&ready.task_id) else {
            debug!(task = %ready.task_id, "readiness for unknown task ignored");
            return;
        };

        // Already past supplementary handling: confirm immediately. Any
        // race between this ack and the final pre-prepare is absorbed by
        // the engine's completed-sequence suppression.
        if matches!(
            record.status.state,
            TaskState::Validated | TaskState::Consensus | TaskState::Finalized
        ) {
            let mut ack = SupplementaryAck::new(
                self.node_id().to_string(),
                ready.task_id.clone(),
                ready.supplementary_proof_id.clone(),
            );
            ack.signature = self.sign(&ack.signing_bytes());
            self.send_to(&ready.node_id, ConsensusMessage::SupplementaryAck(ack));
            return;
        }

        if !record.has_supplementary_proof(&ready.supplementary_proof_id) {
            info!(
                task = %ready.task_id,
                proof_id = %ready.supplementary_proof_id,
                "supplementary proof not yet available locally"
            );
        }
    }

    fn handle_supplementary_ack(&mut self, ack: SupplementaryAck, now_ms: i64) {
        if !self.is_leader() {
            return;
        }
        let task_id = ack.task_id.clone();

        if let Some(record) = self.tasks.get(&task_id) {
            if matches!(
                record.status.state,
                TaskState::Consensus | TaskState::Finalized
            ) {
                debug!(task = %task_id, "late supplementary ack ignored");
                return;
            }
        }

        let quorum = self.engine.quorum();
        let ready = self.supplementary_ready.entry(task_id.clone()).or_default();
        ready.insert(ack.node_id.clone());
        ready.insert(self.config.node_id.clone());
        let ready_count = ready.len();

        debug!(task = %task_id, ready = ready_count, quorum, "supplementary ack recorded");

        if ready_count >= quorum && self.pending_supplementary_consensus.contains_key(&task_id) {
            let payload = self
                .pending_supplementary_consensus
                .remove(&task_id)
                .expect("checked above");
            self.supplementary_ready.remove(&task_id);
            self.start_final_consensus(&task_id, payload, now_ms);
        }
    }

    /// Second consensus round over the conflict-resolved payload. Rides
    /// the normal consensus-reached path into `Finalized`.
    fn start_final_consensus(&mut self, task_id: &str, payload: QoSProof, now_ms: i64) {
        {
            let Some(record) = self.tasks.get_mut(task_id) else {
                return;
            };
            if record.status.state != TaskState::Validated {
                debug!(
                    task = %task_id,
                    state = record.status.state.as_tag(),
                    "final consensus skipped: task not validated"
                );
                return;
            }
            record.status.state = TaskState::Consensus;
            record.status.updated_at = now_ms;
        }

        self.current_consensus_task = Some(task_id.to_string());
        self.processing_consensus = true;

        let Some(pre_prepare) = self.engine.start_consensus(payload, ConsensusType::Normal) else {
            self.processing_consensus = false;
            self.current_consensus_task = None;
            return;
        };

        self.record_event(EventKind::ConsensusStarted, task_id);
        self.broadcast(ConsensusMessage::PrePrepare(pre_prepare.clone()));
        if let Some(prepare) = self.engine.handle_pre_prepare(&pre_prepare) {
            self.broadcast(ConsensusMessage::Prepare(prepare.clone()));
            self.feed_prepare(prepare, now_ms);
        }
    }

    // ---- timers --------------------------------------------------------

    fn check_supplementary_timeout(&mut self, task_id: &str, now_ms: i64) -> bool {
        let Some(record) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if record.status.state != TaskState::AwaitingSupplementary {
            return false;
        }
        let has_supplementary = record
            .status
            .supplementary_verifier_ids
            .as_ref()
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        if has_supplementary {
            return false;
        }

        record.status.state = TaskState::NeedsManualReview;
        record.status.updated_at = now_ms;
        record.status.validation_info_mut().timeout_reason =
            Some("supplementary verification timeout after 2 hours".to_string());
        warn!(task = %task_id, "supplementary verification timed out");
        self.record_event(EventKind::SupplementaryTimeout, task_id);
        true
    }

    fn sweep_supplementary_timeouts(&mut self, now_ms: i64) {
        let due: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, r)| {
                r.status.state == TaskState::AwaitingSupplementary
                    && r.supplementary_deadline
                        .map(|deadline| deadline <= now_ms)
                        .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for task_id in due {
            self.check_supplementary_timeout(&task_id, now_ms);
        }
    }

    fn gc_sweep(&mut self, now_ms: i64) {
        let expired: Vec<String> = self
            .tasks
            .iter()
            .filter(|(_, r)| {
                r.status.state == TaskState::Pending
                    && now_ms - r.status.updated_at > TASK_EXPIRY_MS
            })
            .map(|(id, _)| id.clone())
            .collect();
        for task_id in expired {
            if let Some(record) = self.tasks.get_mut(&task_id) {
                record.status.state = TaskState::Expired;
                record.status.updated_at = now_ms;
            }
            info!(task = %task_id, "pending task expired");
            self.record_event(EventKind::TaskExpired, &task_id);
        }
    }
}
