//! Internal per-task record.

use veriqos_consensus::ConsensusType;
use veriqos_core::{QoSProof, TaskStatus};
use veriqos_validator::DeepValidation;

/// Everything a node tracks for one task: the externally visible status
/// plus the stored attestations and consensus bookkeeping.
#[derive(Debug)]
pub struct TaskRecord {
    pub status: TaskStatus,
    pub proofs: Vec<QoSProof>,
    pub supplementary_proofs: Vec<QoSProof>,
    pub consensus_type: ConsensusType,
    /// Deep-validation result saved when a conflict was detected; the
    /// resolver needs it to know which field is disputed.
    pub deep_result: Option<DeepValidation>,
    /// Deadline for the supplementary attestation, set when a conflict
    /// consensus lands the task in `AwaitingSupplementary`.
    pub supplementary_deadline: Option<i64>,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            status: TaskStatus::new(task_id, now_ms),
            proofs: Vec::new(),
            supplementary_proofs: Vec::new(),
            consensus_type: ConsensusType::Normal,
            deep_result: None,
            supplementary_deadline: None,
        }
    }

    pub fn has_verifier(&self, verifier_id: &str) -> bool {
        self.status
            .verifier_ids
            .iter()
            .any(|v| v == verifier_id)
    }

    pub fn has_supplementary_proof(&self, proof_id: &str) -> bool {
        self.supplementary_proofs
            .iter()
            .any(|p| p.id.as_deref() == Some(proof_id))
    }
}
