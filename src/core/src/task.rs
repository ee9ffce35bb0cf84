//! Per-task state machine and status records.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a transcoding task on one committee node.
///
/// `Verified` and `Rejected` are reserved: the enum and the HTTP tag map
/// keep them for interoperability, but no code path currently assigns
/// them. `Conflict` is likewise reported through `validation_info` while
/// the task itself moves straight to `AwaitingSupplementary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Validating,
    Verified,
    Consensus,
    Conflict,
    AwaitingSupplementary,
    Validated,
    Finalized,
    Rejected,
    Failed,
    NeedsManualReview,
    Expired,
}

impl TaskState {
    /// Human-readable tag used on the HTTP status surface.
    pub fn as_tag(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Validating => "validating",
            TaskState::Verified => "verified",
            TaskState::Consensus => "in_consensus",
            TaskState::Conflict => "conflict_detected",
            TaskState::AwaitingSupplementary => "awaiting_supplementary_verification",
            TaskState::Validated => "validated",
            TaskState::Finalized => "finalized",
            TaskState::Rejected => "rejected",
            TaskState::Failed => "failed",
            TaskState::NeedsManualReview => "needs_manual_review",
            TaskState::Expired => "expired",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finalized
                | TaskState::Rejected
                | TaskState::Failed
                | TaskState::NeedsManualReview
                | TaskState::Expired
        )
    }
}

/// Kind of disagreement found between attestations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    Structural,
    Score,
    None,
}

/// Validation and conflict bookkeeping carried on a task record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_type: Option<ConflictType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_result: Option<serde_json::Value>,
    #[serde(default)]
    pub supplementary_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplementary_request_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Outcome stamped when consensus finalizes a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsensusResult {
    pub consensus_timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Per-task record held by each committee node.
///
/// Invariants: `proof_count == verifier_ids.len()`, each verifier appears
/// at most once, and `state` only moves along the task state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    pub proof_count: usize,
    pub verifier_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplementary_verifier_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_info: Option<ValidationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ConsensusResult>,
}

impl TaskStatus {
    pub fn new(task_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Pending,
            proof_count: 0,
            verifier_ids: Vec::new(),
            created_at: now_ms,
            updated_at: now_ms,
            supplementary_verifier_ids: None,
            validation_info: None,
            result: None,
        }
    }

    /// Mutable access to `validation_info`, creating it on first use.
    pub fn validation_info_mut(&mut self) -> &mut ValidationInfo {
        self.validation_info.get_or_insert_with(ValidationInfo::default)
    }
}
