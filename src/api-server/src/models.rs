use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use veriqos_core::TaskStatus;
use veriqos_network::ConnectionStats;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Node status response.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusResponse {
    pub node_id: String,
    pub is_leader: bool,
    pub pbft_state: String,
    pub connections: ConnectionsModel,
}

/// Transport connection summary.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionsModel {
    pub total: usize,
    pub connected: usize,
    pub peers: Vec<PeerModel>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeerModel {
    pub node_id: String,
    pub connected: bool,
}

impl From<ConnectionStats> for ConnectionsModel {
    fn from(stats: ConnectionStats) -> Self {
        Self {
            total: stats.total,
            connected: stats.connected,
            peers: stats
                .peers
                .into_iter()
                .map(|p| PeerModel {
                    node_id: p.node_id,
                    connected: p.connected,
                })
                .collect(),
        }
    }
}

/// Accepted-proof acknowledgement.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProofAcceptedResponse {
    pub message: String,
    pub task_id: String,
}

/// Batch submission acknowledgement.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchResponse {
    pub message: String,
    pub results: Vec<BatchResult>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub task_id: String,
    pub status: BatchItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BatchItemStatus {
    Accepted,
    Rejected,
    Failed,
}

/// Per-task status as served on the query surface.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub task_id: String,
    /// Human-readable state tag, e.g. `in_consensus`.
    pub state: String,
    pub proof_count: usize,
    pub verifier_ids: Vec<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub conflict_info: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
}

impl From<TaskStatus> for TaskStatusResponse {
    fn from(status: TaskStatus) -> Self {
        Self {
            task_id: status.task_id.clone(),
            state: status.state.as_tag().to_string(),
            proof_count: status.proof_count,
            verifier_ids: status.verifier_ids.clone(),
            created_at: status.created_at,
            updated_at: status.updated_at,
            conflict_info: status
                .validation_info
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            result: status
                .result
                .as_ref()
                .and_then(|r| serde_json::to_value(r).ok()),
        }
    }
}

/// Error body shape shared by all non-2xx responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}
