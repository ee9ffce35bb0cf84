use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use prometheus::{Encoder, TextEncoder};

use crate::{
    error::{ApiError, Result},
    models::*,
    state::AppState,
};
use veriqos_committee::IngestOutcome;
use veriqos_core::QoSProof;

/// Fields a proof submission must carry; checked before deserialization
/// so the 400 body can name the missing field.
const REQUIRED_PROOF_FIELDS: [&str; 6] = [
    "taskId",
    "verifierId",
    "timestamp",
    "mediaSpecs",
    "videoQualityData",
    "signature",
];

fn parse_proof(value: &serde_json::Value) -> Result<QoSProof> {
    let object = value
        .as_object()
        .ok_or_else(|| ApiError::BadRequest("proof must be a JSON object".into()))?;
    for field in REQUIRED_PROOF_FIELDS {
        if !object.contains_key(field) {
            return Err(ApiError::MissingField(field));
        }
    }
    serde_json::from_value(value.clone())
        .map_err(|e| ApiError::BadRequest(format!("malformed proof: {}", e)))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Node status: identity, PBFT phase, and peer connections
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Node status", body = NodeStatusResponse)
    ),
    tag = "status"
)]
pub async fn node_status(State(state): State<AppState>) -> Json<NodeStatusResponse> {
    Json(NodeStatusResponse {
        node_id: state.node.node_id().to_string(),
        is_leader: state.node.is_leader(),
        pbft_state: state.node.pbft_phase_tag().to_string(),
        connections: state.transport.connection_stats().into(),
    })
}

/// Submit one verifier attestation
#[utoipa::path(
    post,
    path = "/proof",
    responses(
        (status = 202, description = "Proof accepted for processing", body = ProofAcceptedResponse),
        (status = 400, description = "Missing required field", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "proofs"
)]
pub async fn submit_proof(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<ProofAcceptedResponse>)> {
    let proof = parse_proof(&body)?;
    let task_id = proof.task_id.clone();

    // Malformed or duplicate proofs are dropped silently by the
    // pipeline; the submission itself is still acknowledged.
    state.node.ingest_proof(proof);

    Ok((
        StatusCode::ACCEPTED,
        Json(ProofAcceptedResponse {
            message: "Proof accepted for processing".to_string(),
            task_id,
        }),
    ))
}

/// Submit a batch of verifier attestations
#[utoipa::path(
    post,
    path = "/proofs/batch",
    responses(
        (status = 202, description = "Batch accepted", body = BatchResponse),
        (status = 400, description = "Body is not a non-empty array", body = ErrorResponse)
    ),
    tag = "proofs"
)]
pub async fn submit_proof_batch(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<BatchResponse>)> {
    let items = body
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| ApiError::BadRequest("body must be a non-empty array of proofs".into()))?;

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        match parse_proof(item) {
            Ok(proof) => {
                let task_id = proof.task_id.clone();
                match state.node.ingest_proof(proof) {
                    IngestOutcome::Accepted { .. } => results.push(BatchResult {
                        task_id,
                        status: BatchItemStatus::Accepted,
                        error: None,
                    }),
                    IngestOutcome::Rejected { reason, .. } => results.push(BatchResult {
                        task_id,
                        status: BatchItemStatus::Rejected,
                        error: Some(reason),
                    }),
                    IngestOutcome::Duplicate { .. } => results.push(BatchResult {
                        task_id,
                        status: BatchItemStatus::Rejected,
                        error: Some("duplicate proof for this verifier".to_string()),
                    }),
                }
            }
            Err(e) => results.push(BatchResult {
                task_id: item
                    .get("taskId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                status: BatchItemStatus::Failed,
                error: Some(e.to_string()),
            }),
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchResponse {
            message: "Batch accepted for processing".to_string(),
            results,
        }),
    ))
}

/// Submit a supplementary attestation for a conflicted task
#[utoipa::path(
    post,
    path = "/proof/{taskId}/supplementary",
    params(
        ("taskId" = String, Path, description = "Task identifier")
    ),
    responses(
        (status = 202, description = "Supplementary proof accepted", body = ProofAcceptedResponse),
        (status = 400, description = "Invalid request or task state", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "proofs"
)]
pub async fn submit_supplementary(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(mut body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<ProofAcceptedResponse>)> {
    // The URL parameter is authoritative for the task identity.
    if let Some(object) = body.as_object_mut() {
        object.insert("taskId".to_string(), serde_json::Value::String(task_id.clone()));
    }
    let proof = parse_proof(&body)?;

    state.node.ingest_supplementary(&task_id, proof)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ProofAcceptedResponse {
            message: "Supplementary proof accepted for processing".to_string(),
            task_id,
        }),
    ))
}

/// Query one task's status
#[utoipa::path(
    get,
    path = "/proof/{taskId}/status",
    params(
        ("taskId" = String, Path, description = "Task identifier")
    ),
    responses(
        (status = 200, description = "Task status", body = TaskStatusResponse),
        (status = 404, description = "Unknown task", body = ErrorResponse)
    ),
    tag = "proofs"
)]
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>> {
    let status = state
        .node
        .task_status(&task_id)
        .ok_or_else(|| ApiError::NotFound(format!("Task {} not found", task_id)))?;
    Ok(Json(status.into()))
}

/// Prometheus metrics in text exposition format
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, description = "Prometheus metrics")
    ),
    tag = "status"
)]
pub async fn metrics(State(state): State<AppState>) -> Result<String> {
    let families = state.node.metrics().registry().gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .map_err(|e| ApiError::Internal(e.into()))?;
    String::from_utf8(buffer).map_err(|e| ApiError::Internal(e.into()))
}
