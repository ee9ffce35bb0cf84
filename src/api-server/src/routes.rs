//! Route definitions with OpenAPI documentation.

use crate::{handlers, state::AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI documentation configuration
#[derive(OpenApi)]
#[openapi(
    info(
        title = "VeriQoS Committee Node API",
        version = "0.1.0",
        description = "Attestation ingress and task-status surface of a VeriQoS committee node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    paths(
        handlers::health_check,
        handlers::node_status,
        handlers::submit_proof,
        handlers::submit_proof_batch,
        handlers::submit_supplementary,
        handlers::task_status,
        handlers::metrics,
    ),
    components(
        schemas(
            crate::models::HealthResponse,
            crate::models::NodeStatusResponse,
            crate::models::ConnectionsModel,
            crate::models::PeerModel,
            crate::models::ProofAcceptedResponse,
            crate::models::BatchResponse,
            crate::models::BatchResult,
            crate::models::BatchItemStatus,
            crate::models::TaskStatusResponse,
            crate::models::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health and monitoring"),
        (name = "status", description = "Node status and metrics"),
        (name = "proofs", description = "Attestation submission and task queries"),
    )
)]
pub struct ApiDoc;

/// Build the committee node's HTTP router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::node_status))
        .route("/metrics", get(handlers::metrics))
        .route("/proof", post(handlers::submit_proof))
        .route("/proofs/batch", post(handlers::submit_proof_batch))
        .route(
            "/proof/:task_id/supplementary",
            post(handlers::submit_supplementary),
        )
        .route("/proof/:task_id/status", get(handlers::task_status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
