//! # VeriQoS API Server
//!
//! HTTP ingress for one committee node: accepts verifier attestations
//! (single, batch, supplementary), answers task-status queries, and
//! exposes health, node status, Prometheus metrics, and OpenAPI docs.

pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, Result};
pub use routes::create_router;
pub use server::{Server, ServerConfig};
pub use state::AppState;
