//! Error types for pipeline operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task {task_id} is not awaiting supplementary verification (state: {state})")]
    InvalidState { task_id: String, state: &'static str },

    #[error("Task {0} has fewer than two original proofs")]
    InsufficientProofs(String),
}
