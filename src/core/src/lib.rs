//! # VeriQoS Core
//!
//! Shared types for the VeriQoS committee: QoS attestations, the per-task
//! state machine, and the event sink every subsystem reports into. This
//! package breaks circular dependencies between the validator, consensus,
//! and pipeline packages.

pub mod events;
pub mod proof;
pub mod task;

pub use events::{Event, EventKind, EventSink, MemoryEventSink, TracingEventSink};
pub use proof::{AudioQualityData, MediaSpecs, QoSProof, SupplementaryInfo, VideoQualityData};
pub use task::{ConflictType, ConsensusResult, TaskState, TaskStatus, ValidationInfo};

/// Committee node identifier (opaque, configured at bootstrap).
pub type NodeId = String;

/// Task identifier as assigned by the transcoding marketplace.
pub type TaskId = String;

/// External verifier identifier, unique per task.
pub type VerifierId = String;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
