//! Event recording.
//!
//! The event sink is an injected collaborator: the pipeline and the
//! consensus engine receive it at construction and report protocol
//! milestones through it. Production nodes use the tracing-backed sink;
//! tests use [`MemoryEventSink`] to assert on the recorded sequence.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Protocol milestones recorded by committee nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    ProofReceived,
    ProofRejected,
    DuplicateProof,
    TaskCreated,
    ConsensusStarted,
    ConsensusReachNormal,
    ConsensusReachConflict,
    SupplementaryReceived,
    SupplementaryResolved,
    SupplementaryTimeout,
    TaskExpired,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ProofReceived => "PROOF_RECEIVED",
            EventKind::ProofRejected => "PROOF_REJECTED",
            EventKind::DuplicateProof => "DUPLICATE_PROOF",
            EventKind::TaskCreated => "TASK_CREATED",
            EventKind::ConsensusStarted => "CONSENSUS_STARTED",
            EventKind::ConsensusReachNormal => "CONSENSUS_REACH_NORMAL",
            EventKind::ConsensusReachConflict => "CONSENSUS_REACH_CONFLICT",
            EventKind::SupplementaryReceived => "SUPPLEMENTARY_RECEIVED",
            EventKind::SupplementaryResolved => "SUPPLEMENTARY_RESOLVED",
            EventKind::SupplementaryTimeout => "SUPPLEMENTARY_TIMEOUT",
            EventKind::TaskExpired => "TASK_EXPIRED",
        }
    }
}

/// One recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub node_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, node_id: impl Into<String>) -> Self {
        Self {
            kind,
            node_id: node_id.into(),
            task_id: None,
            timestamp: crate::now_millis(),
            details: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Sink for protocol events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn record_event(&self, event: Event);
}

/// Sink that forwards events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record_event(&self, event: Event) {
        tracing::info!(
            kind = event.kind.as_str(),
            node = %event.node_id,
            task = event.task_id.as_deref().unwrap_or("-"),
            details = event.details.as_deref().unwrap_or(""),
            "event"
        );
    }
}

/// In-memory sink for tests.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<Event>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn kinds_for_task(&self, task_id: &str) -> Vec<EventKind> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.task_id.as_deref() == Some(task_id))
            .map(|e| e.kind)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    fn record_event(&self, event: Event) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemoryEventSink::new();
        sink.record_event(Event::new(EventKind::ProofReceived, "node-1").with_task("t1"));
        sink.record_event(Event::new(EventKind::ConsensusReachNormal, "node-1").with_task("t1"));
        assert_eq!(
            sink.kinds_for_task("t1"),
            vec![EventKind::ProofReceived, EventKind::ConsensusReachNormal]
        );
    }
}
