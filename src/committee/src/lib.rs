//! # VeriQoS Committee
//!
//! The per-node task pipeline: ingests verifier attestations, drives the
//! validator, queues consensus rounds, speaks the supplementary two-stage
//! protocol, and wires the PBFT engine to the transport.
//!
//! Every committee node is a single cooperative event loop: all node
//! state lives behind one mutex, handlers never block while holding it,
//! and outbound messages leave through an unbounded channel the transport
//! drains.

pub mod error;
pub mod pipeline;
pub mod record;

pub use error::{PipelineError, Result};
pub use pipeline::{CommitteeConfig, CommitteeNode, IngestOutcome, Outbound};
pub use record::TaskRecord;
