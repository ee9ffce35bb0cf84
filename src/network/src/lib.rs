//! # VeriQoS Network
//!
//! Point-to-point framed transport between committee nodes: one
//! length-delimited JSON frame per message over a persistent TCP stream
//! per peer pair. The first frame after connect is an `IDENT` envelope;
//! a `DISCONNECT` envelope is a cooperative close. Every other frame is
//! a consensus or supplementary message.

pub mod error;
pub mod frame;
pub mod transport;

pub use error::{NetworkError, Result};
pub use frame::{ControlFrame, WireFrame};
pub use transport::{ConnectionStats, PeerConfig, PeerStatus, Transport, TransportConfig};
