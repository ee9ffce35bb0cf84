//! # VeriQoS Validator
//!
//! Pure validation of QoS attestations: per-proof quick checks,
//! cross-attestation deep checks, conflict classification, and
//! conflict resolution with a supplementary attestation.
//!
//! Everything here is deterministic and side-effect-free; the only
//! injected collaborator is the signature-verification adapter.

pub mod deep;
pub mod quick;
pub mod resolve;

pub use deep::{classify_conflict, deep_validate, ConflictReason, DeepValidation};
pub use quick::{quick_validate, QuickValidation};
pub use resolve::{resolve_with_supplementary, ResolvedBy, Resolution};
