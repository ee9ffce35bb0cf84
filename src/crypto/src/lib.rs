//! # VeriQoS Crypto
//!
//! Pluggable signature primitive for the committee. Consensus messages and
//! verifier attestations are signed and verified through the
//! [`SignatureScheme`] trait; the shipped implementation is Ed25519. The
//! [`Keyring`] holds this node's keypair plus whatever peer and verifier
//! public keys have been registered.

pub mod digest;
pub mod error;
pub mod keyring;
pub mod signatures;

pub use digest::digest_hex;
pub use error::{CryptoError, Result};
pub use keyring::{Keyring, ProofVerifier};
pub use signatures::{Ed25519Scheme, SignatureScheme};
