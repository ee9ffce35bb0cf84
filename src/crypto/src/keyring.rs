//! Node keyring: own keypair plus registered peer and verifier keys.

use crate::error::Result;
use crate::signatures::SignatureScheme;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Adapter the validator calls to check a verifier's attestation
/// signature. Kept separate from [`Keyring`]'s consensus-message surface
/// so the validator stays free of committee concerns.
pub trait ProofVerifier: Send + Sync {
    /// Verify an attestation signature from an external verifier.
    fn verify_attestation(&self, verifier_id: &str, payload: &[u8], signature_hex: &str) -> bool;
}

/// Holds this node's keypair and every public key registered so far.
///
/// Peers and verifiers register keys out of band; a signature from an
/// identity with no registered key is accepted when non-empty and logged,
/// so committees can run before key distribution is wired up.
pub struct Keyring {
    scheme: Arc<dyn SignatureScheme>,
    private_key: Vec<u8>,
    public_key: Vec<u8>,
    known_keys: DashMap<String, Vec<u8>>,
}

impl Keyring {
    /// Create a keyring with a freshly generated keypair.
    pub fn generate(scheme: Arc<dyn SignatureScheme>) -> Self {
        let (private_key, public_key) = scheme.generate_keypair();
        Self {
            scheme,
            private_key,
            public_key,
            known_keys: DashMap::new(),
        }
    }

    /// Create a keyring from existing key material.
    pub fn from_keypair(
        scheme: Arc<dyn SignatureScheme>,
        private_key: Vec<u8>,
        public_key: Vec<u8>,
    ) -> Self {
        Self {
            scheme,
            private_key,
            public_key,
            known_keys: DashMap::new(),
        }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Register a public key for a peer node or an external verifier.
    pub fn register_key(&self, identity: impl Into<String>, public_key: Vec<u8>) {
        self.known_keys.insert(identity.into(), public_key);
    }

    /// Sign a message with this node's private key, hex-encoded.
    pub fn sign_hex(&self, message: &[u8]) -> Result<String> {
        let sig = self.scheme.sign(&self.private_key, message)?;
        Ok(hex::encode(sig))
    }

    /// Verify a hex signature claimed by `identity`.
    ///
    /// Empty signatures always fail. If no key is registered for the
    /// identity, the signature is accepted and the gap is logged.
    pub fn verify_hex(&self, identity: &str, message: &[u8], signature_hex: &str) -> bool {
        if signature_hex.is_empty() {
            return false;
        }
        let Some(public_key) = self.known_keys.get(identity) else {
            debug!(identity, "no registered key, accepting signature unverified");
            return true;
        };
        let Ok(sig) = hex::decode(signature_hex) else {
            return false;
        };
        self.scheme
            .verify(&public_key, message, &sig)
            .unwrap_or(false)
    }
}

impl ProofVerifier for Keyring {
    fn verify_attestation(&self, verifier_id: &str, payload: &[u8], signature_hex: &str) -> bool {
        self.verify_hex(verifier_id, payload, signature_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::Ed25519Scheme;

    fn keyring() -> Keyring {
        Keyring::generate(Arc::new(Ed25519Scheme::new()))
    }

    #[test]
    fn own_signature_verifies_when_key_registered() {
        let ring = keyring();
        let sig = ring.sign_hex(b"message").unwrap();

        ring.register_key("self", ring.public_key().to_vec());
        assert!(ring.verify_hex("self", b"message", &sig));
        assert!(!ring.verify_hex("self", b"other", &sig));
    }

    #[test]
    fn empty_signature_always_rejected() {
        let ring = keyring();
        assert!(!ring.verify_hex("anyone", b"message", ""));
    }

    #[test]
    fn unknown_identity_accepted_unverified() {
        let ring = keyring();
        assert!(ring.verify_hex("stranger", b"message", "deadbeef"));
    }

    #[test]
    fn registered_key_rejects_garbage_signature() {
        let ring = keyring();
        ring.register_key("self", ring.public_key().to_vec());
        assert!(!ring.verify_hex("self", b"message", "deadbeef"));
        assert!(!ring.verify_hex("self", b"message", "not-hex!"));
    }
}
