//! Signature scheme abstraction and the Ed25519 implementation.

use crate::error::{CryptoError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// Generic signature scheme trait.
///
/// Everything above this trait treats signing as an opaque primitive; the
/// concrete scheme is chosen once at bootstrap.
pub trait SignatureScheme: Send + Sync {
    /// Sign a message with a private key.
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>>;

    /// Verify a signature with a public key.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool>;

    /// Generate a new keypair (returns `(private_key, public_key)`).
    fn generate_keypair(&self) -> (Vec<u8>, Vec<u8>);
}

/// Ed25519 signature scheme.
pub struct Ed25519Scheme;

impl Ed25519Scheme {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Ed25519Scheme {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureScheme for Ed25519Scheme {
    fn sign(&self, private_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        let bytes: [u8; 32] = private_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Ed25519 private key must be 32 bytes".into()))?;
        let key = SigningKey::from_bytes(&bytes);
        Ok(key.sign(message).to_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
        let bytes: [u8; 32] = public_key
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("Ed25519 public key must be 32 bytes".into()))?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let sig = Signature::from_slice(signature)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        Ok(key.verify(message, &sig).is_ok())
    }

    fn generate_keypair(&self) -> (Vec<u8>, Vec<u8>) {
        let key = SigningKey::generate(&mut OsRng);
        (
            key.to_bytes().to_vec(),
            key.verifying_key().to_bytes().to_vec(),
        )
    }
}
