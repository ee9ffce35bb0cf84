//! Content digests for consensus proposals.

/// Hex-encoded BLAKE3 digest of arbitrary bytes.
pub fn digest_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let a = digest_hex(b"payload");
        assert_eq!(a, digest_hex(b"payload"));
        assert_ne!(a, digest_hex(b"payload2"));
        assert_eq!(a.len(), 64);
    }
}
