//! Per-proof quick validation.

use veriqos_core::QoSProof;
use veriqos_crypto::ProofVerifier;

/// Maximum accepted attestation age.
pub const MAX_PROOF_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Outcome of quick validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickValidation {
    pub valid: bool,
    pub details: String,
}

impl QuickValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            details: "ok".into(),
        }
    }

    fn fail(details: impl Into<String>) -> Self {
        Self {
            valid: false,
            details: details.into(),
        }
    }
}

/// Validate a single attestation. Checks run in a fixed order and the
/// first failure wins:
///
/// 1. structure (required fields, score is a number)
/// 2. ranges (score 0..=100, positive bitrate)
/// 3. timestamp (not in the future, at most seven days old)
/// 4. signature (non-empty, then the verification adapter)
/// 5. non-empty GOP scores
pub fn quick_validate(
    proof: &QoSProof,
    now_ms: i64,
    verifier: &dyn ProofVerifier,
) -> QuickValidation {
    // 1. Structure
    if proof.task_id.is_empty() {
        return QuickValidation::fail("missing required field: taskId");
    }
    if proof.verifier_id.is_empty() {
        return QuickValidation::fail("missing required field: verifierId");
    }
    if proof.timestamp <= 0 {
        return QuickValidation::fail("missing required field: timestamp");
    }
    if proof.media_specs.codec.is_empty() {
        return QuickValidation::fail("missing required field: mediaSpecs.codec");
    }
    if !proof.video_quality_data.overall_score.is_finite() {
        return QuickValidation::fail("videoQualityData.overallScore is not a number");
    }

    // 2. Ranges
    let score = proof.video_quality_data.overall_score;
    if !(0.0..=100.0).contains(&score) {
        return QuickValidation::fail(format!("overall score {} out of range 0-100", score));
    }
    if proof.media_specs.bitrate <= 0.0 {
        return QuickValidation::fail("bitrate must be positive");
    }

    // 3. Time
    if proof.timestamp > now_ms {
        return QuickValidation::fail("timestamp is in the future");
    }
    if now_ms - proof.timestamp > MAX_PROOF_AGE_MS {
        return QuickValidation::fail("timestamp older than 7 days");
    }

    // 4. Signature
    if proof.signature.is_empty() {
        return QuickValidation::fail("signature is empty");
    }
    if !verifier.verify_attestation(&proof.verifier_id, &proof.signing_bytes(), &proof.signature) {
        return QuickValidation::fail("signature verification failed");
    }

    // 5. GOP scores
    if proof.video_quality_data.gop_scores.is_empty() {
        return QuickValidation::fail("gopScores is empty");
    }

    QuickValidation::ok()
}
