//! Algebraic laws of the validator, checked over generated inputs.

use proptest::prelude::*;
use std::collections::BTreeMap;
use veriqos_core::{MediaSpecs, QoSProof, VideoQualityData};
use veriqos_crypto::ProofVerifier;
use veriqos_validator::{deep_validate, quick_validate, resolve_with_supplementary};

struct AcceptAll;

impl ProofVerifier for AcceptAll {
    fn verify_attestation(&self, _: &str, _: &[u8], _: &str) -> bool {
        true
    }
}

const NOW: i64 = 1_700_000_000_000;

fn proof(verifier: &str, bitrate: f64, score: f64, timestamp: i64) -> QoSProof {
    QoSProof {
        task_id: "task-A".into(),
        verifier_id: verifier.into(),
        timestamp,
        media_specs: MediaSpecs {
            codec: "H.264".into(),
            width: 1920,
            height: 1080,
            bitrate,
            has_audio: false,
        },
        video_quality_data: VideoQualityData {
            overall_score: score,
            gop_scores: BTreeMap::from([("0".into(), "86.2".into())]),
        },
        audio_quality_data: None,
        sync_quality_data: None,
        signature: "sig".into(),
        id: None,
        supplementary_info: None,
    }
}

proptest! {
    /// Quick validation is idempotent: re-running it never changes the
    /// verdict.
    #[test]
    fn quick_validate_is_idempotent(
        bitrate in -1_000.0..100_000.0f64,
        score in -10.0..110.0f64,
        age_ms in 0i64..20 * 24 * 60 * 60 * 1000,
    ) {
        let p = proof("v1", bitrate, score, NOW - age_ms);
        let first = quick_validate(&p, NOW, &AcceptAll);
        let second = quick_validate(&p, NOW, &AcceptAll);
        prop_assert_eq!(first, second);
    }

    /// Deep validation of identical proofs always passes, regardless of
    /// the shared values.
    #[test]
    fn identical_proofs_never_conflict(
        bitrate in 1.0..100_000.0f64,
        score in 0.0..100.0f64,
        n in 2usize..6,
    ) {
        let proofs: Vec<QoSProof> = (0..n)
            .map(|i| proof(&format!("v{}", i), bitrate, score, NOW))
            .collect();
        let result = deep_validate(&proofs);
        prop_assert!(result.valid, "identical proofs flagged: {}", result.details);
    }

    /// The resolver is a pure function: same inputs, same resolution.
    #[test]
    fn resolver_is_deterministic(
        a in 1.0..50_000.0f64,
        b in 1.0..50_000.0f64,
        supp in 1.0..50_000.0f64,
    ) {
        let originals = vec![proof("v1", a, 85.0, NOW), proof("v2", b, 85.0, NOW)];
        let prior = deep_validate(&originals);
        prop_assume!(prior.has_conflict);

        let supplementary = proof("v3", supp, 85.0, NOW);
        let first = resolve_with_supplementary(&originals, &supplementary, &prior);
        let second = resolve_with_supplementary(&originals, &supplementary, &prior);
        prop_assert_eq!(first, second);
    }

    /// Statistical resolution always marks exactly one verifier
    /// unreliable out of the three.
    #[test]
    fn statistical_resolution_partitions_verifiers(
        a in 1.0..50_000.0f64,
        b in 1.0..50_000.0f64,
        supp in 1.0..50_000.0f64,
    ) {
        let originals = vec![proof("v1", a, 85.0, NOW), proof("v2", b, 85.0, NOW)];
        let prior = deep_validate(&originals);
        prop_assume!(prior.has_conflict);

        let supplementary = proof("v3", supp, 85.0, NOW);
        let resolution = resolve_with_supplementary(&originals, &supplementary, &prior);
        prop_assert!(resolution.valid);
        prop_assert_eq!(resolution.reliable_verifiers.len(), 2);
        prop_assert_eq!(resolution.unreliable_verifiers.len(), 1);
    }
}
