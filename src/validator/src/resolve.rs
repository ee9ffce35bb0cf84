//! Conflict resolution with a supplementary attestation.

use crate::deep::{classify_conflict, ConflictReason, DeepValidation};
use std::collections::HashMap;
use veriqos_core::{ConflictType, QoSProof};

/// Strategy that settled the conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Majority,
    Statistical,
    Manual,
}

impl ResolvedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedBy::Majority => "majority",
            ResolvedBy::Statistical => "statistical",
            ResolvedBy::Manual => "manual",
        }
    }
}

/// Outcome of resolving a conflict with a supplementary attestation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub valid: bool,
    pub resolved_by: ResolvedBy,
    pub majority_value: Option<String>,
    pub median_value: Option<f64>,
    pub reliable_verifiers: Vec<String>,
    pub unreliable_verifiers: Vec<String>,
    pub needs_manual_review: bool,
}

impl Resolution {
    fn manual() -> Self {
        Self {
            valid: false,
            resolved_by: ResolvedBy::Manual,
            majority_value: None,
            median_value: None,
            reliable_verifiers: Vec::new(),
            unreliable_verifiers: Vec::new(),
            needs_manual_review: true,
        }
    }
}

/// Resolve a previously detected conflict using a supplementary proof.
///
/// Structural conflicts are settled by majority over the disputed field;
/// score conflicts statistically, by distance from the median. Pure
/// function of its inputs.
pub fn resolve_with_supplementary(
    originals: &[QoSProof],
    supplementary: &QoSProof,
    prior: &DeepValidation,
) -> Resolution {
    let Some(reason) = &prior.conflict else {
        return Resolution::manual();
    };

    match classify_conflict(prior) {
        ConflictType::Score => resolve_statistical(originals, supplementary, reason),
        _ => resolve_majority(originals, supplementary, reason),
    }
}

/// The disputed field rendered for tallying, per conflict reason.
fn structural_field(proof: &QoSProof, reason: &ConflictReason) -> Option<String> {
    match reason {
        ConflictReason::CodecMismatch => Some(proof.media_specs.codec.clone()),
        ConflictReason::ResolutionMismatch => Some(proof.media_specs.resolution()),
        ConflictReason::HasAudioMismatch => Some(proof.media_specs.has_audio.to_string()),
        ConflictReason::GopScoreMismatch { gop } => {
            proof.video_quality_data.gop_scores.get(gop).cloned()
        }
        ConflictReason::MissingAudioData => Some(proof.audio_quality_data.is_some().to_string()),
        ConflictReason::AudioScoreMismatch => proof
            .audio_quality_data
            .as_ref()
            .map(|a| a.overall_score.to_string()),
        // Score reasons never reach the structural path.
        ConflictReason::BitrateDeviation | ConflictReason::VideoScoreDeviation => None,
    }
}

fn numeric_field(proof: &QoSProof, reason: &ConflictReason) -> f64 {
    match reason {
        ConflictReason::BitrateDeviation => proof.media_specs.bitrate,
        _ => proof.video_quality_data.overall_score,
    }
}

fn resolve_majority(
    originals: &[QoSProof],
    supplementary: &QoSProof,
    reason: &ConflictReason,
) -> Resolution {
    let all: Vec<&QoSProof> = originals.iter().chain(std::iter::once(supplementary)).collect();

    let mut tally: HashMap<String, usize> = HashMap::new();
    for proof in &all {
        if let Some(value) = structural_field(proof, reason) {
            *tally.entry(value).or_insert(0) += 1;
        }
    }

    let Some(max_count) = tally.values().copied().max() else {
        return Resolution::manual();
    };
    let leaders: Vec<&String> = tally
        .iter()
        .filter(|(_, count)| **count == max_count)
        .map(|(value, _)| value)
        .collect();

    // A usable majority is a unique plurality backed by at least two
    // attestations.
    if max_count < 2 || leaders.len() != 1 {
        return Resolution::manual();
    }
    let majority = leaders[0].clone();

    let mut reliable = Vec::new();
    let mut unreliable = Vec::new();
    for proof in &all {
        if structural_field(proof, reason).as_deref() == Some(majority.as_str()) {
            reliable.push(proof.verifier_id.clone());
        } else {
            unreliable.push(proof.verifier_id.clone());
        }
    }

    Resolution {
        valid: true,
        resolved_by: ResolvedBy::Majority,
        majority_value: Some(majority),
        median_value: None,
        reliable_verifiers: reliable,
        unreliable_verifiers: unreliable,
        needs_manual_review: false,
    }
}

fn resolve_statistical(
    originals: &[QoSProof],
    supplementary: &QoSProof,
    reason: &ConflictReason,
) -> Resolution {
    let all: Vec<&QoSProof> = originals.iter().chain(std::iter::once(supplementary)).collect();
    let values: Vec<f64> = all.iter().map(|p| numeric_field(p, reason)).collect();

    let mut sorted = values.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if sorted.len() % 2 == 1 {
        sorted[sorted.len() / 2]
    } else {
        let mid = sorted.len() / 2;
        (sorted[mid - 1] + sorted[mid]) / 2.0
    };

    // The single farthest-from-median verifier is unreliable; the rest
    // are reliable, kept in submission order.
    let farthest = values
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            ((*a - median).abs())
                .partial_cmp(&(*b - median).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut reliable = Vec::new();
    let mut unreliable = Vec::new();
    for (i, proof) in all.iter().enumerate() {
        if i == farthest {
            unreliable.push(proof.verifier_id.clone());
        } else {
            reliable.push(proof.verifier_id.clone());
        }
    }

    Resolution {
        valid: true,
        resolved_by: ResolvedBy::Statistical,
        majority_value: None,
        median_value: Some(median),
        reliable_verifiers: reliable,
        unreliable_verifiers: unreliable,
        needs_manual_review: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deep::deep_validate;
    use std::collections::BTreeMap;
    use veriqos_core::{AudioQualityData, MediaSpecs, VideoQualityData};

    fn proof(verifier: &str) -> QoSProof {
        QoSProof {
            task_id: "task-A".into(),
            verifier_id: verifier.into(),
            timestamp: 1_700_000_000_000,
            media_specs: MediaSpecs {
                codec: "H.264".into(),
                width: 1920,
                height: 1080,
                bitrate: 5000.0,
                has_audio: true,
            },
            video_quality_data: VideoQualityData {
                overall_score: 85.5,
                gop_scores: BTreeMap::from([("0".into(), "86.2".into())]),
            },
            audio_quality_data: Some(AudioQualityData { overall_score: 92.0 }),
            sync_quality_data: None,
            signature: "sig".into(),
            id: None,
            supplementary_info: None,
        }
    }

    fn with_codec(verifier: &str, codec: &str) -> QoSProof {
        let mut p = proof(verifier);
        p.media_specs.codec = codec.into();
        p
    }

    fn with_bitrate(verifier: &str, bitrate: f64) -> QoSProof {
        let mut p = proof(verifier);
        p.media_specs.bitrate = bitrate;
        p
    }

    #[test]
    fn codec_majority_resolves() {
        let originals = vec![with_codec("v1", "H.264"), with_codec("v2", "H.265")];
        let supp = with_codec("v3", "H.264");
        let prior = deep_validate(&originals);
        assert!(prior.has_conflict);

        let res = resolve_with_supplementary(&originals, &supp, &prior);
        assert!(res.valid);
        assert_eq!(res.resolved_by, ResolvedBy::Majority);
        assert_eq!(res.majority_value.as_deref(), Some("H.264"));
        assert_eq!(res.reliable_verifiers, vec!["v1", "v3"]);
        assert_eq!(res.unreliable_verifiers, vec!["v2"]);
    }

    #[test]
    fn three_way_codec_split_needs_manual_review() {
        let originals = vec![with_codec("v1", "H.264"), with_codec("v2", "H.265")];
        let supp = with_codec("v3", "VP9");
        let prior = deep_validate(&originals);

        let res = resolve_with_supplementary(&originals, &supp, &prior);
        assert!(!res.valid);
        assert!(res.needs_manual_review);
        assert_eq!(res.resolved_by, ResolvedBy::Manual);
    }

    #[test]
    fn bitrate_resolved_statistically() {
        let originals = vec![with_bitrate("v1", 5000.0), with_bitrate("v2", 6000.0)];
        let supp = with_bitrate("v3", 5100.0);
        let prior = deep_validate(&originals);
        assert!(prior.has_conflict);

        let res = resolve_with_supplementary(&originals, &supp, &prior);
        assert!(res.valid);
        assert_eq!(res.resolved_by, ResolvedBy::Statistical);
        assert_eq!(res.median_value, Some(5100.0));
        assert_eq!(res.reliable_verifiers, vec!["v1", "v3"]);
        assert_eq!(res.unreliable_verifiers, vec!["v2"]);
    }

    #[test]
    fn video_score_resolved_statistically() {
        let mut a = proof("v1");
        let mut b = proof("v2");
        a.video_quality_data.overall_score = 80.0;
        b.video_quality_data.overall_score = 90.0;
        let mut supp = proof("v3");
        supp.video_quality_data.overall_score = 81.0;

        let originals = vec![a, b];
        let prior = deep_validate(&originals);
        assert!(prior.has_conflict);

        let res = resolve_with_supplementary(&originals, &supp, &prior);
        assert!(res.valid);
        assert_eq!(res.median_value, Some(81.0));
        assert_eq!(res.unreliable_verifiers, vec!["v2"]);
    }

    #[test]
    fn gop_conflict_resolved_by_majority_over_that_gop() {
        let mut a = proof("v1");
        let mut b = proof("v2");
        b.video_quality_data.gop_scores.insert("0".into(), "70.0".into());
        let supp = proof("v3"); // agrees with v1 on gop "0"
        a.video_quality_data.gop_scores.insert("0".into(), "86.2".into());

        let originals = vec![a, b];
        let prior = deep_validate(&originals);
        assert_eq!(
            prior.conflict,
            Some(ConflictReason::GopScoreMismatch { gop: "0".into() })
        );

        let res = resolve_with_supplementary(&originals, &supp, &prior);
        assert!(res.valid);
        assert_eq!(res.majority_value.as_deref(), Some("86.2"));
        assert_eq!(res.unreliable_verifiers, vec!["v2"]);
    }

    #[test]
    fn resolver_is_deterministic() {
        let originals = vec![with_codec("v1", "H.264"), with_codec("v2", "H.265")];
        let supp = with_codec("v3", "H.264");
        let prior = deep_validate(&originals);

        let first = resolve_with_supplementary(&originals, &supp, &prior);
        let second = resolve_with_supplementary(&originals, &supp, &prior);
        assert_eq!(first, second);
    }
}
