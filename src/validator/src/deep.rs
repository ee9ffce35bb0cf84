//! Cross-attestation deep validation and conflict classification.

use veriqos_core::{ConflictType, QoSProof};

/// Maximum relative bitrate deviation from the mean.
pub const BITRATE_TOLERANCE: f64 = 0.05;

/// Maximum absolute video-score deviation from the mean.
pub const VIDEO_SCORE_TOLERANCE: f64 = 3.0;

/// The specific disagreement deep validation found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    CodecMismatch,
    ResolutionMismatch,
    BitrateDeviation,
    HasAudioMismatch,
    VideoScoreDeviation,
    GopScoreMismatch { gop: String },
    MissingAudioData,
    AudioScoreMismatch,
}

impl ConflictReason {
    pub fn describe(&self) -> String {
        match self {
            ConflictReason::CodecMismatch => "codec mismatch between proofs".into(),
            ConflictReason::ResolutionMismatch => "resolution mismatch between proofs".into(),
            ConflictReason::BitrateDeviation => {
                "bitrate deviates more than 5% from the mean".into()
            }
            ConflictReason::HasAudioMismatch => "hasAudio flag mismatch between proofs".into(),
            ConflictReason::VideoScoreDeviation => {
                "video overall score deviates more than 3 points from the mean".into()
            }
            ConflictReason::GopScoreMismatch { gop } => {
                format!("GOP score mismatch at timestamp {}", gop)
            }
            ConflictReason::MissingAudioData => {
                "audio quality data missing from at least one proof".into()
            }
            ConflictReason::AudioScoreMismatch => "audio overall score mismatch".into(),
        }
    }
}

/// Outcome of deep validation over a set of attestations.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepValidation {
    pub valid: bool,
    pub has_conflict: bool,
    pub conflicting_verifiers: Vec<String>,
    pub conflict: Option<ConflictReason>,
    pub details: String,
}

impl DeepValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            has_conflict: false,
            conflicting_verifiers: Vec::new(),
            conflict: None,
            details: "ok".into(),
        }
    }

    fn conflict(reason: ConflictReason, conflicting: Vec<String>) -> Self {
        let details = reason.describe();
        Self {
            valid: false,
            has_conflict: true,
            conflicting_verifiers: conflicting,
            conflict: Some(reason),
            details,
        }
    }
}

/// Validate a set of at least two attestations against each other.
///
/// Checks run in a fixed order; the first failing check determines the
/// reported conflict. Fewer than two proofs is a failure but not a
/// conflict.
pub fn deep_validate(proofs: &[QoSProof]) -> DeepValidation {
    if proofs.len() < 2 {
        return DeepValidation {
            valid: false,
            has_conflict: false,
            conflicting_verifiers: Vec::new(),
            conflict: None,
            details: "insufficient proofs for deep validation".into(),
        };
    }

    let all_verifiers = || proofs.iter().map(|p| p.verifier_id.clone()).collect();

    // Codec
    let codec = &proofs[0].media_specs.codec;
    if proofs.iter().any(|p| &p.media_specs.codec != codec) {
        return DeepValidation::conflict(ConflictReason::CodecMismatch, all_verifiers());
    }

    // Resolution
    let resolution = proofs[0].media_specs.resolution();
    if proofs.iter().any(|p| p.media_specs.resolution() != resolution) {
        return DeepValidation::conflict(ConflictReason::ResolutionMismatch, all_verifiers());
    }

    // Bitrate within tolerance of the mean
    let mean_bitrate =
        proofs.iter().map(|p| p.media_specs.bitrate).sum::<f64>() / proofs.len() as f64;
    let bitrate_outliers: Vec<String> = proofs
        .iter()
        .filter(|p| (p.media_specs.bitrate - mean_bitrate).abs() > BITRATE_TOLERANCE * mean_bitrate)
        .map(|p| p.verifier_id.clone())
        .collect();
    if !bitrate_outliers.is_empty() {
        return DeepValidation::conflict(ConflictReason::BitrateDeviation, bitrate_outliers);
    }

    // hasAudio agreement
    let has_audio = proofs[0].media_specs.has_audio;
    if proofs.iter().any(|p| p.media_specs.has_audio != has_audio) {
        return DeepValidation::conflict(ConflictReason::HasAudioMismatch, all_verifiers());
    }

    // Video overall score within tolerance of the mean
    let mean_score = proofs
        .iter()
        .map(|p| p.video_quality_data.overall_score)
        .sum::<f64>()
        / proofs.len() as f64;
    let score_outliers: Vec<String> = proofs
        .iter()
        .filter(|p| (p.video_quality_data.overall_score - mean_score).abs() > VIDEO_SCORE_TOLERANCE)
        .map(|p| p.verifier_id.clone())
        .collect();
    if !score_outliers.is_empty() {
        return DeepValidation::conflict(ConflictReason::VideoScoreDeviation, score_outliers);
    }

    // GOP scores common to every proof must agree byte-for-byte
    for (gop, score) in &proofs[0].video_quality_data.gop_scores {
        let common = proofs[1..]
            .iter()
            .all(|p| p.video_quality_data.gop_scores.contains_key(gop));
        if !common {
            continue;
        }
        if proofs[1..]
            .iter()
            .any(|p| p.video_quality_data.gop_scores.get(gop) != Some(score))
        {
            return DeepValidation::conflict(
                ConflictReason::GopScoreMismatch { gop: gop.clone() },
                all_verifiers(),
            );
        }
    }

    // Audio checks apply when the task carries audio
    if has_audio {
        let missing: Vec<String> = proofs
            .iter()
            .filter(|p| p.audio_quality_data.is_none())
            .map(|p| p.verifier_id.clone())
            .collect();
        if !missing.is_empty() {
            return DeepValidation::conflict(ConflictReason::MissingAudioData, missing);
        }

        let audio_score = proofs[0].audio_quality_data.as_ref().map(|a| a.overall_score);
        if proofs.iter().any(|p| {
            p.audio_quality_data.as_ref().map(|a| a.overall_score) != audio_score
        }) {
            return DeepValidation::conflict(ConflictReason::AudioScoreMismatch, all_verifiers());
        }
    }

    DeepValidation::ok()
}

/// Map a deep-validation conflict to its coarse class.
pub fn classify_conflict(result: &DeepValidation) -> ConflictType {
    match &result.conflict {
        Some(ConflictReason::VideoScoreDeviation) | Some(ConflictReason::BitrateDeviation) => {
            ConflictType::Score
        }
        Some(_) => ConflictType::Structural,
        None => ConflictType::Structural,
    }
}
