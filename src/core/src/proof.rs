//! QoS attestation data model.
//!
//! A [`QoSProof`] is one external verifier's signed claim about the quality
//! of a media-transcoding task. Proofs cross the HTTP ingress and the
//! inter-node transport as camelCase JSON, so every struct here pins its
//! wire names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Media parameters the verifier observed on the transcoded output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaSpecs {
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub bitrate: f64,
    pub has_audio: bool,
}

impl MediaSpecs {
    /// Resolution rendered as `WIDTHxHEIGHT`, the form used in conflict
    /// tallies and operator-facing details.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Overall and per-GOP video quality measurements.
///
/// GOP scores stay stringly keyed and valued exactly as verifiers submit
/// them; committee nodes compare them byte-for-byte, never numerically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoQualityData {
    pub overall_score: f64,
    #[serde(default)]
    pub gop_scores: BTreeMap<String, String>,
}

/// Audio quality measurements, present when the task output carries audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioQualityData {
    pub overall_score: f64,
}

/// Resolution summary attached to the final-round consensus payload after
/// a conflict has been adjudicated with a supplementary attestation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryInfo {
    pub supplementary_proof_id: String,
    pub resolved_by: String,
    pub reliable_verifiers: Vec<String>,
    pub unreliable_verifiers: Vec<String>,
}

/// One verifier's signed QoS attestation. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QoSProof {
    pub task_id: String,
    pub verifier_id: String,
    /// Milliseconds since the Unix epoch, stamped by the verifier.
    pub timestamp: i64,
    pub media_specs: MediaSpecs,
    pub video_quality_data: VideoQualityData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_quality_data: Option<AudioQualityData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_quality_data: Option<serde_json::Value>,
    pub signature: String,
    /// Engine-assigned identifier; supplementary proofs without one get a
    /// synthetic id at ingestion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplementary_info: Option<SupplementaryInfo>,
}

impl QoSProof {
    /// Canonical bytes a verifier signs: the proof serialized with the
    /// signature and engine-assigned fields blanked. `gop_scores` is a
    /// BTreeMap, so serialization order is deterministic.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut unsigned = self.clone();
        unsigned.signature = String::new();
        unsigned.id = None;
        unsigned.supplementary_info = None;
        serde_json::to_vec(&unsigned).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_proof() -> QoSProof {
        QoSProof {
            task_id: "task-A".into(),
            verifier_id: "v1".into(),
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
                gop_scores: BTreeMap::from([("0".to_string(), "86.2".to_string())]),
            },
            audio_quality_data: Some(AudioQualityData { overall_score: 92.0 }),
            sync_quality_data: None,
            signature: "sig-v1".into(),
            id: None,
            supplementary_info: None,
        }
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = serde_json::to_value(sample_proof()).unwrap();
        assert!(json.get("taskId").is_some());
        assert!(json.get("verifierId").is_some());
        assert!(json["mediaSpecs"].get("hasAudio").is_some());
        assert!(json["videoQualityData"].get("overallScore").is_some());
        assert!(json["videoQualityData"].get("gopScores").is_some());
        // Absent optionals are omitted entirely, not serialized as null.
        assert!(json.get("syncQualityData").is_none());
        assert!(json.get("supplementaryInfo").is_none());
    }

    #[test]
    fn signing_bytes_exclude_signature_and_assigned_id() {
        let mut a = sample_proof();
        let mut b = sample_proof();
        b.signature = "different".into();
        b.id = Some("engine-assigned".into());
        assert_eq!(a.signing_bytes(), b.signing_bytes());
        a.media_specs.codec = "H.265".into();
        assert_ne!(a.signing_bytes(), b.signing_bytes());
    }

    #[test]
    fn resolution_format() {
        assert_eq!(sample_proof().media_specs.resolution(), "1920x1080");
    }
}
