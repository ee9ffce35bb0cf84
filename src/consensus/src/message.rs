//! Consensus and supplementary message types.
//!
//! Every envelope crossing the inter-node transport is one variant of
//! [`ConsensusMessage`]; handlers match exhaustively so a new variant
//! forces every dispatch site to be revisited.

use crate::{SequenceNumber, ViewNumber};
use serde::{Deserialize, Serialize};
use veriqos_core::QoSProof;

/// Tag distinguishing an ordinary consensus round from one whose success
/// routes the task into supplementary verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusType {
    Normal,
    Conflict,
}

impl ConsensusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusType::Normal => "normal",
            ConsensusType::Conflict => "conflict",
        }
    }
}

/// Every envelope exchanged between committee nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConsensusMessage {
    #[serde(rename = "PRE_PREPARE")]
    PrePrepare(PrePrepare),
    #[serde(rename = "PREPARE")]
    Prepare(Prepare),
    #[serde(rename = "COMMIT")]
    Commit(Commit),
    #[serde(rename = "STATUS_UPDATE")]
    StatusUpdate(StatusUpdate),
    #[serde(rename = "SUPPLEMENTARY_READY")]
    SupplementaryReady(SupplementaryReady),
    #[serde(rename = "SUPPLEMENTARY_ACK")]
    SupplementaryAck(SupplementaryAck),
}

impl ConsensusMessage {
    pub fn message_type(&self) -> &'static str {
        match self {
            ConsensusMessage::PrePrepare(_) => "PRE_PREPARE",
            ConsensusMessage::Prepare(_) => "PREPARE",
            ConsensusMessage::Commit(_) => "COMMIT",
            ConsensusMessage::StatusUpdate(_) => "STATUS_UPDATE",
            ConsensusMessage::SupplementaryReady(_) => "SUPPLEMENTARY_READY",
            ConsensusMessage::SupplementaryAck(_) => "SUPPLEMENTARY_ACK",
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            ConsensusMessage::PrePrepare(m) => &m.task_id,
            ConsensusMessage::Prepare(m) => &m.task_id,
            ConsensusMessage::Commit(m) => &m.task_id,
            ConsensusMessage::StatusUpdate(m) => &m.task_id,
            ConsensusMessage::SupplementaryReady(m) => &m.task_id,
            ConsensusMessage::SupplementaryAck(m) => &m.task_id,
        }
    }

    pub fn node_id(&self) -> &str {
        match self {
            ConsensusMessage::PrePrepare(m) => &m.node_id,
            ConsensusMessage::Prepare(m) => &m.node_id,
            ConsensusMessage::Commit(m) => &m.node_id,
            ConsensusMessage::StatusUpdate(m) => &m.node_id,
            ConsensusMessage::SupplementaryReady(m) => &m.node_id,
            ConsensusMessage::SupplementaryAck(m) => &m.node_id,
        }
    }
}

/// Phase 1: the leader proposes an attestation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrePrepare {
    pub consensus_type: ConsensusType,
    pub view_number: ViewNumber,
    pub sequence_number: SequenceNumber,
    pub node_id: String,
    pub task_id: String,
    pub digest: String,
    pub data: QoSProof,
    pub signature: String,
}

impl PrePrepare {
    pub fn new(
        consensus_type: ConsensusType,
        view_number: ViewNumber,
        sequence_number: SequenceNumber,
        node_id: String,
        task_id: String,
        digest: String,
        data: QoSProof,
    ) -> Self {
        Self {
            consensus_type,
            view_number,
            sequence_number,
            node_id,
            task_id,
            digest,
            data,
            signature: String::new(),
        }
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        signing_bytes(
            "PRE_PREPARE",
            self.consensus_type,
            self.view_number,
            self.sequence_number,
            &self.digest,
        )
    }
}

/// Phase 2: a node acknowledges the proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prepare {
    pub consensus_type: ConsensusType,
    pub view_number: ViewNumber,
    pub sequence_number: SequenceNumber,
    pub node_id: String,
    pub task_id: String,
    pub digest: String,
    pub signature: String,
}

impl Prepare {
    pub fn new(
        consensus_type: ConsensusType,
        view_number: ViewNumber,
        sequence_number: SequenceNumber,
        node_id: String,
        task_id: String,
        digest: String,
    ) -> Self {
        Self {
            consensus_type,
            view_number,
            sequence_number,
            node_id,
            task_id,
            digest,
            signature: String::new(),
        }
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        signing_bytes(
            "PREPARE",
            self.consensus_type,
            self.view_number,
            self.sequence_number,
            &self.digest,
        )
    }
}

/// Phase 3: after 2f+1 prepares, a node votes to commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub consensus_type: ConsensusType,
    pub view_number: ViewNumber,
    pub sequence_number: SequenceNumber,
    pub node_id: String,
    pub task_id: String,
    pub digest: String,
    pub signature: String,
}

impl Commit {
    pub fn new(
        consensus_type: ConsensusType,
        view_number: ViewNumber,
        sequence_number: SequenceNumber,
        node_id: String,
        task_id: String,
        digest: String,
    ) -> Self {
        Self {
            consensus_type,
            view_number,
            sequence_number,
            node_id,
            task_id,
            digest,
            signature: String::new(),
        }
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        signing_bytes(
            "COMMIT",
            self.consensus_type,
            self.view_number,
            self.sequence_number,
            &self.digest,
        )
    }
}

/// Informational broadcast of a task's terminal state; receivers log it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub consensus_type: ConsensusType,
    pub view_number: ViewNumber,
    pub sequence_number: SequenceNumber,
    pub node_id: String,
    pub task_id: String,
    pub digest: String,
    pub signature: String,
}

impl StatusUpdate {
    pub fn new(
        consensus_type: ConsensusType,
        view_number: ViewNumber,
        sequence_number: SequenceNumber,
        node_id: String,
        task_id: String,
        digest: String,
    ) -> Self {
        Self {
            consensus_type,
            view_number,
            sequence_number,
            node_id,
            task_id,
            digest,
            signature: String::new(),
        }
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        signing_bytes(
            "STATUS_UPDATE",
            self.consensus_type,
            self.view_number,
            self.sequence_number,
            &self.digest,
        )
    }
}

/// Leader announcement that a supplementary proof has been accepted and
/// the final round is pending replica readiness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryReady {
    pub consensus_type: ConsensusType,
    pub view_number: ViewNumber,
    pub sequence_number: SequenceNumber,
    pub node_id: String,
    pub task_id: String,
    pub digest: String,
    pub supplementary_proof_id: String,
    pub timestamp: i64,
    pub signature: String,
}

impl SupplementaryReady {
    pub fn new(node_id: String, task_id: String, supplementary_proof_id: String) -> Self {
        Self {
            consensus_type: ConsensusType::Normal,
            view_number: 0,
            sequence_number: 0,
            node_id,
            task_id,
            digest: String::new(),
            supplementary_proof_id,
            timestamp: veriqos_core::now_millis(),
            signature: String::new(),
        }
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = signing_bytes(
            "SUPPLEMENTARY_READY",
            self.consensus_type,
            self.view_number,
            self.sequence_number,
            &self.digest,
        );
        bytes.extend_from_slice(self.supplementary_proof_id.as_bytes());
        bytes
    }
}

/// Follower confirmation that it holds and accepts the supplementary
/// proof named by the leader's readiness announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryAck {
    pub consensus_type: ConsensusType,
    pub view_number: ViewNumber,
    pub sequence_number: SequenceNumber,
    pub node_id: String,
    pub task_id: String,
    pub digest: String,
    pub supplementary_proof_id: String,
    pub timestamp: i64,
    pub signature: String,
}

impl SupplementaryAck {
    pub fn new(node_id: String, task_id: String, supplementary_proof_id: String) -> Self {
        Self {
            consensus_type: ConsensusType::Normal,
            view_number: 0,
            sequence_number: 0,
            node_id,
            task_id,
            digest: String::new(),
            supplementary_proof_id,
            timestamp: veriqos_core::now_millis(),
            signature: String::new(),
        }
    }

    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = signing_bytes(
            "SUPPLEMENTARY_ACK",
            self.consensus_type,
            self.view_number,
            self.sequence_number,
            &self.digest,
        );
        bytes.extend_from_slice(self.supplementary_proof_id.as_bytes());
        bytes
    }
}

/// Canonical signed preimage: message type, consensus type, view,
/// sequence, digest.
fn signing_bytes(
    message_type: &str,
    consensus_type: ConsensusType,
    view: ViewNumber,
    sequence: SequenceNumber,
    digest: &str,
) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(message_type.len() + digest.len() + 24);
    bytes.extend_from_slice(message_type.as_bytes());
    bytes.extend_from_slice(consensus_type.as_str().as_bytes());
    bytes.extend_from_slice(&view.to_le_bytes());
    bytes.extend_from_slice(&sequence.to_le_bytes());
    bytes.extend_from_slice(digest.as_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tag_is_type_field() {
        let prepare = Prepare::new(
            ConsensusType::Normal,
            0,
            1,
            "node-1".into(),
            "task-A".into(),
            "digest".into(),
        );
        let json = serde_json::to_value(ConsensusMessage::Prepare(prepare)).unwrap();
        assert_eq!(json["type"], "PREPARE");
        assert_eq!(json["consensusType"], "normal");
        assert_eq!(json["viewNumber"], 0);
        assert_eq!(json["sequenceNumber"], 1);
    }

    #[test]
    fn signing_bytes_cover_the_slot() {
        let a = Prepare::new(
            ConsensusType::Normal,
            0,
            1,
            "node-1".into(),
            "task-A".into(),
            "digest".into(),
        );
        let mut b = a.clone();
        b.sequence_number = 2;
        assert_ne!(a.signing_bytes(), b.signing_bytes());

        let mut c = a.clone();
        c.consensus_type = ConsensusType::Conflict;
        assert_ne!(a.signing_bytes(), c.signing_bytes());

        // The sender is not part of the preimage; the signature itself
        // binds the key to the message.
        let mut d = a.clone();
        d.node_id = "node-2".into();
        assert_eq!(a.signing_bytes(), d.signing_bytes());
    }
}
