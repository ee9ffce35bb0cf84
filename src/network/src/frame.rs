//! Wire envelopes.
//!
//! Control frames and consensus messages share one JSON `type` tag
//! namespace; [`WireFrame`] tries the control variants first and falls
//! through to the consensus sum.

use serde::{Deserialize, Serialize};
use veriqos_consensus::ConsensusMessage;

/// Connection-management frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlFrame {
    /// First frame after connect: identifies the dialing node.
    #[serde(rename = "IDENT")]
    Ident {
        #[serde(rename = "nodeId")]
        node_id: String,
    },
    /// Cooperative close.
    #[serde(rename = "DISCONNECT")]
    Disconnect,
}

/// Any frame crossing the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireFrame {
    Control(ControlFrame),
    Consensus(Box<ConsensusMessage>),
}

impl WireFrame {
    pub fn ident(node_id: impl Into<String>) -> Self {
        WireFrame::Control(ControlFrame::Ident {
            node_id: node_id.into(),
        })
    }

    pub fn disconnect() -> Self {
        WireFrame::Control(ControlFrame::Disconnect)
    }
}

impl From<ConsensusMessage> for WireFrame {
    fn from(message: ConsensusMessage) -> Self {
        WireFrame::Consensus(Box::new(message))
    }
}
