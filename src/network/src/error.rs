//! Error types for transport operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Invalid peer specification '{0}', expected nodeId:host:port")]
    InvalidPeerSpec(String),

    #[error("Bind failed on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}
