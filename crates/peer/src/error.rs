//! Peer-forwarder errors

use thiserror::Error;

/// Errors from peer-forwarder registration and dispatch
#[derive(Debug, Error)]
pub enum PeerError {
    /// Only one peer forwarder may exist per (pipeline, plugin)
    #[error("peer forwarder already registered for pipeline \"{pipeline}\" plugin \"{plugin}\"")]
    AlreadyRegistered { pipeline: String, plugin: String },

    /// The discovery mode needs an external collaborator that is not wired in
    #[error("unsupported discovery mode: {0}")]
    UnsupportedDiscovery(&'static str),

    /// Endpoint resolution failed at startup
    #[error("failed to resolve peer endpoint \"{endpoint}\": {reason}")]
    Resolve { endpoint: String, reason: String },

    /// The request never reached the peer
    #[error("peer request failed: {0}")]
    Network(String),

    /// The peer answered with a non-success status
    #[error("peer returned status {0}")]
    Status(u16),

    /// The receiving node's buffer was full
    #[error("peer receive buffer full")]
    BufferFull,
}
