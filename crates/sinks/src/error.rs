//! Bulk sink errors

use thiserror::Error;

use crate::ClusterError;

/// Errors from the bulk sink
#[derive(Debug, Error)]
pub enum BulkSinkError {
    /// Initialization failed; fatal to pipeline startup
    #[error("bulk sink initialization failed: {0}")]
    Init(String),

    /// An event could not be serialized for indexing
    #[error("event serialization failed: {0}")]
    Serialization(#[from] sluice_event::EventError),

    /// Dead-letter file I/O failed
    #[error("dead-letter write failed: {0}")]
    Dlq(#[from] std::io::Error),

    /// The cluster rejected an administrative request
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl BulkSinkError {
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }
}
