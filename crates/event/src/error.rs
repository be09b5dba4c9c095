//! Event model errors

use thiserror::Error;

/// Errors from event operations
#[derive(Debug, Error)]
pub enum EventError {
    /// The key is empty or malformed (empty segment, illegal character)
    #[error("invalid key \"{key}\": {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventError {
    pub(crate) fn invalid_key(key: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason,
        }
    }
}
