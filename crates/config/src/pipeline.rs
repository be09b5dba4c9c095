//! Pipeline and buffer options

use serde::Deserialize;

use crate::{ConfigError, Result};

/// Options for one pipeline's executor
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of symmetric worker tasks
    pub workers: usize,

    /// Maximum records handed to the processor chain per read
    pub read_batch_size: usize,

    /// How long a worker read waits for a batch to fill, in milliseconds
    pub read_timeout_ms: u64,

    /// Source polling delay, in milliseconds
    pub delay: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            read_batch_size: 128,
            read_timeout_ms: 1000,
            delay: 3000,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ConfigError::new("workers", "must be at least 1"));
        }
        if self.read_batch_size == 0 {
            return Err(ConfigError::new("read_batch_size", "must be at least 1"));
        }
        Ok(())
    }
}

/// Options for a pipeline's bounded buffer
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    /// Maximum un-checkpointed records
    pub buffer_size: usize,

    /// Read batch threshold
    pub batch_size: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_size: 512,
            batch_size: 128,
        }
    }
}

impl BufferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(ConfigError::new("buffer_size", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::new("batch_size", "must be at least 1"));
        }
        if self.batch_size > self.buffer_size {
            return Err(ConfigError::new(
                "batch_size",
                "cannot exceed buffer_size",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 1);
        assert_eq!(config.read_batch_size, 128);
        assert_eq!(config.read_timeout_ms, 1000);
        assert_eq!(config.delay, 3000);

        let buffer = BufferConfig::default();
        assert_eq!(buffer.buffer_size, 512);
        assert_eq!(buffer.batch_size, 128);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"workers": 4}"#).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.read_batch_size, 128);
    }

    #[test]
    fn validation_rejects_zero_and_oversized() {
        let mut config = BufferConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = BufferConfig::default();
        config.batch_size = config.buffer_size + 1;
        assert!(config.validate().is_err());
    }
}
