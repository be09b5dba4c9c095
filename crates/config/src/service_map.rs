//! Service-map processor options

use serde::Deserialize;

use crate::{ConfigError, Result};

/// Options for the windowed span-joining processor
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceMapConfig {
    /// Window rotation interval, in seconds
    pub window_duration_seconds: u64,

    /// Directory holding the on-disk window files
    pub db_path: String,
}

impl Default for ServiceMapConfig {
    fn default() -> Self {
        Self {
            window_duration_seconds: 180,
            db_path: "/tmp/sluice/service-map".to_string(),
        }
    }
}

impl ServiceMapConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_duration_seconds == 0 {
            return Err(ConfigError::new(
                "window_duration_seconds",
                "must be at least 1",
            ));
        }
        if self.db_path.is_empty() {
            return Err(ConfigError::new("db_path", "must not be empty"));
        }
        Ok(())
    }
}
