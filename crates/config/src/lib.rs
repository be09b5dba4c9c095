//! Sluice configuration types
//!
//! Plain serde structs for every recognized option, with defaults applied
//! field-by-field and a `validate()` method per struct. File parsing is the
//! embedder's concern; these types deserialize from any serde format.

mod error;
mod peer;
mod pipeline;
mod service_map;
mod sink;

pub use error::ConfigError;
pub use peer::{DiscoveryMode, PeerForwarderConfig};
pub use pipeline::{BufferConfig, PipelineConfig};
pub use service_map::ServiceMapConfig;
pub use sink::{BulkAction, BulkSinkConfig, IndexType};

/// Result type for configuration validation
pub type Result<T> = std::result::Result<T, ConfigError>;
