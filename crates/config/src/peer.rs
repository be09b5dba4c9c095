//! Peer forwarder options

use serde::Deserialize;

use crate::{ConfigError, Result};

/// How peers are discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Single-node deployment; nothing is ever forwarded
    #[default]
    LocalNode,

    /// Fixed endpoint list from `static_endpoints`
    Static,

    /// Endpoints resolved from a DNS name at startup
    Dns,

    /// AWS Cloud Map service discovery
    AwsCloudMap,
}

/// Options for cross-node event partitioning
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PeerForwarderConfig {
    /// Peer discovery mode
    pub discovery_mode: DiscoveryMode,

    /// Peer endpoints for `static` discovery, including this node
    pub static_endpoints: Vec<String>,

    /// Port the peer-forwarder server listens on
    pub port: u16,

    /// Serve and dial peers over TLS
    pub ssl: bool,

    /// Server certificate path
    pub ssl_certificate_file: Option<String>,

    /// Server key path
    pub ssl_key_file: Option<String>,

    /// Maximum events per outgoing request
    pub target_batch_size: usize,

    /// Linger before an undersized outgoing request is sent, in milliseconds
    pub target_batch_timeout_ms: u64,

    /// Virtual nodes per peer on the hash ring
    pub virtual_nodes_per_peer: usize,

    /// Receive buffer capacity per (pipeline, plugin)
    pub buffer_size: usize,

    /// Receive buffer read batch size
    pub batch_size: usize,
}

impl Default for PeerForwarderConfig {
    fn default() -> Self {
        Self {
            discovery_mode: DiscoveryMode::default(),
            static_endpoints: Vec::new(),
            port: 4994,
            ssl: false,
            ssl_certificate_file: None,
            ssl_key_file: None,
            target_batch_size: 48,
            target_batch_timeout_ms: 3000,
            virtual_nodes_per_peer: 128,
            buffer_size: 512,
            batch_size: 48,
        }
    }
}

impl PeerForwarderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.discovery_mode == DiscoveryMode::Static && self.static_endpoints.is_empty() {
            return Err(ConfigError::new(
                "static_endpoints",
                "static discovery requires at least one endpoint",
            ));
        }
        if self.ssl && (self.ssl_certificate_file.is_none() || self.ssl_key_file.is_none()) {
            return Err(ConfigError::new(
                "ssl",
                "ssl requires certificate and key files",
            ));
        }
        if self.virtual_nodes_per_peer == 0 {
            return Err(ConfigError::new(
                "virtual_nodes_per_peer",
                "must be at least 1",
            ));
        }
        if self.target_batch_size == 0 {
            return Err(ConfigError::new("target_batch_size", "must be at least 1"));
        }
        Ok(())
    }
}
