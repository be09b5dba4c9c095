//! Peer-forwarder registration
//!
//! The provider owns the hash ring, the shared client, and the receive
//! buffer registry. Each stateful processor registers once per
//! (pipeline, plugin) and receives either a remote forwarder or the local
//! short-circuit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use sluice_config::{DiscoveryMode, PeerForwarderConfig};
use sluice_pipeline::{BlockingBuffer, PeerForwarder};

use crate::client::PeerClient;
use crate::forwarder::{LocalPeerForwarder, RemotePeerForwarder};
use crate::{HashRing, PeerError, Result};

/// Two-level lookup of receive buffers by (pipeline, plugin)
#[derive(Default)]
pub struct ReceiveBufferRegistry {
    buffers: RwLock<HashMap<(String, String), Arc<BlockingBuffer>>>,
}

impl ReceiveBufferRegistry {
    pub fn get(&self, pipeline: &str, plugin: &str) -> Option<Arc<BlockingBuffer>> {
        self.buffers
            .read()
            .get(&(pipeline.to_string(), plugin.to_string()))
            .cloned()
    }

    fn insert(
        &self,
        pipeline: &str,
        plugin: &str,
        buffer: Arc<BlockingBuffer>,
    ) -> Result<()> {
        let key = (pipeline.to_string(), plugin.to_string());
        let mut buffers = self.buffers.write();
        if buffers.contains_key(&key) {
            return Err(PeerError::AlreadyRegistered {
                pipeline: pipeline.to_string(),
                plugin: plugin.to_string(),
            });
        }
        buffers.insert(key, buffer);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }
}

/// Creates forwarders and their receive buffers
pub struct PeerForwarderProvider {
    config: PeerForwarderConfig,
    client: Arc<PeerClient>,
    registry: Arc<ReceiveBufferRegistry>,
    ring: Option<Arc<HashRing>>,
    local_endpoint: String,
}

impl std::fmt::Debug for PeerForwarderProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerForwarderProvider")
            .field("local_endpoint", &self.local_endpoint)
            .field("peer_forwarding_required", &self.ring.is_some())
            .finish()
    }
}

impl PeerForwarderProvider {
    /// Build a provider for this node
    ///
    /// `local_endpoint` is this node's own entry in the peer list; events
    /// hashing to it are processed in place.
    pub async fn new(config: PeerForwarderConfig, local_endpoint: impl Into<String>) -> Result<Self> {
        let endpoints = match config.discovery_mode {
            DiscoveryMode::LocalNode => Vec::new(),
            DiscoveryMode::Static => config.static_endpoints.clone(),
            DiscoveryMode::Dns => resolve_endpoints(&config.static_endpoints).await?,
            DiscoveryMode::AwsCloudMap => {
                // needs a credential provider, which is an external collaborator
                return Err(PeerError::UnsupportedDiscovery("aws_cloud_map"));
            }
        };

        let ring = (endpoints.len() > 1)
            .then(|| Arc::new(HashRing::new(endpoints, config.virtual_nodes_per_peer)));

        let client = Arc::new(PeerClient::new(
            config.port,
            Duration::from_millis(config.target_batch_timeout_ms),
        )?);

        Ok(Self {
            config,
            client,
            registry: Arc::new(ReceiveBufferRegistry::default()),
            ring,
            local_endpoint: local_endpoint.into(),
        })
    }

    /// The registry shared with the peer-forwarder server
    pub fn registry(&self) -> Arc<ReceiveBufferRegistry> {
        Arc::clone(&self.registry)
    }

    /// True when events can actually leave this node
    pub fn is_peer_forwarding_required(&self) -> bool {
        self.ring.is_some()
    }

    /// Register a stateful processor's forwarder
    ///
    /// Creates the receive buffer either way; returns the local
    /// short-circuit when no peers are configured.
    pub fn register(
        &self,
        pipeline_name: &str,
        plugin_id: &str,
        identification_keys: Vec<String>,
    ) -> Result<Arc<dyn PeerForwarder>> {
        let buffer = Arc::new(BlockingBuffer::new(
            self.config.buffer_size,
            self.config.batch_size,
        ));
        self.registry.insert(pipeline_name, plugin_id, Arc::clone(&buffer))?;

        match &self.ring {
            Some(ring) => {
                tracing::info!(
                    pipeline = %pipeline_name,
                    plugin = %plugin_id,
                    peers = ring.len(),
                    keys = ?identification_keys,
                    "remote peer forwarder registered"
                );
                Ok(Arc::new(RemotePeerForwarder::new(
                    Arc::clone(&self.client),
                    Arc::clone(ring),
                    buffer,
                    pipeline_name.to_string(),
                    plugin_id.to_string(),
                    identification_keys,
                    self.local_endpoint.clone(),
                    self.config.target_batch_size,
                )))
            }
            None => {
                tracing::info!(
                    pipeline = %pipeline_name,
                    plugin = %plugin_id,
                    "local peer forwarder registered"
                );
                Ok(Arc::new(LocalPeerForwarder))
            }
        }
    }
}

/// Resolve DNS names once at startup, keeping the resolved address stable
///
/// A `host:port` entry keeps its port; a bare host resolves to an address
/// that later gets the configured port appended by the client.
async fn resolve_endpoints(names: &[String]) -> Result<Vec<String>> {
    let mut endpoints = Vec::with_capacity(names.len());
    for name in names {
        let has_port = name.contains(':');
        let target = if has_port {
            name.clone()
        } else {
            // lookup_host needs a port; the placeholder is stripped below
            format!("{name}:0")
        };
        let mut addrs = tokio::net::lookup_host(&target)
            .await
            .map_err(|e| PeerError::Resolve {
                endpoint: name.clone(),
                reason: e.to_string(),
            })?;
        match addrs.next() {
            Some(addr) if has_port => endpoints.push(addr.to_string()),
            Some(addr) => endpoints.push(addr.ip().to_string()),
            None => {
                return Err(PeerError::Resolve {
                    endpoint: name.clone(),
                    reason: "no addresses".to_string(),
                })
            }
        }
    }
    Ok(endpoints)
}
