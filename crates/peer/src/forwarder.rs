//! Local and remote peer forwarders
//!
//! The remote forwarder splits each batch by ring placement, dispatches
//! per-peer groups, and hands back the local residue. Events whose
//! identification keys are missing never leave the node. A failed send falls
//! back to local processing after a warning.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sluice_event::{Event, Record};
use sluice_pipeline::{BlockingBuffer, PeerForwarder};

use crate::client::PeerClient;
use crate::wire::{WireEvent, WireRequest};
use crate::{HashRing, KEY_SEPARATOR};

/// Counters for one registered forwarder
#[derive(Debug, Default)]
pub struct ForwarderMetrics {
    /// Records kept on this node (owned here or missing a key)
    pub records_local: AtomicU64,

    /// Records shipped to a peer
    pub records_forwarded: AtomicU64,

    /// Records that fell back to local processing after a failed send
    pub records_failed_forward: AtomicU64,

    /// Records drained from the receive buffer
    pub records_received: AtomicU64,
}

impl ForwarderMetrics {
    /// Get snapshot as (local, forwarded, failed, received)
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.records_local.load(Ordering::Relaxed),
            self.records_forwarded.load(Ordering::Relaxed),
            self.records_failed_forward.load(Ordering::Relaxed),
            self.records_received.load(Ordering::Relaxed),
        )
    }
}

/// Forwarder used when this node owns every key
///
/// Single-node discovery or a one-member ring short-circuits to this.
#[derive(Debug, Default)]
pub struct LocalPeerForwarder;

#[async_trait]
impl PeerForwarder for LocalPeerForwarder {
    async fn forward(&self, records: Vec<Record>) -> Vec<Record> {
        records
    }

    async fn receive(&self) -> Vec<Record> {
        Vec::new()
    }
}

/// Ring-partitioned forwarder with a per-(pipeline, plugin) receive buffer
pub struct RemotePeerForwarder {
    client: Arc<PeerClient>,
    ring: Arc<HashRing>,
    receive_buffer: Arc<BlockingBuffer>,
    pipeline_name: String,
    plugin_id: String,
    identification_keys: Vec<String>,
    local_endpoint: String,
    target_batch_size: usize,
    metrics: ForwarderMetrics,
}

impl RemotePeerForwarder {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client: Arc<PeerClient>,
        ring: Arc<HashRing>,
        receive_buffer: Arc<BlockingBuffer>,
        pipeline_name: String,
        plugin_id: String,
        identification_keys: Vec<String>,
        local_endpoint: String,
        target_batch_size: usize,
    ) -> Self {
        Self {
            client,
            ring,
            receive_buffer,
            pipeline_name,
            plugin_id,
            identification_keys,
            local_endpoint,
            target_batch_size,
            metrics: ForwarderMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &ForwarderMetrics {
        &self.metrics
    }

    /// Concatenated identification-key values, or `None` when any is missing
    fn partition_key(&self, event: &Event) -> Option<String> {
        let mut parts = Vec::with_capacity(self.identification_keys.len());
        for key in &self.identification_keys {
            match event.get(key).ok().flatten() {
                Some(value) => parts.push(value.render()),
                None => return None,
            }
        }
        Some(parts.join(&KEY_SEPARATOR.to_string()))
    }

    async fn dispatch(&self, peer: &str, records: Vec<Record>) -> Result<(), Vec<Record>> {
        // groups are sent sequentially per peer, preserving order for a
        // given (sender, receiver, key)
        for start in (0..records.len()).step_by(self.target_batch_size) {
            let end = (start + self.target_batch_size).min(records.len());
            let group = &records[start..end];
            let request = WireRequest {
                pipeline_name: self.pipeline_name.clone(),
                plugin_id: self.plugin_id.clone(),
                events: group.iter().map(WireEvent::from_record).collect(),
            };
            if let Err(e) = self.client.send(peer, &request).await {
                tracing::warn!(
                    pipeline = %self.pipeline_name,
                    plugin = %self.plugin_id,
                    peer = %peer,
                    error = %e,
                    records = records.len() - start,
                    "peer send failed, processing locally"
                );
                return Err(records[start..].to_vec());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PeerForwarder for RemotePeerForwarder {
    async fn forward(&self, records: Vec<Record>) -> Vec<Record> {
        let mut local = Vec::new();
        let mut per_peer: HashMap<String, Vec<Record>> = HashMap::new();

        for record in records {
            let peer = self
                .partition_key(record.event())
                .and_then(|key| self.ring.peer_for(key.as_bytes()).map(str::to_string));
            match peer {
                Some(peer) if peer != self.local_endpoint => {
                    per_peer.entry(peer).or_default().push(record);
                }
                _ => local.push(record),
            }
        }

        self.metrics
            .records_local
            .fetch_add(local.len() as u64, Ordering::Relaxed);

        for (peer, group) in per_peer {
            let count = group.len() as u64;
            match self.dispatch(&peer, group).await {
                Ok(()) => {
                    self.metrics
                        .records_forwarded
                        .fetch_add(count, Ordering::Relaxed);
                }
                Err(failed) => {
                    self.metrics
                        .records_failed_forward
                        .fetch_add(failed.len() as u64, Ordering::Relaxed);
                    local.extend(failed);
                }
            }
        }

        local
    }

    async fn receive(&self) -> Vec<Record> {
        let (records, token) = self
            .receive_buffer
            .read(self.receive_buffer.batch_size(), Duration::ZERO)
            .await;
        // receive buffers are in-memory best effort; acknowledge immediately
        self.receive_buffer.checkpoint(token).await;
        self.metrics
            .records_received
            .fetch_add(records.len() as u64, Ordering::Relaxed);
        records
    }
}

impl std::fmt::Debug for RemotePeerForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePeerForwarder")
            .field("pipeline", &self.pipeline_name)
            .field("plugin", &self.plugin_id)
            .field("peers", &self.ring.len())
            .finish()
    }
}
