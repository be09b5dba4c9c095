//! Bulk indexing sink
//!
//! For each output batch: serialize every event, accumulate size-bounded
//! bulk requests, flush through the retry policy, and dead-letter the
//! leftovers. Index management runs once before the first flush.

pub(crate) mod accumulator;
pub(crate) mod client;
pub(crate) mod dlq;
pub(crate) mod index;
pub(crate) mod metrics;
pub(crate) mod retry;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use sluice_config::BulkSinkConfig;
use sluice_event::Record;
use sluice_pipeline::{Sink, SinkError};

use crate::bulk::accumulator::{AccumulatingBulkRequest, BulkOperation};
use crate::bulk::client::{BulkClient, HttpBulkClient};
use crate::bulk::dlq::DlqWriter;
use crate::bulk::index::IndexManager;
use crate::bulk::metrics::BulkSinkMetrics;
use crate::bulk::retry::{BulkRetryPolicy, FailedOperation, RetryConfig};
use crate::{BulkSinkError, Result};

/// Size-bounded batching sink with retry and dead-letter handling
pub struct BulkSink {
    config: BulkSinkConfig,
    bulk_size_bytes: usize,
    client: Arc<dyn BulkClient>,
    retry: BulkRetryPolicy,
    dlq: Mutex<Option<DlqWriter>>,
    pipeline_name: String,
    plugin_id: String,
    metrics: Arc<BulkSinkMetrics>,
    shutdown: CancellationToken,
    initialized: AtomicBool,
}

impl BulkSink {
    /// Build a sink talking HTTP to the configured hosts
    pub fn new(config: BulkSinkConfig, pipeline_name: impl Into<String>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| BulkSinkError::init(e.to_string()))?;
        let client: Arc<dyn BulkClient> = Arc::new(HttpBulkClient::new(&config)?);
        Ok(Self::with_client(config, client, pipeline_name))
    }

    /// Build a sink over an explicit cluster client
    pub fn with_client(
        config: BulkSinkConfig,
        client: Arc<dyn BulkClient>,
        pipeline_name: impl Into<String>,
    ) -> Self {
        let retry = BulkRetryPolicy::new(RetryConfig {
            max_retries: config.max_retries,
            ..RetryConfig::default()
        });
        Self {
            bulk_size_bytes: config.bulk_size_bytes() as usize,
            config,
            client,
            retry,
            dlq: Mutex::new(None),
            pipeline_name: pipeline_name.into(),
            plugin_id: "bulk".to_string(),
            metrics: Arc::new(BulkSinkMetrics::new()),
            shutdown: CancellationToken::new(),
            initialized: AtomicBool::new(false),
        }
    }

    /// Override the flush threshold with an exact byte count
    #[must_use]
    pub fn with_bulk_size_bytes(mut self, bytes: usize) -> Self {
        self.bulk_size_bytes = bytes;
        self
    }

    pub fn metrics(&self) -> &Arc<BulkSinkMetrics> {
        &self.metrics
    }

    fn operation_for(&self, record: &Record) -> Result<BulkOperation> {
        let event = record.event();
        let document = event.to_json_string()?;
        let document_id = match &self.config.document_id_field {
            Some(field) => event.get_str(field)?.map(str::to_string),
            None => None,
        };
        Ok(BulkOperation::new(
            self.config.action,
            self.config.index.clone(),
            document_id,
            document,
        ))
    }

    async fn flush(&self, request: AccumulatingBulkRequest) {
        let operations = request.len();
        let bytes = request.estimated_size_bytes();
        let start = Instant::now();

        let result = self
            .retry
            .execute(self.client.as_ref(), request, &self.shutdown, &self.metrics)
            .await;

        self.metrics
            .record_flush(start.elapsed(), bytes as u64, result.succeeded as u64);
        tracing::debug!(
            pipeline = %self.pipeline_name,
            operations,
            bytes,
            succeeded = result.succeeded,
            failed = result.failures.len(),
            attempts = result.attempts,
            "bulk flush finished"
        );

        if !result.failures.is_empty() {
            self.dead_letter(result.failures).await;
        }
    }

    async fn dead_letter(&self, failures: Vec<FailedOperation>) {
        let mut dlq = self.dlq.lock().await;
        for failure in failures {
            self.metrics.record_dlq();
            match dlq.as_mut() {
                Some(writer) => {
                    if let Err(e) = writer
                        .write(
                            &failure.operation,
                            &failure.message,
                            failure.attempt,
                            &self.plugin_id,
                            &self.pipeline_name,
                        )
                        .await
                    {
                        tracing::error!(
                            pipeline = %self.pipeline_name,
                            error = %e,
                            document = %failure.operation.document(),
                            "dead-letter write failed"
                        );
                    }
                }
                None => {
                    tracing::warn!(
                        pipeline = %self.pipeline_name,
                        document = %failure.operation.document(),
                        failure = %failure.message,
                        attempt = failure.attempt,
                        "operation failed with no dead-letter file configured"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl Sink for BulkSink {
    async fn initialize(&self) -> std::result::Result<(), SinkError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(
            pipeline = %self.pipeline_name,
            index = %self.config.index,
            "initializing bulk sink"
        );

        let manager = IndexManager::new(Arc::clone(&self.client), &self.config);
        manager
            .setup()
            .await
            .map_err(|e| SinkError::init(e.to_string()))?;

        if let Some(path) = &self.config.dlq_file {
            let writer = DlqWriter::open(path)
                .await
                .map_err(|e| SinkError::init(e.to_string()))?;
            *self.dlq.lock().await = Some(writer);
        }

        tracing::info!(pipeline = %self.pipeline_name, "bulk sink initialized");
        Ok(())
    }

    async fn output(&self, records: Vec<Record>) -> std::result::Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let bulk_size = self.bulk_size_bytes;
        let mut request = AccumulatingBulkRequest::new();

        for record in &records {
            let operation = match self.operation_for(record) {
                Ok(op) => op,
                Err(e) => {
                    tracing::warn!(
                        pipeline = %self.pipeline_name,
                        error = %e,
                        "skipping unserializable record"
                    );
                    self.metrics.record_serialization_error();
                    continue;
                }
            };

            if !request.is_empty() && request.estimated_size_with(&operation) >= bulk_size {
                self.flush(std::mem::take(&mut request)).await;
            }
            request.push(operation);
        }

        if !request.is_empty() {
            self.flush(request).await;
        }
        Ok(())
    }

    async fn shutdown(&self) {
        // cancel first so an in-flight retry loop stops at its next check
        self.shutdown.cancel();
        if let Some(writer) = self.dlq.lock().await.take() {
            if let Err(e) = writer.close().await {
                tracing::error!(pipeline = %self.pipeline_name, error = %e, "dead-letter close failed");
            }
        }
        let snapshot = self.metrics.snapshot();
        tracing::info!(
            pipeline = %self.pipeline_name,
            requests = snapshot.requests_sent,
            records = snapshot.records_indexed,
            retries = snapshot.retries,
            dlq_writes = snapshot.dlq_writes,
            "bulk sink shut down"
        );
    }

    fn name(&self) -> &str {
        "bulk"
    }
}

impl std::fmt::Debug for BulkSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkSink")
            .field("pipeline", &self.pipeline_name)
            .field("index", &self.config.index)
            .finish()
    }
}

#[cfg(test)]
#[path = "bulk_test.rs"]
mod bulk_test;
