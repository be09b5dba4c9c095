//! Bulk retry policy
//!
//! Capped exponential backoff with full jitter. Between attempts only the
//! retryable subset of operations is re-sent. A transport failure marks the
//! whole request retryable; one liveness probe qualifies the log line but
//! never changes the decision. Retry exhaustion and shutdown both drain the
//! surviving operations into the failure list for dead-lettering.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use sluice_config::BulkAction;

use crate::bulk::accumulator::{AccumulatingBulkRequest, BulkOperation};
use crate::bulk::client::{BulkClient, ErrorKind};
use crate::bulk::metrics::BulkSinkMetrics;

/// Failure message used when shutdown interrupts a retry loop
pub const SHUTDOWN_MESSAGE: &str = "shutdown in progress";

/// Backoff and attempt limits
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// First backoff delay
    pub base: Duration,

    /// Backoff ceiling
    pub max_backoff: Duration,

    /// Retries after the first attempt; `None` retries forever
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(50),
            max_backoff: Duration::from_secs(10),
            max_retries: None,
        }
    }
}

/// An operation the policy gave up on
#[derive(Debug)]
pub struct FailedOperation {
    pub operation: BulkOperation,
    pub message: String,
    pub attempt: usize,
}

/// Outcome of one flush
#[derive(Debug, Default)]
pub struct FlushResult {
    pub succeeded: usize,
    pub failures: Vec<FailedOperation>,
    pub attempts: usize,
}

/// Drives bulk requests to completion or dead-letter
pub struct BulkRetryPolicy {
    config: RetryConfig,
}

impl BulkRetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Submit `request`, re-sending retryable subsets until done
    pub async fn execute(
        &self,
        client: &dyn BulkClient,
        request: AccumulatingBulkRequest,
        shutdown: &CancellationToken,
        metrics: &BulkSinkMetrics,
    ) -> FlushResult {
        let mut result = FlushResult::default();
        let mut current = request;
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            result.attempts = attempt;

            if attempt > 1 {
                metrics.record_retry();
                let delay = self.backoff_delay(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    operations = current.len(),
                    "retrying bulk request"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.cancelled() => {}
                }
            }

            if shutdown.is_cancelled() {
                drain_failures(&mut result, current, SHUTDOWN_MESSAGE, attempt);
                return result;
            }

            let retryable = match client.bulk(&current).await {
                Err(e) => {
                    metrics.record_error_kind(ErrorKind::Network);
                    // one probe to tell a dead cluster from a failed request;
                    // either way the whole request stays retryable
                    match client.ping().await {
                        Ok(()) => tracing::warn!(
                            error = %e,
                            "bulk request failed but cluster is reachable"
                        ),
                        Err(probe) => tracing::warn!(
                            error = %e,
                            probe_error = %probe,
                            "bulk request failed and cluster is unreachable"
                        ),
                    }
                    current.into_operations()
                }
                Ok(response) => {
                    let operations = current.into_operations();
                    let mut retryable = Vec::new();
                    for (entry, operation) in response.entries.iter().zip(operations) {
                        metrics.record_error_kind(entry.error_kind);
                        match entry.error_kind {
                            ErrorKind::None => result.succeeded += 1,
                            ErrorKind::VersionConflict => {
                                if operation.action() == BulkAction::Create
                                    && operation.document_id().is_some()
                                {
                                    // idempotent re-send of the same id
                                    tracing::debug!(
                                        document_id = operation.document_id().unwrap_or_default(),
                                        "create hit an existing version, treating as success"
                                    );
                                    result.succeeded += 1;
                                } else {
                                    result.failures.push(FailedOperation {
                                        operation,
                                        message: entry
                                            .message
                                            .clone()
                                            .unwrap_or_else(|| "version conflict".to_string()),
                                        attempt,
                                    });
                                }
                            }
                            kind if kind.is_retryable() => retryable.push(operation),
                            _ => {
                                result.failures.push(FailedOperation {
                                    operation,
                                    message: entry
                                        .message
                                        .clone()
                                        .unwrap_or_else(|| format!("status {}", entry.status_code)),
                                    attempt,
                                });
                            }
                        }
                    }
                    retryable
                }
            };

            if retryable.is_empty() {
                return result;
            }

            if self.exhausted(attempt) {
                drain_failures_from(
                    &mut result,
                    retryable,
                    &format!("retries exhausted after {attempt} attempts"),
                    attempt,
                );
                return result;
            }

            current = AccumulatingBulkRequest::from_operations(retryable);
        }
    }

    /// `base * 2^(attempt-2)` capped, with full jitter
    fn backoff_delay(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16) as u32;
        let raw = self
            .config
            .base
            .saturating_mul(2u32.saturating_pow(exponent));
        let capped = raw.min(self.config.max_backoff);
        if capped.is_zero() {
            return capped;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }

    fn exhausted(&self, attempt: usize) -> bool {
        match self.config.max_retries {
            Some(max_retries) => attempt >= max_retries + 1,
            None => false,
        }
    }
}

fn drain_failures(
    result: &mut FlushResult,
    request: AccumulatingBulkRequest,
    message: &str,
    attempt: usize,
) {
    drain_failures_from(result, request.into_operations(), message, attempt);
}

fn drain_failures_from(
    result: &mut FlushResult,
    operations: Vec<BulkOperation>,
    message: &str,
    attempt: usize,
) {
    for operation in operations {
        result.failures.push(FailedOperation {
            operation,
            message: message.to_string(),
            attempt,
        });
    }
}

#[cfg(test)]
#[path = "retry_test.rs"]
mod retry_test;
