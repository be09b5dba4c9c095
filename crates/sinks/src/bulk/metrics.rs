//! Bulk sink metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::bulk::client::ErrorKind;

/// Counters for the bulk sink
#[derive(Debug, Default)]
pub struct BulkSinkMetrics {
    /// Bulk requests sent (flushes, including retries' first sends)
    pub requests_sent: AtomicU64,

    /// Cumulative flush latency in milliseconds
    pub flush_latency_ms_total: AtomicU64,

    /// Cumulative request payload bytes
    pub request_bytes_total: AtomicU64,

    /// Largest single request payload seen
    pub request_bytes_max: AtomicU64,

    /// Operations acknowledged by the cluster
    pub records_indexed: AtomicU64,

    /// Retry attempts
    pub retries: AtomicU64,

    /// Operations written to the dead-letter sink
    pub dlq_writes: AtomicU64,

    /// Records skipped because serialization failed
    pub serialization_errors: AtomicU64,

    // per-error-kind counters
    pub document_level_errors: AtomicU64,
    pub version_conflicts: AtomicU64,
    pub too_many_requests_errors: AtomicU64,
    pub rejected_errors: AtomicU64,
    pub server_errors: AtomicU64,
    pub network_errors: AtomicU64,
    pub unknown_errors: AtomicU64,
}

impl BulkSinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_flush(&self, latency: Duration, bytes: u64, succeeded: u64) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        self.flush_latency_ms_total
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        self.request_bytes_total.fetch_add(bytes, Ordering::Relaxed);
        self.request_bytes_max.fetch_max(bytes, Ordering::Relaxed);
        self.records_indexed.fetch_add(succeeded, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dlq(&self) {
        self.dlq_writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_serialization_error(&self) {
        self.serialization_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error_kind(&self, kind: ErrorKind) {
        let counter = match kind {
            ErrorKind::None => return,
            ErrorKind::DocumentLevel => &self.document_level_errors,
            ErrorKind::VersionConflict => &self.version_conflicts,
            ErrorKind::TooManyRequests => &self.too_many_requests_errors,
            ErrorKind::Rejected => &self.rejected_errors,
            ErrorKind::ServerError => &self.server_errors,
            ErrorKind::Network => &self.network_errors,
            ErrorKind::Unknown => &self.unknown_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> BulkSinkMetricsSnapshot {
        BulkSinkMetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            flush_latency_ms_total: self.flush_latency_ms_total.load(Ordering::Relaxed),
            request_bytes_total: self.request_bytes_total.load(Ordering::Relaxed),
            request_bytes_max: self.request_bytes_max.load(Ordering::Relaxed),
            records_indexed: self.records_indexed.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dlq_writes: self.dlq_writes.load(Ordering::Relaxed),
            serialization_errors: self.serialization_errors.load(Ordering::Relaxed),
            document_level_errors: self.document_level_errors.load(Ordering::Relaxed),
            version_conflicts: self.version_conflicts.load(Ordering::Relaxed),
            too_many_requests_errors: self.too_many_requests_errors.load(Ordering::Relaxed),
            rejected_errors: self.rejected_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            network_errors: self.network_errors.load(Ordering::Relaxed),
            unknown_errors: self.unknown_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of bulk sink metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkSinkMetricsSnapshot {
    pub requests_sent: u64,
    pub flush_latency_ms_total: u64,
    pub request_bytes_total: u64,
    pub request_bytes_max: u64,
    pub records_indexed: u64,
    pub retries: u64,
    pub dlq_writes: u64,
    pub serialization_errors: u64,
    pub document_level_errors: u64,
    pub version_conflicts: u64,
    pub too_many_requests_errors: u64,
    pub rejected_errors: u64,
    pub server_errors: u64,
    pub network_errors: u64,
    pub unknown_errors: u64,
}
