//! Pipeline executor metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the worker loop
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    /// Records read from the buffer
    pub records_read: AtomicU64,

    /// Records that completed the whole processor chain
    pub records_processed: AtomicU64,

    /// Records dropped because a processor failed on their batch
    pub records_dropped: AtomicU64,

    /// Batches checkpointed back to the buffer
    pub batches_checkpointed: AtomicU64,

    /// Sink output calls that returned an error
    pub sink_errors: AtomicU64,
}

impl PipelineMetrics {
    pub const fn new() -> Self {
        Self {
            records_read: AtomicU64::new(0),
            records_processed: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            batches_checkpointed: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_read(&self, count: u64) {
        self.records_read.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_processed(&self, count: u64) {
        self.records_processed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_dropped(&self, count: u64) {
        self.records_dropped.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_checkpoint(&self) {
        self.batches_checkpointed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            batches_checkpointed: self.batches_checkpointed.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of pipeline metrics
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineMetricsSnapshot {
    pub records_read: u64,
    pub records_processed: u64,
    pub records_dropped: u64,
    pub batches_checkpointed: u64,
    pub sink_errors: u64,
}
