//! Bounded multi-producer/multi-consumer buffer with checkpointed reads
//!
//! Capacity counts queued plus un-checkpointed in-flight records, so a slow
//! consumer exerts backpressure on writers even after its batch left the
//! queue. A batch whose token is never checkpointed is redelivered after the
//! visibility timeout.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::{timeout_at, Instant};

use sluice_event::Record;

use crate::BufferError;

/// Default redelivery deadline for un-checkpointed batches
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

const EMPTY_TOKEN: u64 = 0;

/// Opaque handle identifying a read batch until it is checkpointed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointToken(u64);

impl CheckpointToken {
    fn empty() -> Self {
        Self(EMPTY_TOKEN)
    }

    /// True for the token of an empty read; checkpointing it is a no-op
    pub fn is_empty(&self) -> bool {
        self.0 == EMPTY_TOKEN
    }
}

struct InFlight {
    records: Vec<Record>,
    expires_at: Instant,
}

struct Inner {
    queue: VecDeque<Record>,
    in_flight: HashMap<u64, InFlight>,
    in_flight_records: usize,
    next_token: u64,
    shutdown: bool,
}

impl Inner {
    fn total(&self) -> usize {
        self.queue.len() + self.in_flight_records
    }
}

/// Counters exposed by the buffer
#[derive(Debug, Default)]
pub struct BufferMetrics {
    pub records_written: AtomicU64,
    pub records_read: AtomicU64,
    pub batches_checkpointed: AtomicU64,
    pub batches_redelivered: AtomicU64,
    pub write_timeouts: AtomicU64,
}

/// Bounded MPMC queue with read-batch checkpointing
///
/// Safe for concurrent use from any number of writer and reader tasks.
/// Capacity and batch size are fixed at construction.
pub struct BlockingBuffer {
    inner: Mutex<Inner>,
    read_notify: Notify,
    write_notify: Notify,
    capacity: usize,
    batch_size: usize,
    visibility_timeout: Duration,
    metrics: BufferMetrics,
}

impl BlockingBuffer {
    /// Create a buffer holding at most `capacity` un-checkpointed records,
    /// handing out read batches of up to `batch_size`
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                in_flight: HashMap::new(),
                in_flight_records: 0,
                next_token: 1,
                shutdown: false,
            }),
            read_notify: Notify::new(),
            write_notify: Notify::new(),
            capacity,
            batch_size,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            metrics: BufferMetrics::default(),
        }
    }

    /// Override the redelivery deadline for un-checkpointed batches
    #[must_use]
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn metrics(&self) -> &BufferMetrics {
        &self.metrics
    }

    /// Write one record, waiting up to `timeout` for capacity
    pub async fn write(&self, record: Record, timeout: Duration) -> Result<(), BufferError> {
        let deadline = Instant::now() + timeout;
        let mut record = Some(record);
        loop {
            let notified = self.write_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().await;
                if inner.shutdown {
                    return Err(BufferError::Shutdown);
                }
                self.reclaim_expired(&mut inner);
                if inner.total() < self.capacity {
                    if let Some(r) = record.take() {
                        inner.queue.push_back(r);
                    }
                    self.metrics.records_written.fetch_add(1, Ordering::Relaxed);
                    self.read_notify.notify_waiters();
                    return Ok(());
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                self.metrics.write_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(BufferError::Full(timeout));
            }
        }
    }

    /// Write a whole batch, all-or-nothing against capacity
    ///
    /// Never partially admits: either every record is queued before the
    /// deadline or none is.
    pub async fn write_all(
        &self,
        records: Vec<Record>,
        timeout: Duration,
    ) -> Result<(), BufferError> {
        if records.is_empty() {
            return Ok(());
        }
        if records.len() > self.capacity {
            return Err(BufferError::BatchTooLarge {
                batch: records.len(),
                capacity: self.capacity,
            });
        }
        let deadline = Instant::now() + timeout;
        let mut records = Some(records);
        loop {
            let notified = self.write_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().await;
                if inner.shutdown {
                    return Err(BufferError::Shutdown);
                }
                self.reclaim_expired(&mut inner);
                let len = records.as_ref().map(Vec::len).unwrap_or(0);
                if inner.total() + len <= self.capacity {
                    if let Some(batch) = records.take() {
                        self.metrics
                            .records_written
                            .fetch_add(batch.len() as u64, Ordering::Relaxed);
                        inner.queue.extend(batch);
                    }
                    self.read_notify.notify_waiters();
                    return Ok(());
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                self.metrics.write_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(BufferError::Full(timeout));
            }
        }
    }

    /// Read a batch of up to `max_batch` records
    ///
    /// Returns as soon as the configured batch size has accumulated,
    /// otherwise waits up to `timeout` and returns whatever is queued,
    /// possibly nothing. The batch stays counted against capacity until its
    /// token is checkpointed.
    pub async fn read(
        &self,
        max_batch: usize,
        timeout: Duration,
    ) -> (Vec<Record>, CheckpointToken) {
        let deadline = Instant::now() + timeout;
        let threshold = self.batch_size.min(max_batch).max(1);
        loop {
            let notified = self.read_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.inner.lock().await;
                self.reclaim_expired(&mut inner);
                if inner.queue.len() >= threshold || inner.shutdown {
                    return self.take_batch(&mut inner, max_batch);
                }
            }
            if timeout_at(deadline, notified).await.is_err() {
                let mut inner = self.inner.lock().await;
                self.reclaim_expired(&mut inner);
                return self.take_batch(&mut inner, max_batch);
            }
        }
    }

    /// Mark a read batch complete, releasing its capacity
    pub async fn checkpoint(&self, token: CheckpointToken) {
        if token.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().await;
        match inner.in_flight.remove(&token.0) {
            Some(batch) => {
                inner.in_flight_records -= batch.records.len();
                self.metrics
                    .batches_checkpointed
                    .fetch_add(1, Ordering::Relaxed);
                self.write_notify.notify_waiters();
            }
            None => {
                tracing::warn!(token = token.0, "checkpoint for unknown or expired token");
            }
        }
    }

    /// True when no records are queued or in flight
    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.total() == 0
    }

    /// True when un-checkpointed records fill the whole capacity
    pub async fn is_full(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.total() >= self.capacity
    }

    /// Begin shutdown: writers fail with `Shutdown`, readers drain what is
    /// queued and may still checkpoint outstanding tokens
    pub async fn shutdown(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.shutdown = true;
        }
        self.write_notify.notify_waiters();
        self.read_notify.notify_waiters();
    }

    fn take_batch(&self, inner: &mut Inner, max_batch: usize) -> (Vec<Record>, CheckpointToken) {
        let count = inner.queue.len().min(max_batch);
        if count == 0 {
            return (Vec::new(), CheckpointToken::empty());
        }
        let records: Vec<Record> = inner.queue.drain(..count).collect();
        let token = inner.next_token;
        inner.next_token += 1;
        inner.in_flight_records += records.len();
        inner.in_flight.insert(
            token,
            InFlight {
                records: records.clone(),
                expires_at: Instant::now() + self.visibility_timeout,
            },
        );
        self.metrics
            .records_read
            .fetch_add(records.len() as u64, Ordering::Relaxed);
        (records, CheckpointToken(token))
    }

    /// Requeue batches whose visibility timeout lapsed without a checkpoint
    fn reclaim_expired(&self, inner: &mut Inner) {
        let now = Instant::now();
        let expired: Vec<u64> = inner
            .in_flight
            .iter()
            .filter(|(_, b)| b.expires_at <= now)
            .map(|(t, _)| *t)
            .collect();
        for token in expired {
            if let Some(batch) = inner.in_flight.remove(&token) {
                inner.in_flight_records -= batch.records.len();
                tracing::warn!(
                    token,
                    records = batch.records.len(),
                    "redelivering batch after visibility timeout"
                );
                for record in batch.records.into_iter().rev() {
                    inner.queue.push_front(record);
                }
                self.metrics
                    .batches_redelivered
                    .fetch_add(1, Ordering::Relaxed);
                self.read_notify.notify_waiters();
            }
        }
    }
}
