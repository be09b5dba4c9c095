//! Shared state of one service-map processor group
//!
//! The group owns the four rotating windows, the worker barrier, the
//! process-wide relationship set, and the rotation clock. Processor
//! instances hold an `Arc` back-reference; the instance registered first
//! (id 0) is the rotation master.
//!
//! Window files live in one directory: `db-<epoch-ms>` holds span data,
//! `db-<epoch-ms>-empty` is the cleared side, and the `trace-db-` pair does
//! the same for trace groups. Rotation renames so the `-empty` suffix and
//! the newer epoch always follow the cleared side.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use sluice_config::ServiceMapConfig;

use crate::barrier::CyclicBarrier;
use crate::processor::ServiceMapProcessor;
use crate::state::{ServiceMapRelationship, SpanState};
use crate::store::WindowStore;

/// Millisecond clock, injectable for tests
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

struct WindowPair {
    current: WindowStore,
    previous: WindowStore,
}

/// Counters for the whole group
#[derive(Debug, Default)]
pub struct ServiceMapMetrics {
    pub spans_ingested: AtomicU64,
    pub relationships_emitted: AtomicU64,
    pub window_rotations: AtomicU64,
}

/// Shared windows, barrier, and relationship set for N workers
pub struct ProcessorGroup {
    spans: RwLock<WindowPair>,
    trace_groups: RwLock<WindowPair>,
    relationships: Mutex<HashSet<ServiceMapRelationship>>,
    barrier: CyclicBarrier,
    cancel: CancellationToken,
    registered: AtomicUsize,
    workers: usize,
    window_duration_ms: i64,
    previous_timestamp: AtomicI64,
    dir: PathBuf,
    clock: Arc<dyn Clock>,
    deleted: AtomicBool,
    metrics: ServiceMapMetrics,
}

impl ProcessorGroup {
    /// Create the windows and barrier for `workers` worker tasks
    pub fn new(
        config: &ServiceMapConfig,
        workers: usize,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<Arc<Self>> {
        let dir = PathBuf::from(&config.db_path);
        std::fs::create_dir_all(&dir)?;

        let now = clock.now_millis();
        let spans = WindowPair {
            current: WindowStore::open(dir.join(format!("db-{now}")))?,
            previous: WindowStore::open(dir.join(format!("db-{now}-empty")))?,
        };
        let trace_groups = WindowPair {
            current: WindowStore::open(dir.join(format!("trace-db-{now}")))?,
            previous: WindowStore::open(dir.join(format!("trace-db-{now}-empty")))?,
        };

        tracing::info!(
            path = %dir.display(),
            workers,
            window_duration_ms = config.window_duration_seconds * 1000,
            "service map windows created"
        );

        Ok(Arc::new(Self {
            spans: RwLock::new(spans),
            trace_groups: RwLock::new(trace_groups),
            relationships: Mutex::new(HashSet::new()),
            barrier: CyclicBarrier::new(workers),
            cancel: CancellationToken::new(),
            registered: AtomicUsize::new(0),
            workers,
            window_duration_ms: config.window_duration_seconds as i64 * 1000,
            previous_timestamp: AtomicI64::new(now),
            dir,
            clock,
            deleted: AtomicBool::new(false),
            metrics: ServiceMapMetrics::default(),
        }))
    }

    /// Hand out the next processor instance; instance 0 is the master
    pub fn register(self: &Arc<Self>) -> ServiceMapProcessor {
        let id = self.registered.fetch_add(1, Ordering::SeqCst);
        ServiceMapProcessor::new(Arc::clone(self), id)
    }

    pub fn metrics(&self) -> &ServiceMapMetrics {
        &self.metrics
    }

    pub(crate) fn barrier(&self) -> &CyclicBarrier {
        &self.barrier
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn registered_count(&self) -> usize {
        self.registered.load(Ordering::SeqCst).max(1)
    }

    /// Worker tasks this group coordinates (the barrier's party count)
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub(crate) fn window_duration_has_passed(&self) -> bool {
        self.clock.now_millis() - self.previous_timestamp.load(Ordering::SeqCst)
            >= self.window_duration_ms
    }

    /// Force the next execute on every worker to evaluate and rotate
    pub(crate) fn force_evaluation(&self) {
        self.previous_timestamp.store(0, Ordering::SeqCst);
    }

    pub(crate) fn insert_spans(
        &self,
        batch: BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> std::io::Result<()> {
        let count = batch.len() as u64;
        self.spans.write().current.put_all(batch)?;
        self.metrics.spans_ingested.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn insert_trace_group(&self, trace_id: Vec<u8>, name: &str) -> std::io::Result<()> {
        self.trace_groups
            .write()
            .current
            .put(trace_id, name.as_bytes().to_vec())
    }

    /// Join this shard of both span windows against the trace groups
    ///
    /// Relationships already in the process-wide set are skipped; the set
    /// only grows.
    pub(crate) fn evaluate_shard(
        &self,
        total_shards: usize,
        shard_id: usize,
    ) -> Vec<ServiceMapRelationship> {
        let spans = self.spans.read();
        let trace_groups = self.trace_groups.read();
        let mut emitted = Vec::new();

        for window in [&spans.previous, &spans.current] {
            for (_, child_bytes) in window.iter_shard(total_shards, shard_id) {
                let child: SpanState = match serde_json::from_slice(child_bytes) {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping undecodable span state");
                        continue;
                    }
                };
                let Some(parent_id) = child.parent_span_id.as_deref() else {
                    continue;
                };

                let parent_bytes = spans
                    .current
                    .get(parent_id)
                    .or_else(|| spans.previous.get(parent_id));
                let Some(parent_bytes) = parent_bytes else {
                    continue;
                };
                let parent: SpanState = match serde_json::from_slice(parent_bytes) {
                    Ok(state) => state,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping undecodable parent span state");
                        continue;
                    }
                };

                let group_name = trace_groups
                    .current
                    .get(&child.trace_id)
                    .or_else(|| trace_groups.previous.get(&child.trace_id))
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned());
                let Some(group_name) = group_name else {
                    continue;
                };

                if parent.service_name == child.service_name {
                    continue;
                }

                let destination = ServiceMapRelationship::destination(
                    &parent.service_name,
                    &parent.span_kind,
                    &child.service_name,
                    &child.span_name,
                    &group_name,
                );
                let target = ServiceMapRelationship::target(
                    &child.service_name,
                    &child.span_kind,
                    &child.span_name,
                    &group_name,
                );

                let mut seen = self.relationships.lock();
                for relationship in [destination, target] {
                    if seen.insert(relationship.clone()) {
                        emitted.push(relationship);
                    }
                }
            }
        }

        self.metrics
            .relationships_emitted
            .fetch_add(emitted.len() as u64, Ordering::Relaxed);
        emitted
    }

    /// Swap, clear, and rename both window pairs; master only, between
    /// barriers while every other worker is parked
    pub(crate) fn rotate_windows(&self) -> std::io::Result<()> {
        let now = self.clock.now_millis();
        let data_epoch = self.previous_timestamp.load(Ordering::SeqCst);
        tracing::info!(epoch_ms = now, "rotating service map windows");

        {
            let mut spans_guard = self.spans.write();
            let spans = &mut *spans_guard;
            std::mem::swap(&mut spans.current, &mut spans.previous);
            spans.previous.rename(self.dir.join(format!("db-{data_epoch}")))?;
            spans.current.clear()?;
            spans.current.rename(self.dir.join(format!("db-{now}-empty")))?;
        }
        {
            let mut trace_groups_guard = self.trace_groups.write();
            let trace_groups = &mut *trace_groups_guard;
            std::mem::swap(&mut trace_groups.current, &mut trace_groups.previous);
            trace_groups
                .previous
                .rename(self.dir.join(format!("trace-db-{data_epoch}")))?;
            trace_groups.current.clear()?;
            trace_groups
                .current
                .rename(self.dir.join(format!("trace-db-{now}-empty")))?;
        }

        self.previous_timestamp.store(now, Ordering::SeqCst);
        self.metrics.window_rotations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn current_spans_empty(&self) -> bool {
        self.spans.read().current.is_empty()
    }

    /// Spans on disk across both windows, in bytes
    pub fn spans_db_size(&self) -> u64 {
        let spans = self.spans.read();
        spans.current.size_in_bytes() + spans.previous.size_in_bytes()
    }

    /// Trace groups on disk across both windows, in bytes
    pub fn trace_group_db_size(&self) -> u64 {
        let trace_groups = self.trace_groups.read();
        trace_groups.current.size_in_bytes() + trace_groups.previous.size_in_bytes()
    }

    /// Number of distinct relationships emitted so far
    pub fn relationship_count(&self) -> usize {
        self.relationships.lock().len()
    }

    /// Unlink all four window files; idempotent
    pub(crate) fn delete_windows(&self) {
        if self.deleted.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.barrier.abort();

        let spans = self.spans.write();
        let trace_groups = self.trace_groups.write();
        for store in [
            &spans.current,
            &spans.previous,
            &trace_groups.current,
            &trace_groups.previous,
        ] {
            if let Err(e) = std::fs::remove_file(store.path()) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %store.path().display(),
                        error = %e,
                        "failed to unlink window file"
                    );
                }
            }
        }
        tracing::info!(path = %self.dir.display(), "service map windows deleted");
    }
}
