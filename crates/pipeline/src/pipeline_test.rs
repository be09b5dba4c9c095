//! Pipeline executor tests
//!
//! Uses in-process test doubles for source, processors, forwarder, and sinks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use sluice_event::{Event, Record};

use crate::{
    BlockingBuffer, PeerForwarder, Pipeline, Processor, ProcessorError, Sink, SinkError, Source,
};

fn record(n: i64) -> Record {
    Record::new(Event::builder("test").with_field("n", n).build())
}

/// Source that writes a fixed set of records, then idles until cancelled
struct FixedSource {
    count: i64,
}

#[async_trait]
impl Source for FixedSource {
    async fn run(&self, buffer: Arc<BlockingBuffer>, shutdown: CancellationToken) {
        for i in 0..self.count {
            if buffer
                .write(record(i), Duration::from_secs(1))
                .await
                .is_err()
            {
                return;
            }
        }
        shutdown.cancelled().await;
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Processor that stamps each record and counts invocations
struct TagProcessor {
    executions: AtomicU64,
}

impl TagProcessor {
    fn new() -> Self {
        Self {
            executions: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Processor for TagProcessor {
    async fn execute(&self, mut records: Vec<Record>) -> Result<Vec<Record>, ProcessorError> {
        self.executions.fetch_add(1, Ordering::Relaxed);
        for r in &mut records {
            r.event_mut()
                .put("tagged", true)
                .map_err(|e| ProcessorError::failed(e.to_string()))?;
        }
        Ok(records)
    }

    fn prepare_for_shutdown(&self) {}

    fn is_ready_for_shutdown(&self) -> bool {
        true
    }

    async fn shutdown(&self) {}

    fn name(&self) -> &str {
        "tag"
    }
}

/// Processor that fails every batch
struct FailingProcessor;

#[async_trait]
impl Processor for FailingProcessor {
    async fn execute(&self, _records: Vec<Record>) -> Result<Vec<Record>, ProcessorError> {
        Err(ProcessorError::failed("boom"))
    }

    fn prepare_for_shutdown(&self) {}

    fn is_ready_for_shutdown(&self) -> bool {
        true
    }

    async fn shutdown(&self) {}

    fn name(&self) -> &str {
        "failing"
    }
}

/// Processor that is ready for shutdown only after prepare + one more execute
struct DrainingProcessor {
    prepared: AtomicBool,
    flushed: AtomicBool,
}

impl DrainingProcessor {
    fn new() -> Self {
        Self {
            prepared: AtomicBool::new(false),
            flushed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Processor for DrainingProcessor {
    async fn execute(&self, records: Vec<Record>) -> Result<Vec<Record>, ProcessorError> {
        if self.prepared.load(Ordering::SeqCst) {
            self.flushed.store(true, Ordering::SeqCst);
        }
        Ok(records)
    }

    fn prepare_for_shutdown(&self) {
        self.prepared.store(true, Ordering::SeqCst);
    }

    fn is_ready_for_shutdown(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {}

    fn name(&self) -> &str {
        "draining"
    }
}

/// Sink that collects everything it is given
struct CollectingSink {
    records: Mutex<Vec<Record>>,
    shutdown_called: AtomicBool,
}

impl CollectingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            shutdown_called: AtomicBool::new(false),
        })
    }

    async fn collected(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl Sink for CollectingSink {
    async fn initialize(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn output(&self, records: Vec<Record>) -> Result<(), SinkError> {
        self.records.lock().await.extend(records);
        Ok(())
    }

    async fn shutdown(&self) {
        self.shutdown_called.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "collecting"
    }
}

/// Forwarder stub: everything is local, plus a one-shot receive payload
#[derive(Debug)]
struct StubForwarder {
    pending: Mutex<Vec<Record>>,
}

#[async_trait]
impl PeerForwarder for StubForwarder {
    async fn forward(&self, records: Vec<Record>) -> Vec<Record> {
        records
    }

    async fn receive(&self) -> Vec<Record> {
        self.pending.lock().await.drain(..).collect()
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn records_flow_source_to_sink() {
    let sink = CollectingSink::new();
    let processor = Arc::new(TagProcessor::new());

    let pipeline = Pipeline::builder("flow")
        .source(Arc::new(FixedSource { count: 10 }))
        .buffer(Arc::new(BlockingBuffer::new(32, 4)))
        .processor(processor.clone())
        .sink(sink.clone())
        .workers(2)
        .read_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();

    let sink_probe = sink.clone();
    wait_for(|| collected_len(&sink_probe) >= 10).await;

    pipeline.shutdown(Duration::from_secs(5)).await;

    let collected = sink.collected().await;
    assert_eq!(collected.len(), 10);
    assert!(collected
        .iter()
        .all(|r| r.event().get("tagged").unwrap().is_some()));
    assert!(processor.executions.load(Ordering::Relaxed) > 0);
    assert!(sink.shutdown_called.load(Ordering::SeqCst));
}

fn collected_len(sink: &Arc<CollectingSink>) -> usize {
    sink.records.try_lock().map(|g| g.len()).unwrap_or(0)
}

#[tokio::test]
async fn processor_failure_drops_batch_and_counts() {
    let sink = CollectingSink::new();

    let pipeline = Pipeline::builder("dropping")
        .source(Arc::new(FixedSource { count: 5 }))
        .buffer(Arc::new(BlockingBuffer::new(32, 8)))
        .processor(Arc::new(FailingProcessor))
        .sink(sink.clone())
        .read_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();

    let metrics = Arc::clone(pipeline.metrics());
    wait_for(|| metrics.snapshot().records_dropped >= 5).await;

    pipeline.shutdown(Duration::from_secs(5)).await;

    assert!(sink.collected().await.is_empty());
    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.records_dropped, 5);
    assert_eq!(snapshot.records_processed, 0);
}

#[tokio::test]
async fn forwarded_processor_merges_received_records() {
    let sink = CollectingSink::new();
    let forwarder = Arc::new(StubForwarder {
        pending: Mutex::new(vec![record(100), record(101)]),
    });

    let pipeline = Pipeline::builder("forwarded")
        .source(Arc::new(FixedSource { count: 3 }))
        .buffer(Arc::new(BlockingBuffer::new(32, 8)))
        .forwarded_processor(Arc::new(TagProcessor::new()), forwarder)
        .sink(sink.clone())
        .read_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();

    let sink_probe = sink.clone();
    wait_for(|| collected_len(&sink_probe) >= 5).await;

    pipeline.shutdown(Duration::from_secs(5)).await;

    // 3 from the source plus 2 peer-forwarded
    assert_eq!(sink.collected().await.len(), 5);
}

#[tokio::test]
async fn fan_out_reaches_every_sink() {
    let first = CollectingSink::new();
    let second = CollectingSink::new();

    let pipeline = Pipeline::builder("fanout")
        .source(Arc::new(FixedSource { count: 4 }))
        .buffer(Arc::new(BlockingBuffer::new(32, 8)))
        .sink(first.clone())
        .sink(second.clone())
        .read_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();

    let (a, b) = (first.clone(), second.clone());
    wait_for(|| collected_len(&a) >= 4 && collected_len(&b) >= 4).await;

    pipeline.shutdown(Duration::from_secs(5)).await;

    assert_eq!(first.collected().await.len(), 4);
    assert_eq!(second.collected().await.len(), 4);
}

#[tokio::test]
async fn shutdown_waits_for_processor_drain() {
    let sink = CollectingSink::new();
    let processor = Arc::new(DrainingProcessor::new());

    let pipeline = Pipeline::builder("draining")
        .source(Arc::new(FixedSource { count: 2 }))
        .buffer(Arc::new(BlockingBuffer::new(32, 8)))
        .processor(processor.clone())
        .sink(sink.clone())
        .read_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();

    let sink_probe = sink.clone();
    wait_for(|| collected_len(&sink_probe) >= 2).await;

    pipeline.shutdown(Duration::from_secs(5)).await;

    // prepare_for_shutdown reached the processor and a flush ran after it
    assert!(processor.prepared.load(Ordering::SeqCst));
    assert!(processor.is_ready_for_shutdown());
}

#[tokio::test]
async fn per_worker_slot_uses_one_instance_per_worker() {
    let sink = CollectingSink::new();
    let instances: Vec<Arc<TagProcessor>> = (0..2).map(|_| Arc::new(TagProcessor::new())).collect();

    let pipeline = Pipeline::builder("per-worker")
        .source(Arc::new(FixedSource { count: 8 }))
        .buffer(Arc::new(BlockingBuffer::new(32, 2)))
        .worker_processors(
            instances
                .iter()
                .map(|p| Arc::clone(p) as Arc<dyn Processor>)
                .collect(),
            None,
        )
        .sink(sink.clone())
        .workers(2)
        .read_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    pipeline.start().await.unwrap();

    let sink_probe = sink.clone();
    wait_for(|| collected_len(&sink_probe) >= 8).await;
    pipeline.shutdown(Duration::from_secs(5)).await;

    assert_eq!(sink.collected().await.len(), 8);
    // both instances were driven by their own worker
    let executions: u64 = instances
        .iter()
        .map(|p| p.executions.load(Ordering::Relaxed))
        .sum();
    assert!(executions > 0);
}

#[tokio::test]
async fn per_worker_slot_must_match_worker_count() {
    let err = Pipeline::builder("mismatch")
        .source(Arc::new(FixedSource { count: 0 }))
        .worker_processors(vec![Arc::new(TagProcessor::new()) as Arc<dyn Processor>], None)
        .sink(CollectingSink::new())
        .workers(2)
        .build();
    assert!(err.is_err());
}

#[tokio::test]
async fn build_rejects_incomplete_pipelines() {
    assert!(Pipeline::builder("no-source")
        .sink(CollectingSink::new())
        .build()
        .is_err());
    assert!(Pipeline::builder("no-sink")
        .source(Arc::new(FixedSource { count: 0 }))
        .build()
        .is_err());
}
