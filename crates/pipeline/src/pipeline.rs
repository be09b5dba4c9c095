//! Pipeline assembly and the worker loop
//!
//! A `Pipeline` runs one source task and N symmetric worker tasks. Each
//! worker reads a batch, runs the processor chain (merging peer-forwarded
//! records in front of stateful processors), fans out to every sink, and
//! checkpoints.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::metrics::PipelineMetrics;
use crate::traits::{PeerForwarder, Processor, Sink, Source};
use crate::{BlockingBuffer, PipelineError, DEFAULT_READ_BATCH_SIZE, DEFAULT_WORKERS};

/// Default wait for worker drain during shutdown
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// One shared instance, or one instance per worker
///
/// Stateful processors that coordinate through a group (e.g. a barrier)
/// register one instance per worker; the worker id selects the instance.
enum SlotProcessors {
    Shared(Arc<dyn Processor>),
    PerWorker(Vec<Arc<dyn Processor>>),
}

impl SlotProcessors {
    fn for_worker(&self, worker_id: usize) -> &Arc<dyn Processor> {
        match self {
            SlotProcessors::Shared(processor) => processor,
            SlotProcessors::PerWorker(instances) => &instances[worker_id % instances.len()],
        }
    }

    fn instances(&self) -> Vec<&Arc<dyn Processor>> {
        match self {
            SlotProcessors::Shared(processor) => vec![processor],
            SlotProcessors::PerWorker(instances) => instances.iter().collect(),
        }
    }
}

/// A processor plus its execution constraints
struct ProcessorSlot {
    processors: SlotProcessors,
    forwarder: Option<Arc<dyn PeerForwarder>>,
    /// Present for shared single-thread processors; workers serialize on it
    serial: Option<Mutex<()>>,
}

/// A running pipeline: source, buffer, processor chain, sinks
pub struct Pipeline {
    name: String,
    source: Arc<dyn Source>,
    buffer: Arc<BlockingBuffer>,
    processors: Vec<ProcessorSlot>,
    sinks: Vec<Arc<dyn Sink>>,
    workers: usize,
    read_batch_size: usize,
    read_timeout: Duration,
    source_shutdown: CancellationToken,
    drain: CancellationToken,
    metrics: Arc<PipelineMetrics>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// Start building a pipeline
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder {
            name: name.into(),
            source: None,
            buffer: None,
            processors: Vec::new(),
            sinks: Vec::new(),
            workers: DEFAULT_WORKERS,
            read_batch_size: DEFAULT_READ_BATCH_SIZE,
            read_timeout: Duration::from_secs(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> &Arc<BlockingBuffer> {
        &self.buffer
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Initialize sinks and spawn the source and worker tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), PipelineError> {
        for sink in &self.sinks {
            sink.initialize().await?;
        }

        tracing::info!(
            pipeline = %self.name,
            workers = self.workers,
            processors = self.processors.len(),
            sinks = self.sinks.len(),
            "pipeline starting"
        );

        let mut tasks = self.tasks.lock().await;

        let source = Arc::clone(&self.source);
        let buffer = Arc::clone(&self.buffer);
        let token = self.source_shutdown.clone();
        tasks.push(tokio::spawn(async move {
            source.run(buffer, token).await;
        }));

        for worker_id in 0..self.workers {
            let pipeline = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                pipeline.worker_loop(worker_id).await;
            }));
        }

        Ok(())
    }

    /// Two-phase shutdown
    ///
    /// Stops the source, broadcasts `prepare_for_shutdown`, drains workers
    /// until the buffer is empty and all processors report ready (bounded by
    /// `drain_timeout`), then shuts components down in reverse order.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        tracing::info!(pipeline = %self.name, "pipeline shutting down");

        self.source_shutdown.cancel();
        for slot in &self.processors {
            for processor in slot.processors.instances() {
                processor.prepare_for_shutdown();
            }
        }
        self.drain.cancel();
        self.buffer.shutdown().await;

        let deadline = Instant::now() + drain_timeout;
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().await;
            guard.drain(..).collect()
        };
        for mut task in tasks {
            if timeout_at(deadline, &mut task).await.is_err() {
                tracing::warn!(pipeline = %self.name, "worker did not drain in time, aborting");
                task.abort();
            }
        }

        for slot in self.processors.iter().rev() {
            for processor in slot.processors.instances() {
                processor.shutdown().await;
            }
        }
        for sink in &self.sinks {
            sink.shutdown().await;
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            pipeline = %self.name,
            records_read = snapshot.records_read,
            records_processed = snapshot.records_processed,
            records_dropped = snapshot.records_dropped,
            sink_errors = snapshot.sink_errors,
            "pipeline shut down"
        );
    }

    fn processors_ready(&self) -> bool {
        self.processors.iter().all(|slot| {
            slot.processors
                .instances()
                .iter()
                .all(|processor| processor.is_ready_for_shutdown())
        })
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize) {
        tracing::debug!(pipeline = %self.name, worker_id, "worker starting");

        loop {
            let draining = self.drain.is_cancelled();

            let (records, token) = self
                .buffer
                .read(self.read_batch_size, self.read_timeout)
                .await;
            self.metrics.record_read(records.len() as u64);
            let read_was_empty = records.is_empty();

            let mut batch = records;
            for slot in &self.processors {
                if let Some(forwarder) = &slot.forwarder {
                    batch = forwarder.forward(batch).await;
                    batch.extend(forwarder.receive().await);
                }

                // Empty batches only reach processors while draining, so
                // window timers can flush
                if batch.is_empty() && !draining {
                    continue;
                }

                let processor = slot.processors.for_worker(worker_id);
                let in_count = batch.len();
                let result = match &slot.serial {
                    Some(lock) => {
                        let _guard = lock.lock().await;
                        processor.execute(std::mem::take(&mut batch)).await
                    }
                    None => processor.execute(std::mem::take(&mut batch)).await,
                };
                match result {
                    Ok(out) => batch = out,
                    Err(e) => {
                        tracing::warn!(
                            pipeline = %self.name,
                            worker_id,
                            processor = %processor.name(),
                            error = %e,
                            records = in_count,
                            "processor failed, dropping batch"
                        );
                        self.metrics.record_dropped(in_count as u64);
                        batch = Vec::new();
                        break;
                    }
                }
            }

            if !batch.is_empty() {
                self.metrics.record_processed(batch.len() as u64);
                let sink_count = self.sinks.len();
                for (i, sink) in self.sinks.iter().enumerate() {
                    let payload = if i + 1 == sink_count {
                        std::mem::take(&mut batch)
                    } else {
                        batch.clone()
                    };
                    if let Err(e) = sink.output(payload).await {
                        tracing::warn!(
                            pipeline = %self.name,
                            sink = %sink.name(),
                            error = %e,
                            "sink output failed"
                        );
                        self.metrics.record_sink_error();
                    }
                }
            }

            self.buffer.checkpoint(token).await;
            self.metrics.record_checkpoint();

            if draining {
                if self.buffer.is_empty().await && self.processors_ready() {
                    break;
                }
                // drained reads return immediately; pace the flush loop
                if read_was_empty {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }

        tracing::debug!(pipeline = %self.name, worker_id, "worker stopping");
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("processors", &self.processors.len())
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    name: String,
    source: Option<Arc<dyn Source>>,
    buffer: Option<Arc<BlockingBuffer>>,
    processors: Vec<(SlotProcessors, Option<Arc<dyn PeerForwarder>>)>,
    sinks: Vec<Arc<dyn Sink>>,
    workers: usize,
    read_batch_size: usize,
    read_timeout: Duration,
}

impl PipelineBuilder {
    #[must_use]
    pub fn source(mut self, source: Arc<dyn Source>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn buffer(mut self, buffer: Arc<BlockingBuffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    /// Append a processor without peer forwarding
    #[must_use]
    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push((SlotProcessors::Shared(processor), None));
        self
    }

    /// Append a stateful processor paired with its peer forwarder
    #[must_use]
    pub fn forwarded_processor(
        mut self,
        processor: Arc<dyn Processor>,
        forwarder: Arc<dyn PeerForwarder>,
    ) -> Self {
        self.processors
            .push((SlotProcessors::Shared(processor), Some(forwarder)));
        self
    }

    /// Append a slot with one processor instance per worker
    ///
    /// Worker `i` always executes instance `i`; requires exactly as many
    /// instances as workers.
    #[must_use]
    pub fn worker_processors(
        mut self,
        instances: Vec<Arc<dyn Processor>>,
        forwarder: Option<Arc<dyn PeerForwarder>>,
    ) -> Self {
        self.processors
            .push((SlotProcessors::PerWorker(instances), forwarder));
        self
    }

    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn read_batch_size(mut self, size: usize) -> Self {
        self.read_batch_size = size.max(1);
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Assemble the pipeline
    ///
    /// Requires a source and at least one sink.
    pub fn build(self) -> Result<Arc<Pipeline>, PipelineError> {
        let source = self.source.ok_or_else(|| {
            PipelineError::InvalidConfiguration("pipeline requires a source".into())
        })?;
        if self.sinks.is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "pipeline requires at least one sink".into(),
            ));
        }
        let buffer = self
            .buffer
            .unwrap_or_else(|| Arc::new(BlockingBuffer::new(512, 128)));

        for (processors, _) in &self.processors {
            if let SlotProcessors::PerWorker(instances) = processors {
                if instances.len() != self.workers {
                    return Err(PipelineError::InvalidConfiguration(format!(
                        "per-worker slot has {} instances for {} workers",
                        instances.len(),
                        self.workers
                    )));
                }
            }
        }

        let processors = self
            .processors
            .into_iter()
            .map(|(processors, forwarder)| ProcessorSlot {
                serial: match &processors {
                    SlotProcessors::Shared(processor) if processor.is_single_thread() => {
                        Some(Mutex::new(()))
                    }
                    _ => None,
                },
                processors,
                forwarder,
            })
            .collect();

        Ok(Arc::new(Pipeline {
            name: self.name,
            source,
            buffer,
            processors,
            sinks: self.sinks,
            workers: self.workers,
            read_batch_size: self.read_batch_size,
            read_timeout: self.read_timeout,
            source_shutdown: CancellationToken::new(),
            drain: CancellationToken::new(),
            metrics: Arc::new(PipelineMetrics::new()),
            tasks: Mutex::new(Vec::new()),
        }))
    }
}
