//! Sluice Pipeline - Execution substrate
//!
//! The bounded buffer and the worker loop that connect sources to sinks.
//!
//! # Architecture
//!
//! ```text
//! [Source] ──write──→ [BlockingBuffer] ──read-batch──→ [Worker 0..N]
//!                                                         │
//!                              processor chain (peer-forward merge)
//!                                                         │
//!                                            fan-out to every [Sink]
//!                                                         │
//!                                                    checkpoint
//! ```
//!
//! # Key Design
//!
//! - **Checkpointed reads**: buffer capacity is released at checkpoint, not
//!   at read; un-checkpointed batches are redelivered after a visibility
//!   timeout
//! - **Symmetric workers**: N identical worker tasks per pipeline; order is
//!   preserved within a worker, not across workers
//! - **Two-phase shutdown**: processors get `prepare_for_shutdown()` first,
//!   workers drain until the buffer is empty and every processor reports
//!   ready, then components shut down in reverse dependency order
//! - **Cooperative cancellation**: every blocking call takes a deadline and
//!   returns `Shutdown` once the owning component is closing

mod buffer;
mod error;
mod metrics;
mod pipeline;
mod traits;

pub use buffer::{BlockingBuffer, BufferMetrics, CheckpointToken, DEFAULT_VISIBILITY_TIMEOUT};
pub use error::{BufferError, PipelineError, ProcessorError, SinkError};
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot};
pub use pipeline::{Pipeline, PipelineBuilder, DEFAULT_DRAIN_TIMEOUT};
pub use traits::{PeerForwarder, Processor, Sink, Source};

// Re-export the data model for convenience
pub use sluice_event::{Event, Record};

/// Default number of worker tasks per pipeline
pub const DEFAULT_WORKERS: usize = 1;

/// Default read batch size
pub const DEFAULT_READ_BATCH_SIZE: usize = 128;

#[cfg(test)]
mod buffer_test;
#[cfg(test)]
mod pipeline_test;
