//! Pipeline errors

use std::time::Duration;

use thiserror::Error;

/// Errors from buffer operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// The buffer stayed full past the write deadline
    #[error("buffer full after waiting {0:?}")]
    Full(Duration),

    /// The batch can never fit the buffer's capacity
    #[error("batch of {batch} records exceeds buffer capacity {capacity}")]
    BatchTooLarge { batch: usize, capacity: usize },

    /// The buffer is shutting down and refuses the operation
    #[error("buffer is shut down")]
    Shutdown,
}

/// Errors from processor execution
///
/// Processors recover per-record internally where the error has a known
/// per-record scope; an error escaping `execute` drops the whole batch.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// A worker observed an aborted barrier; non-retryable for this batch
    #[error("worker rendezvous barrier is broken")]
    BarrierBroken,

    /// Batch-scoped processing failure
    #[error("processor failed: {0}")]
    Failed(String),
}

impl ProcessorError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Errors from pipeline assembly and startup
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The builder was given an incomplete pipeline
    #[error("invalid pipeline: {0}")]
    InvalidConfiguration(String),

    /// A sink failed to initialize
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Errors surfaced by sinks
///
/// The executor logs these and moves on; retry and dead-lettering are the
/// sink's own responsibility.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink initialization failed; fatal to pipeline startup
    #[error("failed to initialize sink: {0}")]
    Init(String),

    /// Output failed after the sink exhausted its own recovery
    #[error("output failed: {0}")]
    Output(String),
}

impl SinkError {
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }
}
