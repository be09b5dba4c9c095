//! Component contracts for pipeline assembly
//!
//! A pipeline is one source, one buffer, an ordered processor chain, and one
//! or more sinks. Stateful processors that need cross-event correlation
//! declare identification keys and are paired with a peer forwarder by the
//! pipeline assembler.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sluice_event::Record;

use crate::{BlockingBuffer, ProcessorError, SinkError};

/// Produces records into the pipeline's buffer
#[async_trait]
pub trait Source: Send + Sync {
    /// Run until the token is cancelled, writing records into the buffer
    async fn run(&self, buffer: Arc<BlockingBuffer>, shutdown: CancellationToken);

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Transforms batches of records
///
/// `execute` may add, drop, or replace records. Errors escaping `execute`
/// drop the whole batch; per-record recovery belongs inside the processor.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn execute(&self, records: Vec<Record>) -> Result<Vec<Record>, ProcessorError>;

    /// Broadcast before shutdown so timers and windows can flush
    fn prepare_for_shutdown(&self);

    /// True once all internal state has drained
    fn is_ready_for_shutdown(&self) -> bool;

    /// Release resources; called after the workers stop
    async fn shutdown(&self);

    /// Field names whose values partition events across peers
    ///
    /// `Some` declares that this processor requires peer forwarding.
    fn identification_keys(&self) -> Option<&[String]> {
        None
    }

    /// True when `execute` must never run concurrently with itself
    fn is_single_thread(&self) -> bool {
        false
    }

    /// Processor name for logging
    fn name(&self) -> &str;
}

/// Consumes processor output
///
/// Sinks own their retry and dead-letter discipline; the executor only logs
/// output errors.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Acquire clients and files; failure is fatal to pipeline startup
    async fn initialize(&self) -> Result<(), SinkError>;

    async fn output(&self, records: Vec<Record>) -> Result<(), SinkError>;

    async fn shutdown(&self);

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// Routes events that belong on other nodes before a stateful processor runs
///
/// Implemented by `sluice-peer`; the executor only consumes the contract.
#[async_trait]
pub trait PeerForwarder: Send + Sync + std::fmt::Debug {
    /// Partition a batch, dispatch remote groups, and return the records
    /// that stay local (including any that fell back after a failed send)
    async fn forward(&self, records: Vec<Record>) -> Vec<Record>;

    /// Drain records other nodes forwarded here, without blocking
    async fn receive(&self) -> Vec<Record>;
}
