//! Sluice Sinks
//!
//! Destination plugins consuming processor output. The bulk sink batches
//! serialized events into size-bounded bulk requests, classifies per-item
//! failures for retry, and dead-letters what cannot be delivered.
//!
//! # Design
//!
//! - **Size-bounded accumulation**: operations append to the current request
//!   only while the wire estimate stays under `bulk_size_bytes`; the first
//!   operation always fits, so single oversized documents still ship
//! - **Classified retry**: per-item error kinds drive the retry decision;
//!   only the retryable subset is re-sent, with capped exponential backoff
//!   and jitter
//! - **Dead-letter file**: newline-delimited JSON, opened append-only, one
//!   line per abandoned operation
//! - **Pluggable cluster client**: the `BulkClient` trait isolates the HTTP
//!   layer; tests drive the sink against an in-process mock

mod bulk;
mod error;

pub use bulk::accumulator::{AccumulatingBulkRequest, BulkOperation};
pub use bulk::client::{
    BulkClient, BulkResponse, BulkResponseEntry, ClusterError, ErrorKind, HttpBulkClient,
};
pub use bulk::dlq::DlqWriter;
pub use bulk::index::IndexManager;
pub use bulk::metrics::{BulkSinkMetrics, BulkSinkMetricsSnapshot};
pub use bulk::retry::{BulkRetryPolicy, FailedOperation, FlushResult, RetryConfig};
pub use bulk::BulkSink;
pub use error::BulkSinkError;

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, BulkSinkError>;
