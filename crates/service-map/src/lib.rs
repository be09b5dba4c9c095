//! Sluice Service Map
//!
//! Joins parent and child spans across two rotating time windows to emit
//! service-to-service relationship edges. Rides on peer forwarding: all
//! spans of one trace land on one node, partitioned by `traceId`.
//!
//! # Architecture
//!
//! ```text
//! execute(batch)
//!   ├── window elapsed? ── evaluate_edges ── shard iterate prev ∪ current
//!   │                         │  barrier ── master rotates windows ── barrier
//!   └── insert spans into current window; roots into trace groups
//! ```
//!
//! # Key Design
//!
//! - **ProcessorGroup**: one value owning the four windows, the barrier, the
//!   relationship set, and the worker registry; processor instances hold a
//!   back-reference and the instance registered first is the rotation master
//! - **Two rotating windows**: a join only needs the current window plus one
//!   window of history; rotation swaps and clears under a full rendezvous so
//!   no worker observes a half-rotated state
//! - **On-disk windows**: ordered byte-keyed stores backed by append-only
//!   files, sharded deterministically across workers for iteration

mod barrier;
mod group;
mod processor;
mod state;
mod store;

pub use barrier::{BarrierError, CyclicBarrier};
pub use group::{Clock, ProcessorGroup, ServiceMapMetrics, SystemClock};
pub use processor::ServiceMapProcessor;
pub use state::{RelationshipEndpoint, ServiceMapRelationship, SpanState};
pub use store::WindowStore;

/// Event type tag of emitted relationship records
pub const EVENT_TYPE: &str = "event";
