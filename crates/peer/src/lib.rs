//! Sluice Peer Forwarder
//!
//! Partitions events across nodes so that all events sharing an
//! identification key land on the same node, which is what lets stateful
//! processors correlate across the whole fleet.
//!
//! # Architecture
//!
//! ```text
//! worker batch ──→ RemotePeerForwarder::forward
//!                      │ ring lookup per event
//!        ┌─────────────┴──────────────┐
//!   local residue            per-peer groups ──POST /forward──→ peer server
//!        │                                                          │
//!        └──────────── merged with receive() ←── ReceiveBuffer ◄────┘
//! ```
//!
//! # Key Design
//!
//! - **Deterministic ring**: identical membership yields identical
//!   placements on every node, so each key has exactly one home
//! - **Local fallback**: a failed send is processed locally rather than
//!   dropped; correlation quality degrades, delivery does not
//! - **Per-(pipeline, plugin) receive buffers**: a two-level registry keyed
//!   by the composite name, no back-references

mod client;
mod error;
mod forwarder;
mod provider;
mod ring;
mod server;
mod wire;

pub use client::PeerClient;
pub use error::PeerError;
pub use forwarder::{ForwarderMetrics, LocalPeerForwarder, RemotePeerForwarder};
pub use provider::{PeerForwarderProvider, ReceiveBufferRegistry};
pub use ring::HashRing;
pub use server::PeerForwarderServer;
pub use wire::{WireEvent, WireRequest};

/// Result type for peer-forwarder operations
pub type Result<T> = std::result::Result<T, PeerError>;

/// Separator joining identification-key values into a partition key
///
/// An ASCII unit separator, which cannot appear in rendered field values.
pub const KEY_SEPARATOR: char = '\u{1f}';

#[cfg(test)]
mod forwarder_test;
