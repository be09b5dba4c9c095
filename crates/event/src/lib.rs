//! Sluice Event Model
//!
//! This crate provides the foundational types that flow through a pipeline:
//! - `Value` - Dynamically typed document value (null, bool, int, float,
//!   string, bytes, list, map)
//! - `Event` - Semi-structured document addressed by dotted key paths, plus
//!   `EventMetadata` (type tag, ingest timestamp, attributes)
//! - `Record` - Thin single-event envelope handed between pipeline components
//!
//! # Design Principles
//!
//! - **Explicit typing**: No runtime reflection; `Value` is a sum type with
//!   typed accessors that fail cleanly on mismatch
//! - **JSON round-trip**: `Event::from_json_str(e.to_json_string())` yields
//!   an event whose data deep-equals the original
//! - **Validated keys**: Dotted paths are checked up front; malformed keys
//!   are an `EventError::InvalidKey`, never a silent miss

mod error;
mod event;
mod key;
mod record;
mod value;

pub use error::EventError;
pub use event::{Event, EventBuilder, EventMetadata};
pub use record::Record;
pub use value::Value;

/// Result type for event operations
pub type Result<T> = std::result::Result<T, EventError>;
