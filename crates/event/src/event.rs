//! Event and event metadata
//!
//! An event is an ordered mapping from dotted string keys to dynamically
//! typed values plus a metadata record. All pipeline data is represented as
//! events; sources build them, processors mutate them, sinks serialize them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::key::KeyPath;
use crate::{Result, Value};

/// Metadata carried alongside the event body
///
/// The ingest timestamp is fixed at construction and never mutated; the
/// attribute map is free-form.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMetadata {
    event_type: String,
    ingest_time: DateTime<Utc>,
    attributes: BTreeMap<String, Value>,
}

impl EventMetadata {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn ingest_time(&self) -> DateTime<Utc> {
        self.ingest_time
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }
}

/// A semi-structured document flowing through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    metadata: EventMetadata,
    data: BTreeMap<String, Value>,
}

impl Event {
    /// Start building an event of the given type
    pub fn builder(event_type: impl Into<String>) -> EventBuilder {
        EventBuilder {
            event_type: event_type.into(),
            ingest_time: None,
            attributes: BTreeMap::new(),
            data: BTreeMap::new(),
        }
    }

    /// Parse an event body from a JSON string
    ///
    /// The JSON must be an object; metadata is fresh with the given type.
    pub fn from_json_str(event_type: &str, json: &str) -> Result<Self> {
        let data: BTreeMap<String, Value> = serde_json::from_str(json)?;
        Ok(Event::builder(event_type).with_data_map(data).build())
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut EventMetadata {
        &mut self.metadata
    }

    /// Get the value at a dotted key path
    ///
    /// `Ok(None)` means the path is valid but absent; a malformed key is an
    /// error.
    pub fn get(&self, key: &str) -> Result<Option<&Value>> {
        let path = KeyPath::parse(key)?;
        let (parents, last) = path.split_last();
        let mut map = &self.data;
        for segment in parents {
            map = match map.get(*segment) {
                Some(Value::Map(m)) => m,
                // A scalar mid-path means deeper segments are absent
                _ => return Ok(None),
            };
        }
        Ok(map.get(last))
    }

    /// Get a string field
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        Ok(self.get(key)?.and_then(Value::as_str))
    }

    /// Get an integer field
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self.get(key)?.and_then(Value::as_i64))
    }

    /// Set the value at a dotted key path, creating intermediate maps
    ///
    /// A non-map value sitting mid-path is replaced by a map.
    pub fn put(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let path = KeyPath::parse(key)?;
        let (parents, last) = path.split_last();
        let mut map = &mut self.data;
        for segment in parents {
            let entry = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !matches!(entry, Value::Map(_)) {
                *entry = Value::Map(BTreeMap::new());
            }
            map = match entry {
                Value::Map(m) => m,
                _ => unreachable!(),
            };
        }
        map.insert(last.to_string(), value.into());
        Ok(())
    }

    /// Delete the value at a dotted key path; absent paths are a no-op
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let path = KeyPath::parse(key)?;
        let (parents, last) = path.split_last();
        let mut map = &mut self.data;
        for segment in parents {
            map = match map.get_mut(*segment) {
                Some(Value::Map(m)) => m,
                _ => return Ok(()),
            };
        }
        map.remove(last);
        Ok(())
    }

    /// True when the key resolves to any value
    pub fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// True when the key resolves to a list value
    pub fn is_list(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.map(Value::is_list).unwrap_or(false))
    }

    /// Deep copy of the event body as a plain map
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.data.clone()
    }

    /// Canonical JSON serialization of the event body
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&Value::Map(self.data.clone()))?)
    }
}

/// Builder for [`Event`]
pub struct EventBuilder {
    event_type: String,
    ingest_time: Option<DateTime<Utc>>,
    attributes: BTreeMap<String, Value>,
    data: BTreeMap<String, Value>,
}

impl EventBuilder {
    /// Override the ingest timestamp (defaults to now)
    #[must_use]
    pub fn with_ingest_time(mut self, time: DateTime<Utc>) -> Self {
        self.ingest_time = Some(time);
        self
    }

    /// Add a metadata attribute
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a top-level data field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Replace the event body wholesale
    #[must_use]
    pub fn with_data_map(mut self, data: BTreeMap<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> Event {
        Event {
            metadata: EventMetadata {
                event_type: self.event_type,
                ingest_time: self.ingest_time.unwrap_or_else(Utc::now),
                attributes: self.attributes,
            },
            data: self.data,
        }
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
