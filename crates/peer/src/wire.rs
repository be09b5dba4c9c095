//! Peer-forwarder wire format
//!
//! JSON body of `POST /forward`:
//! `{ "pipelineName": ..., "pluginId": ..., "events": [ ... ] }` where each
//! event carries its type tag and body. The response is an empty `200 OK`.

use serde::{Deserialize, Serialize};

use sluice_event::{Event, Record, Value};

/// One serialized event on the wire
#[derive(Debug, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "eventType")]
    pub event_type: String,
    pub data: Value,
}

impl WireEvent {
    pub fn from_record(record: &Record) -> Self {
        let event = record.event();
        Self {
            event_type: event.metadata().event_type().to_string(),
            data: Value::Map(event.to_map()),
        }
    }

    /// Rebuild a record; non-map bodies collapse to an empty event
    pub fn into_record(self) -> Record {
        let data = match self.data {
            Value::Map(m) => m,
            _ => Default::default(),
        };
        Record::new(Event::builder(self.event_type).with_data_map(data).build())
    }
}

/// Request body of `POST /forward`
#[derive(Debug, Serialize, Deserialize)]
pub struct WireRequest {
    #[serde(rename = "pipelineName")]
    pub pipeline_name: String,
    #[serde(rename = "pluginId")]
    pub plugin_id: String,
    pub events: Vec<WireEvent>,
}
