//! The windowed span-joining processor
//!
//! One instance per worker, all sharing a [`ProcessorGroup`]. Every
//! `execute` first evaluates edges when the window has elapsed, then folds
//! the batch's spans into the current window.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use sluice_event::{Event, Record};
use sluice_pipeline::{Processor, ProcessorError};

use crate::group::ProcessorGroup;
use crate::state::SpanState;
use crate::EVENT_TYPE;

/// Span-joining processor instance; id 0 rotates the windows
pub struct ServiceMapProcessor {
    group: Arc<ProcessorGroup>,
    id: usize,
    identification_keys: Vec<String>,
}

impl ServiceMapProcessor {
    pub(crate) fn new(group: Arc<ProcessorGroup>, id: usize) -> Self {
        Self {
            group,
            id,
            identification_keys: vec!["traceId".to_string()],
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn is_master(&self) -> bool {
        self.id == 0
    }

    /// Fold one span event into the batch; spans without a service name are
    /// ignored, malformed ids are skipped with a warning
    fn process_span(
        &self,
        record: &Record,
        batch: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> Result<(), String> {
        let event = record.event();

        let service_name = match event.get_str("serviceName").map_err(|e| e.to_string())? {
            Some(name) => name.to_string(),
            None => return Ok(()),
        };
        let span_id = required_hex(event, "spanId")?;
        let trace_id = required_hex(event, "traceId")?;
        let parent_span_id = match event.get_str("parentSpanId").map_err(|e| e.to_string())? {
            Some("") | None => None,
            Some(parent) => Some(hex::decode(parent).map_err(|e| e.to_string())?),
        };
        let span_kind = event
            .get_str("kind")
            .map_err(|e| e.to_string())?
            .unwrap_or_default()
            .to_string();
        let span_name = event
            .get_str("name")
            .map_err(|e| e.to_string())?
            .unwrap_or_default()
            .to_string();

        let is_root = parent_span_id.is_none();
        let state = SpanState {
            service_name,
            parent_span_id,
            trace_id: trace_id.clone(),
            span_kind,
            span_name: span_name.clone(),
        };
        let bytes = serde_json::to_vec(&state).map_err(|e| e.to_string())?;
        batch.insert(span_id, bytes);

        if is_root {
            // the root span's name is the trace's group name
            self.group
                .insert_trace_group(trace_id, &span_name)
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Shard-iterate both windows, rendezvous, rotate, rendezvous again
    async fn evaluate_edges(&self) -> Result<Vec<Record>, ProcessorError> {
        let total_shards = self.group.registered_count();
        let relationships = self.group.evaluate_shard(total_shards, self.id);

        // all workers finish iterating before anything rotates
        self.group
            .barrier()
            .wait(self.group.cancel_token())
            .await
            .map_err(|_| ProcessorError::BarrierBroken)?;

        if self.is_master() {
            if let Err(e) = self.group.rotate_windows() {
                // release the parked workers before surfacing the failure
                self.group.barrier().abort();
                return Err(ProcessorError::failed(format!(
                    "window rotation failed: {e}"
                )));
            }
        }

        // nobody emits or starts the next window until rotation is visible
        self.group
            .barrier()
            .wait(self.group.cancel_token())
            .await
            .map_err(|_| ProcessorError::BarrierBroken)?;

        relationships
            .into_iter()
            .map(|relationship| {
                let json = serde_json::to_string(&relationship)
                    .map_err(|e| ProcessorError::failed(e.to_string()))?;
                let event = Event::from_json_str(EVENT_TYPE, &json)
                    .map_err(|e| ProcessorError::failed(e.to_string()))?;
                Ok(Record::new(event))
            })
            .collect()
    }
}

#[async_trait]
impl Processor for ServiceMapProcessor {
    async fn execute(&self, records: Vec<Record>) -> Result<Vec<Record>, ProcessorError> {
        let output = if self.group.window_duration_has_passed() {
            self.evaluate_edges().await?
        } else {
            Vec::new()
        };

        let mut batch = BTreeMap::new();
        for record in &records {
            if let Err(e) = self.process_span(record, &mut batch) {
                tracing::warn!(worker = self.id, error = %e, "skipping unusable span");
            }
        }
        if !batch.is_empty() {
            if let Err(e) = self.group.insert_spans(batch) {
                tracing::error!(worker = self.id, error = %e, "failed to store span batch");
            }
        }

        Ok(output)
    }

    fn prepare_for_shutdown(&self) {
        self.group.force_evaluation();
    }

    fn is_ready_for_shutdown(&self) -> bool {
        self.group.current_spans_empty()
    }

    async fn shutdown(&self) {
        self.group.delete_windows();
    }

    fn identification_keys(&self) -> Option<&[String]> {
        Some(&self.identification_keys)
    }

    fn is_single_thread(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "service_map"
    }
}

fn required_hex(event: &Event, key: &str) -> Result<Vec<u8>, String> {
    let value = event
        .get_str(key)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("span is missing {key}"))?;
    hex::decode(value).map_err(|e| format!("{key} is not hex: {e}"))
}
