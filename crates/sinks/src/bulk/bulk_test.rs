//! Bulk sink end-to-end tests against the scripted cluster
//!
//! Covers the flush threshold, create idempotence, mapping failures into the
//! dead-letter file, and document-id extraction.

use std::sync::Arc;

use sluice_config::{BulkAction, BulkSinkConfig, IndexType};
use sluice_event::{Event, Record};
use sluice_pipeline::Sink;

use crate::bulk::client::ErrorKind;
use crate::bulk::testing::{MockBulkClient, ScriptedBulk};
use crate::bulk::BulkSink;
use crate::BulkOperation;

fn base_config() -> BulkSinkConfig {
    BulkSinkConfig {
        hosts: vec!["http://localhost:9200".into()],
        index: "traces".into(),
        index_type: IndexType::ManagementDisabled,
        ..Default::default()
    }
}

/// A record whose bulk operation is exactly `target` wire bytes
fn record_of_op_size(target: usize) -> Record {
    // op size = metadata(29 for index "traces", no id) + doc + 2 newlines
    let metadata = BulkOperation::new(BulkAction::Index, "traces".into(), None, "{}".into())
        .metadata_line()
        .len();
    // doc shape {"m":"..."} costs 8 bytes around the payload
    let payload_len = target - metadata - 2 - 8;
    Record::new(
        Event::builder("log")
            .with_field("m", "x".repeat(payload_len))
            .build(),
    )
}

#[tokio::test]
async fn flush_threshold_splits_at_the_size_bound() {
    // ten 60-byte operations against a 500-byte bound: 8 + residual 2
    let client = Arc::new(MockBulkClient::new());
    let sink = BulkSink::with_client(base_config(), client.clone(), "traces")
        .with_bulk_size_bytes(500);
    sink.initialize().await.unwrap();

    let records: Vec<Record> = (0..10).map(|_| record_of_op_size(60)).collect();
    sink.output(records).await.unwrap();

    assert_eq!(client.bulk_call_count(), 2);
    assert_eq!(client.call_documents(0).len(), 8);
    assert_eq!(client.call_documents(1).len(), 2);

    // every flushed request respected the bound
    let calls = client.bulk_calls.lock().unwrap();
    for ops in calls.iter() {
        let size: usize = ops.iter().map(BulkOperation::size_bytes).sum();
        assert!(size < 500);
    }
}

#[tokio::test]
async fn single_oversized_operation_still_ships() {
    let client = Arc::new(MockBulkClient::new());
    let sink = BulkSink::with_client(base_config(), client.clone(), "traces")
        .with_bulk_size_bytes(100);
    sink.initialize().await.unwrap();

    sink.output(vec![record_of_op_size(400)]).await.unwrap();

    assert_eq!(client.bulk_call_count(), 1);
    assert_eq!(client.call_documents(0).len(), 1);
}

#[tokio::test]
async fn empty_input_is_a_no_op() {
    let client = Arc::new(MockBulkClient::new());
    let sink = BulkSink::with_client(base_config(), client.clone(), "traces");
    sink.initialize().await.unwrap();

    sink.output(Vec::new()).await.unwrap();
    assert_eq!(client.bulk_call_count(), 0);
}

#[tokio::test]
async fn replayed_create_with_id_is_idempotent() {
    // first send succeeds; the replay reports a version conflict that the
    // sink treats as success, and the dead-letter file stays empty
    let dir = tempfile::tempdir().unwrap();
    let dlq_path = dir.path().join("dlq.jsonl");

    let mut config = base_config();
    config.action = BulkAction::Create;
    config.document_id_field = Some("id".into());
    config.dlq_file = Some(dlq_path.to_string_lossy().into_owned());

    let client = Arc::new(MockBulkClient::new());
    let sink = BulkSink::with_client(config, client.clone(), "traces");
    sink.initialize().await.unwrap();

    let event = Event::builder("log").with_field("id", "abc").build();

    sink.output(vec![Record::new(event.clone())]).await.unwrap();
    client.push_bulk(ScriptedBulk::Entries(vec![ErrorKind::VersionConflict]));
    sink.output(vec![Record::new(event)]).await.unwrap();

    let snapshot = sink.metrics().snapshot();
    assert_eq!(snapshot.records_indexed, 2);
    assert_eq!(snapshot.dlq_writes, 0);
    assert_eq!(snapshot.version_conflicts, 1);

    // both requests carried the explicit id
    let calls = client.bulk_calls.lock().unwrap();
    assert!(calls
        .iter()
        .all(|ops| ops[0].document_id() == Some("abc")));
    drop(calls);

    sink.shutdown().await;
    let contents = std::fs::read_to_string(&dlq_path).unwrap();
    assert!(contents.is_empty());
}

#[tokio::test]
async fn mapping_failure_lands_in_the_dead_letter_file() {
    let dir = tempfile::tempdir().unwrap();
    let dlq_path = dir.path().join("dlq.jsonl");

    let mut config = base_config();
    config.dlq_file = Some(dlq_path.to_string_lossy().into_owned());
    config.max_retries = Some(2);

    let client = Arc::new(MockBulkClient::new());
    client.push_bulk(ScriptedBulk::Entries(vec![ErrorKind::DocumentLevel]));
    let sink = BulkSink::with_client(config, client.clone(), "traces");
    sink.initialize().await.unwrap();

    let record = Record::new(Event::builder("log").with_field("badfield", 1i64).build());
    sink.output(vec![record]).await.unwrap();
    sink.shutdown().await;

    let contents = std::fs::read_to_string(&dlq_path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);

    let line: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(line["document"]["badfield"], 1);
    assert!(line["failure"]
        .as_str()
        .unwrap()
        .contains("mapper_parsing_exception"));
    assert_eq!(line["pipelineName"], "traces");

    // document-level errors are never retried
    assert_eq!(client.bulk_call_count(), 1);
}

#[tokio::test]
async fn initialization_runs_index_management_once() {
    let client = Arc::new(MockBulkClient::new());
    let mut config = base_config();
    config.index_type = IndexType::TraceAnalyticsRaw;
    let sink = BulkSink::with_client(config, client.clone(), "traces");

    sink.initialize().await.unwrap();
    sink.initialize().await.unwrap();

    assert_eq!(client.policy_puts.lock().unwrap().len(), 1);
    assert_eq!(client.created.lock().unwrap().len(), 1);
}
