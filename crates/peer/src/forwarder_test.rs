//! Peer forwarding tests
//!
//! Two provider instances play the two nodes of a ring; the "remote" node
//! runs a real server on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use sluice_config::{DiscoveryMode, PeerForwarderConfig};
use sluice_event::{Event, Record};
use sluice_pipeline::PeerForwarder as _;

use crate::provider::PeerForwarderProvider;
use crate::server::PeerForwarderServer;
use crate::{HashRing, PeerError};

fn span_record(trace_id: &str) -> Record {
    Record::new(
        Event::builder("trace")
            .with_field("traceId", trace_id)
            .with_field("spanId", format!("span-{trace_id}"))
            .build(),
    )
}

fn config_for(endpoints: Vec<String>) -> PeerForwarderConfig {
    PeerForwarderConfig {
        discovery_mode: DiscoveryMode::Static,
        static_endpoints: endpoints,
        target_batch_timeout_ms: 500,
        ..Default::default()
    }
}

async fn spawn_server(provider: &PeerForwarderProvider) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = PeerForwarderServer::new(provider.registry()).router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn events_partition_between_local_and_remote() {
    // node B binds first so both nodes can agree on the membership list
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr_b = listener.local_addr().unwrap();
    let endpoint_b = format!("127.0.0.1:{}", addr_b.port());
    let endpoints = vec!["node-a".to_string(), endpoint_b.clone()];

    let provider_b = PeerForwarderProvider::new(config_for(endpoints.clone()), &endpoint_b)
        .await
        .unwrap();
    let forwarder_b = provider_b
        .register("traces", "service-map", vec!["traceId".to_string()])
        .unwrap();
    let router = PeerForwarderServer::new(provider_b.registry()).router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let provider_a = PeerForwarderProvider::new(config_for(endpoints.clone()), "node-a")
        .await
        .unwrap();
    assert!(provider_a.is_peer_forwarding_required());
    let forwarder_a = provider_a
        .register("traces", "service-map", vec!["traceId".to_string()])
        .unwrap();

    let trace_ids: Vec<String> = (0..32).map(|i| format!("T{i}")).collect();
    let batch: Vec<Record> = trace_ids.iter().map(|t| span_record(t)).collect();

    let local = forwarder_a.forward(batch).await;

    // expected placement straight from an identically-built ring
    let ring = HashRing::new(endpoints, PeerForwarderConfig::default().virtual_nodes_per_peer);
    let expect_local: Vec<&String> = trace_ids
        .iter()
        .filter(|t| ring.peer_for(t.as_bytes()) == Some("node-a"))
        .collect();
    let expect_remote: Vec<&String> = trace_ids
        .iter()
        .filter(|t| ring.peer_for(t.as_bytes()) == Some(endpoint_b.as_str()))
        .collect();
    assert_eq!(expect_local.len() + expect_remote.len(), 32);

    let local_ids: Vec<String> = local
        .iter()
        .map(|r| r.event().get_str("traceId").unwrap().unwrap().to_string())
        .collect();
    assert_eq!(local_ids.len(), expect_local.len());
    for id in &expect_local {
        assert!(local_ids.contains(id));
    }

    // the forwarded records land in node B's receive buffer
    let mut received = Vec::new();
    for _ in 0..50 {
        received.extend(forwarder_b.receive().await);
        if received.len() >= expect_remote.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let received_ids: Vec<String> = received
        .iter()
        .map(|r| r.event().get_str("traceId").unwrap().unwrap().to_string())
        .collect();
    assert_eq!(received_ids.len(), expect_remote.len());
    for id in &expect_remote {
        assert!(received_ids.contains(id));
    }
}

#[tokio::test]
async fn missing_identification_key_stays_local() {
    let provider = PeerForwarderProvider::new(
        config_for(vec!["node-a".into(), "node-b".into()]),
        "node-a",
    )
    .await
    .unwrap();
    let forwarder = provider
        .register("traces", "service-map", vec!["traceId".to_string()])
        .unwrap();

    let record = Record::new(Event::builder("trace").with_field("other", 1i64).build());
    let local = forwarder.forward(vec![record]).await;
    assert_eq!(local.len(), 1);
}

#[tokio::test]
async fn failed_send_falls_back_to_local() {
    // node-b points at a port nobody listens on
    let provider = PeerForwarderProvider::new(
        config_for(vec!["node-a".into(), "127.0.0.1:9".into()]),
        "node-a",
    )
    .await
    .unwrap();
    let forwarder = provider
        .register("traces", "service-map", vec!["traceId".to_string()])
        .unwrap();

    let batch: Vec<Record> = (0..32).map(|i| span_record(&format!("T{i}"))).collect();
    let local = forwarder.forward(batch).await;

    // every record survives, remote or not
    assert_eq!(local.len(), 32);
}

#[tokio::test]
async fn single_node_discovery_short_circuits() {
    let config = PeerForwarderConfig::default();
    let provider = PeerForwarderProvider::new(config, "node-a").await.unwrap();
    assert!(!provider.is_peer_forwarding_required());

    let forwarder = provider
        .register("traces", "service-map", vec!["traceId".to_string()])
        .unwrap();
    let batch: Vec<Record> = (0..4).map(|i| span_record(&format!("T{i}"))).collect();
    assert_eq!(forwarder.forward(batch).await.len(), 4);
    assert!(forwarder.receive().await.is_empty());
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let provider = PeerForwarderProvider::new(PeerForwarderConfig::default(), "node-a")
        .await
        .unwrap();
    provider
        .register("traces", "service-map", vec!["traceId".to_string()])
        .unwrap();
    let err = provider
        .register("traces", "service-map", vec!["traceId".to_string()])
        .unwrap_err();
    assert!(matches!(err, PeerError::AlreadyRegistered { .. }));
}

#[tokio::test]
async fn unknown_pipeline_returns_not_found() {
    let provider = PeerForwarderProvider::new(PeerForwarderConfig::default(), "node-a")
        .await
        .unwrap();
    let addr = spawn_server(&provider).await;

    let client = crate::PeerClient::new(addr.port(), Duration::from_secs(1)).unwrap();
    let request = crate::WireRequest {
        pipeline_name: "nope".into(),
        plugin_id: "nope".into(),
        events: Vec::new(),
    };
    let err = client.send("127.0.0.1", &request).await.unwrap_err();
    assert!(matches!(err, PeerError::Status(404)));
}

#[tokio::test]
async fn cloud_map_discovery_is_rejected() {
    let config = PeerForwarderConfig {
        discovery_mode: DiscoveryMode::AwsCloudMap,
        ..Default::default()
    };
    let err = PeerForwarderProvider::new(config, "node-a").await.unwrap_err();
    assert!(matches!(err, PeerError::UnsupportedDiscovery(_)));
}
