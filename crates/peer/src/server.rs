//! Peer-forwarder HTTP server
//!
//! Receives forwarded event groups and appends them to the matching
//! receive buffer. Unknown (pipeline, plugin) pairs are a 404; a full
//! buffer is a 503, which makes the sender fall back to local processing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

use crate::provider::ReceiveBufferRegistry;
use crate::wire::WireRequest;
use crate::{PeerError, Result};

/// Wait applied when appending into a receive buffer
const RECEIVE_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Serves `POST /forward` for the peers of this node
pub struct PeerForwarderServer {
    registry: Arc<ReceiveBufferRegistry>,
}

impl PeerForwarderServer {
    pub fn new(registry: Arc<ReceiveBufferRegistry>) -> Self {
        Self { registry }
    }

    /// The axum router, for embedding or tests
    pub fn router(&self) -> Router {
        Router::new()
            .route("/forward", post(forward))
            .route("/health", get(health))
            .with_state(Arc::clone(&self.registry))
    }

    /// Bind and serve until the process exits
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| PeerError::Network(e.to_string()))?;
        tracing::info!(%addr, "peer forwarder server listening");
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| PeerError::Network(e.to_string()))
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn forward(
    State(registry): State<Arc<ReceiveBufferRegistry>>,
    Json(request): Json<WireRequest>,
) -> StatusCode {
    let Some(buffer) = registry.get(&request.pipeline_name, &request.plugin_id) else {
        tracing::warn!(
            pipeline = %request.pipeline_name,
            plugin = %request.plugin_id,
            "forward request for unknown pipeline/plugin"
        );
        return StatusCode::NOT_FOUND;
    };

    let count = request.events.len();
    let records = request
        .events
        .into_iter()
        .map(|event| event.into_record())
        .collect();

    match buffer.write_all(records, RECEIVE_WRITE_TIMEOUT).await {
        Ok(()) => {
            tracing::trace!(
                pipeline = %request.pipeline_name,
                plugin = %request.plugin_id,
                records = count,
                "received forwarded records"
            );
            StatusCode::OK
        }
        Err(e) => {
            tracing::warn!(
                pipeline = %request.pipeline_name,
                plugin = %request.plugin_id,
                error = %e,
                "receive buffer rejected forwarded records"
            );
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
