//! Cluster client abstraction and the HTTP implementation
//!
//! `BulkClient` isolates everything that talks to the destination cluster:
//! the `_bulk` endpoint, the administrative calls used by index management,
//! and a liveness probe. Per-item failures come back pre-classified into
//! `ErrorKind`, so retry decisions are a match on the kind, not string
//! inspection at the call site.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use sluice_config::BulkSinkConfig;

use crate::bulk::accumulator::AccumulatingBulkRequest;
use crate::BulkSinkError;

/// Classified outcome of one bulk response item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation succeeded
    None,
    /// Mapping, parse, or id-shaped failure; retrying cannot help
    DocumentLevel,
    /// The document version already exists
    VersionConflict,
    /// The cluster asked for backoff
    TooManyRequests,
    /// The bulk queue rejected the operation
    Rejected,
    /// A 5xx on this item
    ServerError,
    /// The whole request never got a response
    Network,
    /// Anything the classifier does not recognize
    Unknown,
}

impl ErrorKind {
    /// Kinds worth re-sending
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::TooManyRequests | ErrorKind::Rejected | ErrorKind::ServerError
        )
    }
}

/// One per-operation entry of a bulk response
#[derive(Debug, Clone)]
pub struct BulkResponseEntry {
    pub operation_index: usize,
    pub status_code: u16,
    pub error_kind: ErrorKind,
    pub message: Option<String>,
}

/// Parsed bulk response, one entry per submitted operation
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    pub entries: Vec<BulkResponseEntry>,
}

/// Errors for whole requests that never produced per-item entries
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Transport failure; every operation of the request is retryable
    #[error("network error: {0}")]
    Network(String),

    /// The cluster answered with an API error
    #[error("cluster returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body was not understood
    #[error("malformed cluster response: {0}")]
    Protocol(String),
}

/// Everything the bulk sink needs from the destination cluster
#[async_trait]
pub trait BulkClient: Send + Sync {
    /// Submit a bulk request
    async fn bulk(&self, request: &AccumulatingBulkRequest) -> Result<BulkResponse, ClusterError>;

    /// Cheap liveness probe used to qualify transport failures
    async fn ping(&self) -> Result<(), ClusterError>;

    /// Idempotent lifecycle-policy install
    async fn put_lifecycle_policy(&self, name: &str, body: &str) -> Result<(), ClusterError>;

    async fn alias_exists(&self, alias: &str) -> Result<bool, ClusterError>;

    /// Create an index, optionally bound to a write alias
    async fn create_index(&self, name: &str, write_alias: Option<&str>) -> Result<(), ClusterError>;

    async fn index_exists(&self, name: &str) -> Result<bool, ClusterError>;

    async fn template_exists(&self, name: &str) -> Result<bool, ClusterError>;

    async fn put_template(&self, name: &str, body: &str) -> Result<(), ClusterError>;
}

/// Classify one response item from its status code and error type string
pub(crate) fn classify(status: u16, error_type: Option<&str>) -> ErrorKind {
    if (200..300).contains(&status) {
        return ErrorKind::None;
    }
    if status == 409 {
        return ErrorKind::VersionConflict;
    }
    if status == 429 {
        return ErrorKind::TooManyRequests;
    }
    if let Some(error_type) = error_type {
        if error_type.contains("rejected_execution") {
            return ErrorKind::Rejected;
        }
        if error_type.contains("version_conflict") {
            return ErrorKind::VersionConflict;
        }
        if error_type.contains("mapper_parsing")
            || error_type.contains("illegal_argument")
            || error_type.contains("document_parsing")
            || error_type.contains("validation_exception")
        {
            return ErrorKind::DocumentLevel;
        }
    }
    if status >= 500 {
        return ErrorKind::ServerError;
    }
    if status == 400 {
        return ErrorKind::DocumentLevel;
    }
    ErrorKind::Unknown
}

// =============================================================================
// HTTP implementation
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireBulkResponse {
    items: Vec<WireBulkItem>,
}

#[derive(Debug, Deserialize)]
struct WireBulkItem {
    #[serde(alias = "create")]
    index: WireBulkItemBody,
}

#[derive(Debug, Deserialize)]
struct WireBulkItemBody {
    status: u16,
    error: Option<WireBulkError>,
}

#[derive(Debug, Deserialize)]
struct WireBulkError {
    #[serde(rename = "type")]
    error_type: Option<String>,
    reason: Option<String>,
}

/// reqwest-backed client rotating across the configured hosts
pub struct HttpBulkClient {
    http: reqwest::Client,
    hosts: Vec<String>,
    username: Option<String>,
    password: Option<String>,
    next_host: AtomicUsize,
}

impl HttpBulkClient {
    pub fn new(config: &BulkSinkConfig) -> Result<Self, BulkSinkError> {
        let mut builder = reqwest::Client::builder();
        if let Some(connect_ms) = config.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(connect_ms));
        }
        if let Some(socket_ms) = config.socket_timeout_ms {
            builder = builder.timeout(Duration::from_millis(socket_ms));
        }
        let http = builder
            .build()
            .map_err(|e| BulkSinkError::init(e.to_string()))?;
        Ok(Self {
            http,
            hosts: config.hosts.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            next_host: AtomicUsize::new(0),
        })
    }

    fn host(&self) -> &str {
        let index = self.next_host.fetch_add(1, Ordering::Relaxed);
        &self.hosts[index % self.hosts.len()]
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.host().trim_end_matches('/'), path);
        let mut builder = self.http.request(method, url);
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClusterError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ClusterError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl BulkClient for HttpBulkClient {
    async fn bulk(&self, request: &AccumulatingBulkRequest) -> Result<BulkResponse, ClusterError> {
        let response = self
            .request(reqwest::Method::POST, "/_bulk")
            .header("content-type", "application/x-ndjson")
            .body(request.to_wire_bytes())
            .send()
            .await
            .map_err(|e| ClusterError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let wire: WireBulkResponse = response
            .json()
            .await
            .map_err(|e| ClusterError::Protocol(e.to_string()))?;

        if wire.items.len() != request.len() {
            return Err(ClusterError::Protocol(format!(
                "expected {} response items, got {}",
                request.len(),
                wire.items.len()
            )));
        }

        let entries = wire
            .items
            .into_iter()
            .enumerate()
            .map(|(operation_index, item)| {
                let body = item.index;
                let error_type = body.error.as_ref().and_then(|e| e.error_type.as_deref());
                BulkResponseEntry {
                    operation_index,
                    status_code: body.status,
                    error_kind: classify(body.status, error_type),
                    message: body.error.and_then(|e| e.reason),
                }
            })
            .collect();

        Ok(BulkResponse { entries })
    }

    async fn ping(&self) -> Result<(), ClusterError> {
        let response = self
            .request(reqwest::Method::GET, "/")
            .send()
            .await
            .map_err(|e| ClusterError::Network(e.to_string()))?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn put_lifecycle_policy(&self, name: &str, body: &str) -> Result<(), ClusterError> {
        let response = self
            .request(
                reqwest::Method::PUT,
                &format!("/_plugins/_ism/policies/{name}"),
            )
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ClusterError::Network(e.to_string()))?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn alias_exists(&self, alias: &str) -> Result<bool, ClusterError> {
        let response = self
            .request(reqwest::Method::HEAD, &format!("/_alias/{alias}"))
            .send()
            .await
            .map_err(|e| ClusterError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn create_index(&self, name: &str, write_alias: Option<&str>) -> Result<(), ClusterError> {
        let body = match write_alias {
            Some(alias) => {
                format!(r#"{{"aliases":{{"{alias}":{{"is_write_index":true}}}}}}"#)
            }
            None => "{}".to_string(),
        };
        let response = self
            .request(reqwest::Method::PUT, &format!("/{name}"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| ClusterError::Network(e.to_string()))?;
        Self::check_status(response).await.map(|_| ())
    }

    async fn index_exists(&self, name: &str) -> Result<bool, ClusterError> {
        let response = self
            .request(reqwest::Method::HEAD, &format!("/{name}"))
            .send()
            .await
            .map_err(|e| ClusterError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn template_exists(&self, name: &str) -> Result<bool, ClusterError> {
        let response = self
            .request(reqwest::Method::HEAD, &format!("/_index_template/{name}"))
            .send()
            .await
            .map_err(|e| ClusterError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }

    async fn put_template(&self, name: &str, body: &str) -> Result<(), ClusterError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/_index_template/{name}"))
            .header("content-type", "application/json")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| ClusterError::Network(e.to_string()))?;
        Self::check_status(response).await.map(|_| ())
    }
}
