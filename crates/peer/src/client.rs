//! HTTP client for the peer-forwarder RPC

use std::time::Duration;

use crate::wire::WireRequest;
use crate::{PeerError, Result};

/// Dispatches event groups to peer nodes
///
/// One client is shared by every forwarder on the node; reqwest pools
/// connections per peer underneath.
#[derive(Debug, Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    port: u16,
}

impl PeerClient {
    /// Build a client targeting the given peer-forwarder port
    pub fn new(port: u16, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PeerError::Network(e.to_string()))?;
        Ok(Self { http, port })
    }

    /// POST one request to a peer; success is any 2xx
    pub async fn send(&self, peer: &str, request: &WireRequest) -> Result<()> {
        let url = self.url_for(peer);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| PeerError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(PeerError::Status(status.as_u16()))
        }
    }

    /// `host` endpoints get the configured port appended; `host:port`
    /// endpoints are used as-is
    fn url_for(&self, peer: &str) -> String {
        if peer.rfind(':').map(|i| i > peer.rfind(']').unwrap_or(0)) == Some(true) {
            format!("http://{peer}/forward")
        } else {
            format!("http://{peer}:{}/forward", self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_appends_port_only_when_missing() {
        let client = PeerClient::new(4994, Duration::from_secs(1)).unwrap();
        assert_eq!(client.url_for("node-0"), "http://node-0:4994/forward");
        assert_eq!(client.url_for("node-0:9999"), "http://node-0:9999/forward");
    }
}
