//! services/generator/src/orchestrator/gateway.rs
//!
//! Sends a generation request to the primary endpoint and fails over to the
//! fallback on server errors, connection failures and deadline expiry.

use devotional_core::ports::{Transport, TransportResponse};
use devotional_core::GenerationError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ordered candidate endpoints in front of one transport.
#[derive(Clone)]
pub struct BackendGateway {
    transport: Arc<dyn Transport>,
    endpoints: Vec<String>,
}

impl BackendGateway {
    /// Creates a gateway trying `primary` first, then `fallback` when it is set
    /// and differs from the primary.
    pub fn new(transport: Arc<dyn Transport>, primary: impl Into<String>, fallback: Option<String>) -> Self {
        let primary = primary.into();
        let mut endpoints = vec![primary.clone()];
        if let Some(fallback) = fallback.filter(|f| f.trim_end_matches('/') != primary.trim_end_matches('/')) {
            endpoints.push(fallback);
        }
        Self { transport, endpoints }
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Posts `payload` to `path` on each endpoint in turn.
    ///
    /// A non-5xx response, 4xx included, is returned immediately. A 5xx
    /// response, a transport error or an expired deadline moves on to the next
    /// endpoint; on the last endpoint the response or error is returned as is.
    pub async fn send(
        &self,
        path: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> Result<TransportResponse, GenerationError> {
        let mut last_error = None;

        for (index, base) in self.endpoints.iter().enumerate() {
            let url = join_url(base, path);
            let has_next = index + 1 < self.endpoints.len();
            debug!(url = %url, attempt = index, "Sending generation request");

            let error = match tokio::time::timeout(timeout, self.transport.post_json(&url, payload)).await {
                Ok(Ok(response)) if response.is_server_error() && has_next => {
                    warn!(url = %url, status = response.status, "Endpoint returned a server error, failing over");
                    GenerationError::Upstream {
                        status: response.status,
                        message: response.body,
                    }
                }
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(err)) => err,
                Err(_) => GenerationError::Timeout(timeout),
            };

            if has_next {
                warn!(url = %url, error = %error, "Endpoint failed, failing over");
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| GenerationError::Unknown("no generation endpoints configured".to_string())))
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
