//! services/generator/src/adapters/http.rs
//!
//! The `Transport` port over `reqwest`. Deadlines are enforced by the gateway,
//! so the client itself carries no request timeout.

use async_trait::async_trait;
use devotional_core::ports::{Transport, TransportResponse};
use devotional_core::GenerationError;
use reqwest::Client;
use tracing::debug;

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    api_key: Option<String>,
}

impl ReqwestTransport {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<TransportResponse, GenerationError> {
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        debug!(url, status, bytes = body.len(), "Generation backend responded");

        Ok(TransportResponse { status, body })
    }
}

fn classify(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        GenerationError::Network(err.to_string())
    } else {
        GenerationError::Unknown(err.to_string())
    }
}
