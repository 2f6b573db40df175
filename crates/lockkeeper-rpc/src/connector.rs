//! Single-endpoint request issuance
//!
//! A connector sends one request to one URL and never retries on its own.
//! Retries and failover belong to [`crate::FailoverTransport`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::{Error, Result};

/// Longest response body echoed back inside an error
const MAX_ERROR_BODY: usize = 256;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn call(&self, endpoint: &str, request: &JsonRpcRequest, timeout: Duration) -> Result<Value>;
}

/// HTTP(S) connector backed by `reqwest`
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn call(&self, endpoint: &str, request: &JsonRpcRequest, timeout: Duration) -> Result<Value> {
        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, timeout, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(endpoint, timeout, e))?;

        // Some nodes answer malformed requests with 400 plus a JSON-RPC error body
        if let Ok(envelope) = serde_json::from_str::<JsonRpcResponse>(&body) {
            if envelope.error.is_some() || status.is_success() {
                return envelope.into_result();
            }
        }

        if !status.is_success() {
            return Err(Error::Http {
                endpoint: endpoint.to_string(),
                status: Some(status.as_u16()),
                message: truncate(&body),
            });
        }

        Err(Error::InvalidResponse {
            endpoint: endpoint.to_string(),
            message: truncate(&body),
        })
    }
}

fn transport_error(endpoint: &str, timeout: Duration, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        return Error::Timeout {
            endpoint: endpoint.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };
    }
    Error::Http {
        endpoint: endpoint.to_string(),
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
