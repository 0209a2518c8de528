//! HTTP transport for JSON-RPC calls.

use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use tether_common::{Result, TetherError};

use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};

/// Posts JSON-RPC requests to one provider endpoint.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
    endpoint: String,
}

impl HttpClient {
    /// `endpoint` is the full URL requests are posted to, e.g.
    /// `http://127.0.0.1:20000/com.ikurento.UserProvider`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends a call and returns its `result` (`null` when the field is absent).
    ///
    /// # Errors
    /// - [`TetherError::Timeout`] when no response arrives in time
    /// - [`TetherError::Connection`] when the provider cannot be reached
    /// - [`TetherError::ProviderUnavailable`] on HTTP 503
    /// - [`TetherError::Transport`] on any other HTTP or I/O failure
    /// - [`TetherError::InvalidResponse`] when the body is not a JSON-RPC response
    /// - [`TetherError::Business`] when the provider answers with an error object
    pub async fn call(&self, request: &JsonRpcRequest, timeout: Duration) -> Result<Value> {
        let body = self.post(request, timeout).await?;
        let response: JsonRpcResponse = serde_json::from_slice(&body).map_err(|e| {
            TetherError::InvalidResponse(format!("{} returned malformed JSON-RPC: {}", self.endpoint, e))
        })?;

        if let Some(error) = response.error {
            return Err(TetherError::Business(format!(
                "{} (code {})",
                error.message, error.code
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Sends a notification; only delivery failures are reported.
    pub async fn notify(&self, request: &JsonRpcRequest, timeout: Duration) -> Result<()> {
        self.post(request, timeout).await.map(|_| ())
    }

    async fn post(&self, request: &JsonRpcRequest, timeout: Duration) -> Result<Bytes> {
        let body = serde_json::to_vec(request)?;
        let http_request = Request::builder()
            .method("POST")
            .uri(&self.endpoint)
            .header("Content-Type", "application/json")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| TetherError::Transport(format!("Failed to build request: {}", e)))?;

        let exchange = async {
            let response = self.client.request(http_request).await.map_err(|e| {
                if e.is_connect() {
                    TetherError::Connection(format!("{}: {}", self.endpoint, e))
                } else {
                    TetherError::Transport(format!("HTTP request to {} failed: {}", self.endpoint, e))
                }
            })?;

            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| TetherError::Transport(format!("Failed to read response: {}", e)))?
                .to_bytes();
            Ok::<_, TetherError>((status, body))
        };

        let (status, body) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| TetherError::Timeout(timeout.as_millis() as u64))??;

        match status {
            status if status.is_success() => Ok(body),
            StatusCode::SERVICE_UNAVAILABLE => Err(TetherError::ProviderUnavailable(format!(
                "{} answered {}",
                self.endpoint, status
            ))),
            status => Err(TetherError::Transport(format!(
                "{} answered {}",
                self.endpoint, status
            ))),
        }
    }
}
