use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tether_common::constants::{DEFAULT_TIMEOUT_MS, TIMEOUT_KEY};
use tether_common::{BaseInvoker, Invocation, InvokeResult, Invoker, RpcResult, ServiceUrl, TetherError};
use tracing::{debug, info, warn};

use crate::client::HttpClient;
use crate::jsonrpc::JsonRpcRequest;

/// Invoker calling one provider over HTTP JSON-RPC.
///
/// The call mode follows the invocation:
///
/// | `async` attachment | callback | mode |
/// |---|---|---|
/// | false | - | synchronous; the reply slot receives the result |
/// | true | set | background call; the callback receives the outcome |
/// | true | unset | one-way notification |
///
/// A synchronous call without a reply slot fails with
/// [`TetherError::ReplyRequired`] before anything is sent.
pub struct JsonRpcInvoker {
    base: BaseInvoker,
    client: HttpClient,
    next_id: AtomicU64,
}

impl JsonRpcInvoker {
    pub fn new(url: ServiceUrl) -> Self {
        let endpoint = format!("http://{}/{}", url.location(), url.service());
        Self {
            client: HttpClient::new(endpoint),
            base: BaseInvoker::new(url),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    fn timeout(&self, method: &str) -> Duration {
        let millis = self
            .base
            .url()
            .method_param_int(method, TIMEOUT_KEY, DEFAULT_TIMEOUT_MS as i64);
        Duration::from_millis(u64::try_from(millis).unwrap_or(DEFAULT_TIMEOUT_MS))
    }
}

#[async_trait]
impl Invoker for JsonRpcInvoker {
    fn url(&self) -> &ServiceUrl {
        self.base.url()
    }

    fn is_available(&self) -> bool {
        self.base.is_available()
    }

    fn is_destroyed(&self) -> bool {
        self.base.is_destroyed()
    }

    async fn invoke(&self, invocation: &Invocation) -> InvokeResult {
        if self.base.is_destroyed() {
            return Err(TetherError::ProviderUnavailable(format!(
                "invoker for {} is destroyed",
                self.endpoint()
            )));
        }

        let method = invocation.method_name();
        let params = Value::Array(invocation.arguments().to_vec());
        let timeout = self.timeout(method);

        if invocation.is_async() {
            if let Some(callback) = invocation.callback() {
                let request = JsonRpcRequest::call(method, params, self.next_id.fetch_add(1, Ordering::Relaxed));
                let client = self.client.clone();
                let callback = callback.clone();
                debug!("Async call {} on {}", request.method, client.endpoint());
                tokio::spawn(async move {
                    callback(client.call(&request, timeout).await);
                });
                return Ok(RpcResult::pending());
            }

            let request = JsonRpcRequest::notification(method, params);
            debug!("One-way call {} on {}", method, self.endpoint());
            self.client.notify(&request, timeout).await?;
            return Ok(RpcResult::empty());
        }

        let Some(reply) = invocation.reply() else {
            return Err(TetherError::ReplyRequired);
        };
        let request = JsonRpcRequest::call(method, params, self.next_id.fetch_add(1, Ordering::Relaxed));
        let value = self.client.call(&request, timeout).await.inspect_err(|e| {
            warn!("Call {} on {} failed: {}", method, self.endpoint(), e);
        })?;
        reply.set(value.clone());
        Ok(RpcResult::new(value))
    }

    fn destroy(&self) {
        if self.base.destroy() {
            info!("Destroyed JSON-RPC invoker for {}", self.endpoint());
        }
    }
}
