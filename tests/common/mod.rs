//! Shared fixtures for the end-to-end tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tether::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use tether::ServiceUrl;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const SERVICE: &str = "com.ikurento.UserProvider";

/// JSON-RPC provider on a random loopback port.
///
/// `GetUser` answers `{"provider": <port>, "args": <params>}`; `Fail`
/// answers a JSON-RPC error. Every request is counted.
pub struct TestProvider {
    pub port: u16,
    calls: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestProvider {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let calls = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let counter = calls.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { continue };
                        let io = TokioIo::new(stream);
                        let counter = counter.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| handle(port, counter.clone(), req));
                            let _ = http1::Builder::new().serve_connection(io, service).await;
                        });
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            port,
            calls,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self) -> ServiceUrl {
        ServiceUrl::new("jsonrpc", "127.0.0.1", self.port, SERVICE)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Drop for TestProvider {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle(
    port: u16,
    calls: Arc<AtomicUsize>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    calls.fetch_add(1, Ordering::SeqCst);
    let body = req.into_body().collect().await?.to_bytes();
    let request: JsonRpcRequest = serde_json::from_slice(&body).unwrap();
    let id = request.id.clone().unwrap_or_default();

    let response = match request.method.as_str() {
        "GetUser" => JsonRpcResponse::success(id, json!({"provider": port, "args": request.params})),
        "Fail" => JsonRpcResponse::error(id, JsonRpcError::server_error("no such user")),
        _ => JsonRpcResponse::error(id, JsonRpcError::method_not_found()),
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(serde_json::to_vec(&response).unwrap())))
        .unwrap())
}

/// A provider URL on a port nobody listens on.
pub async fn dead_provider_url() -> ServiceUrl {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    ServiceUrl::new("jsonrpc", "127.0.0.1", port, SERVICE)
}

/// Polls `condition` every 10ms for up to two seconds.
pub async fn wait_until<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
