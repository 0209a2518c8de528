use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tether_common::{Invoker, Protocol, Result, ServiceUrl, TetherError};
use tracing::info;

use crate::invoker::JsonRpcInvoker;

/// Creates [`JsonRpcInvoker`]s and destroys them all on [`Protocol::destroy`].
///
/// Only weak references are kept; invokers that were destroyed or dropped
/// elsewhere are pruned on the next refer.
#[derive(Default)]
pub struct JsonRpcProtocol {
    invokers: Mutex<Vec<Weak<JsonRpcInvoker>>>,
}

impl JsonRpcProtocol {
    pub const NAME: &'static str = "jsonrpc";

    pub fn new() -> Self {
        Self::default()
    }

    /// Invokers referred and not yet destroyed.
    pub fn invoker_count(&self) -> usize {
        let mut invokers = self.invokers.lock();
        prune(&mut invokers);
        invokers.len()
    }
}

fn prune(invokers: &mut Vec<Weak<JsonRpcInvoker>>) {
    invokers.retain(|invoker| invoker.upgrade().is_some_and(|invoker| !invoker.is_destroyed()));
}

impl Protocol for JsonRpcProtocol {
    fn refer(&self, url: ServiceUrl) -> Result<Arc<dyn Invoker>> {
        if url.port().is_none() || url.ip().is_empty() {
            return Err(TetherError::Configuration(format!(
                "JSON-RPC provider URL '{}' has no host and port",
                url
            )));
        }
        if url.service().is_empty() {
            return Err(TetherError::Configuration(format!(
                "JSON-RPC provider URL '{}' names no service",
                url
            )));
        }

        info!("Refer service: {}", url);
        let invoker = Arc::new(JsonRpcInvoker::new(url));
        let mut invokers = self.invokers.lock();
        prune(&mut invokers);
        invokers.push(Arc::downgrade(&invoker));
        drop(invokers);
        Ok(invoker)
    }

    fn destroy(&self) {
        let invokers = std::mem::take(&mut *self.invokers.lock());
        info!("Destroying JSON-RPC protocol ({} invokers)", invokers.len());
        for invoker in invokers.iter().filter_map(Weak::upgrade) {
            invoker.destroy();
        }
    }
}
