use std::sync::Arc;

use async_trait::async_trait;
use tether_common::{Invocation, InvokeResult, Invoker};
use tether_metrics::RpcStatusRegistry;

use crate::chain::Filter;

/// Counts in-flight calls per invoker URL and per method.
///
/// The count is raised before dispatch and lowered when the call's
/// [`ActiveCall`](tether_metrics::ActiveCall) guard drops, which also covers
/// panics and callers that abandon the call. A destroyed invoker's counters
/// are forgotten.
#[derive(Debug, Clone)]
pub struct ActiveFilter {
    status: Arc<RpcStatusRegistry>,
}

impl ActiveFilter {
    pub const NAME: &'static str = "active";

    pub fn new(status: Arc<RpcStatusRegistry>) -> Self {
        Self { status }
    }

    pub fn status(&self) -> &Arc<RpcStatusRegistry> {
        &self.status
    }
}

#[async_trait]
impl Filter for ActiveFilter {
    async fn invoke(&self, invoker: &dyn Invoker, invocation: &Invocation) -> InvokeResult {
        tracing::debug!(
            "invoking {} on {}",
            invocation.method_name(),
            invoker.url().location()
        );
        let call = self.status.begin_call(invoker.url(), invocation.method_name());
        let result = invoker.invoke(invocation).await;
        call.finish(result.is_ok());
        result
    }

    fn on_destroy(&self, invoker: &dyn Invoker) {
        self.status.remove(invoker.url());
    }
}
