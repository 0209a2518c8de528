use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tether_common::{Invocation, InvokeResult, Invoker, ServiceUrl, TetherError};

/// Cross-cutting behavior around one invoker call.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Runs before (and around) the wrapped call. Implementations normally
    /// end by calling `invoker.invoke(invocation)`.
    async fn invoke(&self, invoker: &dyn Invoker, invocation: &Invocation) -> InvokeResult;

    /// Post-processes the outcome. Called on every exit path of
    /// [`invoke`](Self::invoke), including errors and panics.
    async fn on_response(
        &self,
        result: InvokeResult,
        _invoker: &dyn Invoker,
        _invocation: &Invocation,
    ) -> InvokeResult {
        result
    }

    /// Called after the wrapped invoker was destroyed.
    fn on_destroy(&self, _invoker: &dyn Invoker) {}
}

/// An invoker that routes calls through one filter before reaching `next`.
pub struct FilterInvoker {
    next: Arc<dyn Invoker>,
    filter: Arc<dyn Filter>,
}

impl FilterInvoker {
    pub fn new(next: Arc<dyn Invoker>, filter: Arc<dyn Filter>) -> Self {
        Self { next, filter }
    }
}

#[async_trait]
impl Invoker for FilterInvoker {
    fn url(&self) -> &ServiceUrl {
        self.next.url()
    }

    fn is_available(&self) -> bool {
        self.next.is_available()
    }

    fn is_destroyed(&self) -> bool {
        self.next.is_destroyed()
    }

    async fn invoke(&self, invocation: &Invocation) -> InvokeResult {
        let next = self.next.as_ref();
        let result = AssertUnwindSafe(self.filter.invoke(next, invocation))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    "Invocation of {} on {} panicked: {}",
                    invocation.method_name(),
                    next.url().key(),
                    message
                );
                Err(TetherError::Panicked(message))
            });
        self.filter.on_response(result, next, invocation).await
    }

    fn destroy(&self) {
        self.next.destroy();
        self.filter.on_destroy(self.next.as_ref());
    }
}

/// Wraps `invoker` in `filters`, the first filter being the outermost.
pub fn build_invoker_chain(invoker: Arc<dyn Invoker>, filters: &[Arc<dyn Filter>]) -> Arc<dyn Invoker> {
    filters.iter().rev().fold(invoker, |next, filter| {
        Arc::new(FilterInvoker::new(next, filter.clone())) as Arc<dyn Invoker>
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
