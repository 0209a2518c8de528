//! Invoker and protocol capabilities.
//!
//! An [`Invoker`] performs calls against one logical target: a single remote
//! endpoint, a filter-wrapped endpoint, or a whole cluster. Every layer of the
//! client pipeline is itself an `Invoker`, so layers compose freely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::{Invocation, InvokeResult, Result, RpcResult, TetherError};
use crate::url::ServiceUrl;

#[async_trait]
pub trait Invoker: Send + Sync {
    /// Identity of the target this invoker calls.
    fn url(&self) -> &ServiceUrl;

    /// Whether the invoker can currently accept calls.
    fn is_available(&self) -> bool;

    fn is_destroyed(&self) -> bool;

    /// Performs one call. Cancellation is by dropping the future.
    async fn invoke(&self, invocation: &Invocation) -> InvokeResult;

    /// Releases the invoker. Must be idempotent; afterwards
    /// `is_available()` returns `false`.
    fn destroy(&self);
}

/// Identity comparison for shared invokers.
pub fn same_invoker(a: &Arc<dyn Invoker>, b: &Arc<dyn Invoker>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Creates invokers for discovered provider URLs.
pub trait Protocol: Send + Sync {
    /// Builds an invoker for `url`.
    ///
    /// # Errors
    /// Returns an error when the URL cannot be served by this protocol.
    fn refer(&self, url: ServiceUrl) -> Result<Arc<dyn Invoker>>;

    /// Destroys every invoker this protocol has handed out.
    fn destroy(&self);
}

/// Availability and lifecycle bookkeeping shared by concrete invokers.
///
/// Used on its own it is an invoker that answers every call with an empty
/// result, which is handy in tests.
#[derive(Debug)]
pub struct BaseInvoker {
    url: ServiceUrl,
    available: AtomicBool,
    destroyed: AtomicBool,
}

impl BaseInvoker {
    pub fn new(url: ServiceUrl) -> Self {
        Self {
            url,
            available: AtomicBool::new(true),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &ServiceUrl {
        &self.url
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn set_available(&self, available: bool) {
        if !self.is_destroyed() {
            self.available.store(available, Ordering::Release);
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Marks the invoker destroyed.
    ///
    /// Returns `true` only for the call that performed the transition, so
    /// owners can release resources exactly once.
    pub fn destroy(&self) -> bool {
        let first = self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.available.store(false, Ordering::Release);
        first
    }
}

#[async_trait]
impl Invoker for BaseInvoker {
    fn url(&self) -> &ServiceUrl {
        BaseInvoker::url(self)
    }

    fn is_available(&self) -> bool {
        BaseInvoker::is_available(self)
    }

    fn is_destroyed(&self) -> bool {
        BaseInvoker::is_destroyed(self)
    }

    async fn invoke(&self, _invocation: &Invocation) -> InvokeResult {
        if self.is_destroyed() {
            return Err(TetherError::ProviderUnavailable(format!(
                "invoker for {} has been destroyed",
                self.url.key()
            )));
        }
        Ok(RpcResult::empty())
    }

    fn destroy(&self) {
        BaseInvoker::destroy(self);
    }
}
