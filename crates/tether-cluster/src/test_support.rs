//! Scripted invokers, protocols and clusters shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tether_common::{
    BaseInvoker, Invocation, InvokeResult, Invoker, Protocol, Result, RpcResult, ServiceUrl,
    TetherError,
};

pub const SERVICE: &str = "com.ikurento.UserProvider";

pub fn provider_url(port: u16) -> ServiceUrl {
    ServiceUrl::new("mock", "127.0.0.1", port, SERVICE)
}

/// How a [`MockInvoker`] answers calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Transport,
    Business,
}

pub struct MockInvoker {
    base: BaseInvoker,
    calls: AtomicUsize,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Mutex<Outcome>,
}

impl MockInvoker {
    pub fn new(url: ServiceUrl) -> Self {
        Self {
            base: BaseInvoker::new(url),
            calls: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Outcome::Ok),
        }
    }

    /// Answers every call with `outcome`.
    pub fn always(self, outcome: Outcome) -> Self {
        *self.fallback.lock() = outcome;
        self
    }

    /// Answers the next calls with `outcomes`, then falls back.
    pub fn then(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.script.lock().extend(outcomes);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.base.set_available(available);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Invoker for MockInvoker {
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or(*self.fallback.lock());
        let location = self.base.url().location();
        match outcome {
            Outcome::Ok => Ok(RpcResult::new(json!({
                "method": invocation.method_name(),
                "provider": location,
            }))),
            Outcome::Transport => Err(TetherError::Connection(format!("{} refused", location))),
            Outcome::Business => Err(TetherError::Business(format!("{} says no", location))),
        }
    }

    fn destroy(&self) {
        self.base.destroy();
    }
}

pub fn invoker_with(port: u16, build: impl FnOnce(ServiceUrl) -> ServiceUrl) -> Arc<dyn Invoker> {
    Arc::new(MockInvoker::new(build(provider_url(port))))
}

/// `count` healthy invokers on ports `1..=count`.
pub fn invokers(count: u16) -> Vec<Arc<dyn Invoker>> {
    (1..=count).map(|port| invoker_with(port, |url| url)).collect()
}

/// Protocol handing out [`MockInvoker`]s and remembering them.
#[derive(Default)]
pub struct MockProtocol {
    referred: Mutex<Vec<Arc<MockInvoker>>>,
}

impl MockProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn referred(&self) -> Vec<Arc<MockInvoker>> {
        self.referred.lock().clone()
    }
}

impl Protocol for MockProtocol {
    fn refer(&self, url: ServiceUrl) -> Result<Arc<dyn Invoker>> {
        let invoker = Arc::new(MockInvoker::new(url));
        self.referred.lock().push(invoker.clone());
        Ok(invoker)
    }

    fn destroy(&self) {
        for invoker in self.referred.lock().drain(..) {
            Invoker::destroy(invoker.as_ref());
        }
    }
}
