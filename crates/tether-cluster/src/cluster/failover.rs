use std::sync::Arc;

use async_trait::async_trait;
use tether_common::constants::{DEFAULT_RETRIES, RETRIES_KEY, RETRY_BUSINESS_KEY};
use tether_common::utils::{local_ip, VERSION};
use tether_common::{Invocation, InvokeResult, Invoker, ServiceUrl, TetherError};
use tracing::{debug, warn};

use super::{BaseClusterInvoker, Cluster};
use crate::directory::Directory;
use crate::extension::ExtensionRegistry;

/// Retries failed calls on other providers.
pub struct FailoverCluster;

impl FailoverCluster {
    pub const NAME: &'static str = "failover";
}

impl Cluster for FailoverCluster {
    fn join(&self, directory: Arc<dyn Directory>, extensions: Arc<ExtensionRegistry>) -> Arc<dyn Invoker> {
        Arc::new(FailoverClusterInvoker::new(directory, extensions))
    }
}

/// Failover cluster invoker.
///
/// A call makes at most `retries + 1` attempts (`retries` defaults to 2 and
/// can be overridden per method). Every attempt after the first re-lists the
/// directory and never picks an invoker that was already tried during this
/// call. Transport-level failures move on to the next provider; business
/// errors are returned as-is unless `retry.business=true`.
pub struct FailoverClusterInvoker {
    base: BaseClusterInvoker,
}

impl FailoverClusterInvoker {
    pub fn new(directory: Arc<dyn Directory>, extensions: Arc<ExtensionRegistry>) -> Self {
        Self {
            base: BaseClusterInvoker::new(directory, extensions),
        }
    }
}

#[async_trait]
impl Invoker for FailoverClusterInvoker {
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
        let method = invocation.method_name();
        let mut invokers = self.base.list_invokers(invocation)?;

        let settings = invokers[0].url();
        let retries = settings.method_param_int(method, RETRIES_KEY, DEFAULT_RETRIES).max(0) as usize;
        let retry_business = settings.method_param_bool(method, RETRY_BUSINESS_KEY, false);
        let attempts = retries + 1;
        let load_balance = self.base.load_balance(&invokers, invocation);

        let mut invoked: Vec<Arc<dyn Invoker>> = Vec::with_capacity(attempts);
        let mut providers: Vec<String> = Vec::with_capacity(attempts);
        let mut last_error: Option<TetherError> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                self.base.check_whether_destroyed()?;
                invokers = self.base.directory().list(invocation);
                self.base.check_invokers(&invokers, invocation)?;
            }

            let Some(invoker) = self.base.do_select(load_balance.as_ref(), invocation, &invokers, &invoked)
            else {
                break;
            };
            invoked.push(invoker.clone());
            providers.push(invoker.url().location());

            match invoker.invoke(invocation).await {
                Ok(result) => {
                    if let Some(error) = &last_error {
                        warn!(
                            "Call {}.{} succeeded on {} after {} failed attempt(s), last error: {}",
                            self.base.service_key(),
                            method,
                            invoker.url().location(),
                            attempt,
                            error
                        );
                    }
                    return Ok(result);
                }
                Err(e) if !e.is_retryable(retry_business) => return Err(e),
                Err(e) => {
                    debug!(
                        "Attempt {}/{} of {}.{} on {} failed: {}",
                        attempt + 1,
                        attempts,
                        self.base.service_key(),
                        method,
                        invoker.url().location(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        let Some(last) = last_error else {
            return Err(self.base.no_provider(invocation));
        };
        Err(TetherError::RetriesExhausted {
            method: method.to_string(),
            service: self.base.service_key(),
            attempts: providers.len(),
            selected: providers.len(),
            providers,
            total: invokers.len(),
            registry: self.base.url().to_string(),
            consumer_ip: local_ip(),
            version: VERSION,
            last: Box::new(last),
        })
    }

    fn destroy(&self) {
        self.base.destroy();
    }
}
