use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tether_common::constants::{AVAILABLE_CHECK_KEY, DEFAULT_LOADBALANCE, LOADBALANCE_KEY};
use tether_common::{same_invoker, Invocation, Invoker, Result, ServiceUrl, TetherError};
use tracing::warn;

use crate::directory::Directory;
use crate::extension::ExtensionRegistry;
use crate::loadbalance::LoadBalance;

/// State and selection logic shared by every cluster policy.
///
/// # Selection
///
/// [`do_select`](Self::do_select) asks the load balancer for a pick and falls
/// back to *reselection* when that pick is unavailable or was already tried
/// during this call. Reselection draws only from candidates that are
/// available and were not tried yet. With `cluster.availablecheck=false`
/// every pick goes through reselection.
pub struct BaseClusterInvoker {
    directory: Arc<dyn Directory>,
    extensions: Arc<ExtensionRegistry>,
    available_check: bool,
    destroyed: AtomicBool,
}

impl BaseClusterInvoker {
    pub fn new(directory: Arc<dyn Directory>, extensions: Arc<ExtensionRegistry>) -> Self {
        let available_check = reference_url(directory.as_ref()).param_bool(AVAILABLE_CHECK_KEY, true);
        Self {
            directory,
            extensions,
            available_check,
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn url(&self) -> &ServiceUrl {
        self.directory.url()
    }

    pub fn is_available(&self) -> bool {
        !self.is_destroyed() && self.directory.is_available()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Destroys the directory the first time it is called.
    pub fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.directory.destroy();
        }
    }

    /// Service key of the consumer reference, for diagnostics.
    pub fn service_key(&self) -> String {
        reference_url(self.directory.as_ref()).service_key()
    }

    pub fn check_whether_destroyed(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(TetherError::destroyed(
                reference_url(self.directory.as_ref()).service(),
            ));
        }
        Ok(())
    }

    pub fn check_invokers(&self, invokers: &[Arc<dyn Invoker>], invocation: &Invocation) -> Result<()> {
        if invokers.is_empty() {
            return Err(self.no_provider(invocation));
        }
        Ok(())
    }

    pub fn no_provider(&self, invocation: &Invocation) -> TetherError {
        TetherError::no_provider(
            invocation.method_name(),
            self.service_key(),
            self.directory.url().to_string(),
        )
    }

    /// Pre-flight checks and the current candidates.
    pub fn list_invokers(&self, invocation: &Invocation) -> Result<Vec<Arc<dyn Invoker>>> {
        self.check_whether_destroyed()?;
        let invokers = self.directory.list(invocation);
        self.check_invokers(&invokers, invocation)?;
        Ok(invokers)
    }

    /// Load balancer for this call.
    ///
    /// The `loadbalance` attachment wins, then the first candidate's
    /// (per-method) `loadbalance` parameter, then the default.
    pub fn load_balance(&self, invokers: &[Arc<dyn Invoker>], invocation: &Invocation) -> Arc<dyn LoadBalance> {
        let name = invocation
            .attachment(LOADBALANCE_KEY)
            .filter(|name| !name.is_empty())
            .or_else(|| {
                invokers
                    .first()
                    .and_then(|invoker| invoker.url().method_param(invocation.method_name(), LOADBALANCE_KEY))
            })
            .unwrap_or(DEFAULT_LOADBALANCE);

        self.extensions.load_balance(name).unwrap_or_else(|e| {
            warn!("{}, falling back to {}", e, DEFAULT_LOADBALANCE);
            self.extensions.default_load_balance()
        })
    }

    /// Picks the invoker for the next attempt, or `None` when no candidate is left.
    pub fn do_select(
        &self,
        load_balance: &dyn LoadBalance,
        invocation: &Invocation,
        invokers: &[Arc<dyn Invoker>],
        invoked: &[Arc<dyn Invoker>],
    ) -> Option<Arc<dyn Invoker>> {
        if invokers.len() == 1 {
            return Some(invokers[0].clone());
        }

        let selected = load_balance.select(invokers, invocation)?;
        if selected.is_available() && self.available_check && !is_invoked(&selected, invoked) {
            return Some(selected);
        }

        let candidates: Vec<Arc<dyn Invoker>> = invokers
            .iter()
            .filter(|invoker| invoker.is_available() && !is_invoked(invoker, invoked))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return None;
        }
        load_balance.select(&candidates, invocation)
    }
}

fn is_invoked(invoker: &Arc<dyn Invoker>, invoked: &[Arc<dyn Invoker>]) -> bool {
    invoked.iter().any(|tried| same_invoker(tried, invoker))
}

fn reference_url(directory: &dyn Directory) -> &ServiceUrl {
    let url = directory.url();
    url.sub_url().unwrap_or(url)
}
