use std::sync::Arc;

use tether_common::{Invocation, Invoker, ServiceUrl};

use super::{DestroyFlag, Directory};

/// A fixed invoker list.
///
/// Used for direct references and for the per-group facades of a
/// registry directory.
pub struct StaticDirectory {
    url: ServiceUrl,
    invokers: Vec<Arc<dyn Invoker>>,
    destroyed: DestroyFlag,
}

impl StaticDirectory {
    /// Creates a directory over `invokers`, described by the first invoker's URL.
    pub fn new(invokers: Vec<Arc<dyn Invoker>>) -> Self {
        let url = invokers
            .first()
            .map(|invoker| invoker.url().clone())
            .unwrap_or_default();
        Self::with_url(url, invokers)
    }

    pub fn with_url(url: ServiceUrl, invokers: Vec<Arc<dyn Invoker>>) -> Self {
        Self {
            url,
            invokers,
            destroyed: DestroyFlag::default(),
        }
    }
}

impl Directory for StaticDirectory {
    fn url(&self) -> &ServiceUrl {
        &self.url
    }

    fn list(&self, _invocation: &Invocation) -> Vec<Arc<dyn Invoker>> {
        if self.destroyed.is_set() {
            return Vec::new();
        }
        self.invokers.clone()
    }

    fn is_available(&self) -> bool {
        !self.destroyed.is_set() && self.invokers.iter().any(|invoker| invoker.is_available())
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.is_set()
    }

    fn destroy(&self) {
        if self.destroyed.set() {
            for invoker in &self.invokers {
                invoker.destroy();
            }
        }
    }
}
