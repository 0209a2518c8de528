use std::sync::Arc;

use async_trait::async_trait;
use tether_common::constants::REGISTRY_DEFAULT_KEY;
use tether_common::{Invocation, InvokeResult, Invoker, ServiceUrl};

use super::{BaseClusterInvoker, Cluster};
use crate::directory::Directory;
use crate::extension::ExtensionRegistry;

/// Routes every call to one registry's cluster.
///
/// Members are the per-registry cluster invokers of a reference. The first
/// available member whose registry URL carries `default=true` wins, then the
/// first available member. No retry happens at this level; each member
/// applies its own policy.
pub struct RegistryAwareCluster;

impl RegistryAwareCluster {
    pub const NAME: &'static str = "registryaware";
}

impl Cluster for RegistryAwareCluster {
    fn join(&self, directory: Arc<dyn Directory>, extensions: Arc<ExtensionRegistry>) -> Arc<dyn Invoker> {
        Arc::new(RegistryAwareClusterInvoker {
            base: BaseClusterInvoker::new(directory, extensions),
        })
    }
}

pub struct RegistryAwareClusterInvoker {
    base: BaseClusterInvoker,
}

#[async_trait]
impl Invoker for RegistryAwareClusterInvoker {
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
        let invokers = self.base.list_invokers(invocation)?;
        let chosen = invokers
            .iter()
            .find(|invoker| invoker.is_available() && invoker.url().param_bool(REGISTRY_DEFAULT_KEY, false))
            .or_else(|| invokers.iter().find(|invoker| invoker.is_available()));
        match chosen {
            Some(invoker) => invoker.invoke(invocation).await,
            None => Err(self.base.no_provider(invocation)),
        }
    }

    fn destroy(&self) {
        self.base.destroy();
    }
}
