use std::sync::Arc;

use async_trait::async_trait;
use tether_common::{Invocation, InvokeResult, Invoker, ServiceUrl};

use super::{BaseClusterInvoker, Cluster};
use crate::directory::Directory;
use crate::extension::ExtensionRegistry;

/// Makes exactly one attempt and reports its failure.
pub struct FailfastCluster;

impl FailfastCluster {
    pub const NAME: &'static str = "failfast";
}

impl Cluster for FailfastCluster {
    fn join(&self, directory: Arc<dyn Directory>, extensions: Arc<ExtensionRegistry>) -> Arc<dyn Invoker> {
        Arc::new(FailfastClusterInvoker {
            base: BaseClusterInvoker::new(directory, extensions),
        })
    }
}

pub struct FailfastClusterInvoker {
    base: BaseClusterInvoker,
}

#[async_trait]
impl Invoker for FailfastClusterInvoker {
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
        let load_balance = self.base.load_balance(&invokers, invocation);
        match self.base.do_select(load_balance.as_ref(), invocation, &invokers, &[]) {
            Some(invoker) => invoker.invoke(invocation).await,
            None => Err(self.base.no_provider(invocation)),
        }
    }

    fn destroy(&self) {
        self.base.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StaticDirectory;
    use crate::test_support::{provider_url, MockInvoker, Outcome};
    use tether_common::TetherError;

    #[tokio::test]
    async fn test_single_attempt() {
        let invokers: Vec<Arc<MockInvoker>> = (1..=3)
            .map(|port| Arc::new(MockInvoker::new(provider_url(port)).always(Outcome::Transport)))
            .collect();
        let directory = StaticDirectory::new(
            invokers
                .iter()
                .map(|invoker| invoker.clone() as Arc<dyn Invoker>)
                .collect(),
        );
        let cluster = FailfastCluster.join(Arc::new(directory), Arc::new(ExtensionRegistry::with_defaults()));

        let err = cluster.invoke(&Invocation::new("GetUser", vec![])).await.unwrap_err();
        assert!(matches!(err, TetherError::Connection(_)));
        assert_eq!(invokers.iter().map(|invoker| invoker.calls()).sum::<usize>(), 1);
    }

    #[tokio::test]
    async fn test_success() {
        let directory = StaticDirectory::new(vec![
            Arc::new(MockInvoker::new(provider_url(7))) as Arc<dyn Invoker>
        ]);
        let cluster = FailfastCluster.join(Arc::new(directory), Arc::new(ExtensionRegistry::with_defaults()));

        let result = cluster.invoke(&Invocation::new("GetUser", vec![])).await.unwrap();
        assert_eq!(result.value.unwrap()["provider"], "127.0.0.1:7");
    }
}
