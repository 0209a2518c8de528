//! Cluster policies: one fault-tolerant invoker over a directory.

use std::sync::Arc;

use tether_common::Invoker;

use crate::directory::Directory;
use crate::extension::ExtensionRegistry;

mod base;
mod failfast;
mod failover;
mod registry_aware;

pub use base::BaseClusterInvoker;
pub use failfast::{FailfastCluster, FailfastClusterInvoker};
pub use failover::{FailoverCluster, FailoverClusterInvoker};
pub use registry_aware::{RegistryAwareCluster, RegistryAwareClusterInvoker};

/// Builds the cluster invoker for a directory.
pub trait Cluster: Send + Sync {
    fn join(&self, directory: Arc<dyn Directory>, extensions: Arc<ExtensionRegistry>) -> Arc<dyn Invoker>;
}
