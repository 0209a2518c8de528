//! Tether Cluster
//!
//! The fault-tolerant half of the client pipeline:
//!
//! - **Load balancing** ([`loadbalance`]): pick one invoker from a candidate set
//! - **Directories** ([`directory`]): the live invoker set for one service,
//!   either fixed ([`StaticDirectory`]) or fed by a registry
//!   ([`RegistryDirectory`])
//! - **Cluster invokers** ([`cluster`]): a single [`Invoker`](tether_common::Invoker)
//!   facade over a directory, applying failover or failfast policy, or
//!   routing between registries
//! - **Extensions** ([`ExtensionRegistry`]): named clusters, load balancers,
//!   protocols and filters, populated once at startup
//! - **References** ([`ReferenceConfig`]): assembles the pipeline for one
//!   consumer reference
//!
//! # Call Flow
//!
//! ```text
//! caller -> ClusterInvoker::invoke -> Directory::list -> LoadBalance::select
//!        -> (reselect on unavailable / already tried) -> filter chain -> invoker
//! ```

pub mod cluster;
pub mod config;
pub mod directory;
pub mod extension;
pub mod loadbalance;

#[cfg(test)]
mod test_support;

pub use cluster::{BaseClusterInvoker, Cluster, FailfastCluster, FailoverCluster, RegistryAwareCluster};
pub use config::{MethodConfig, ReferenceConfig};
pub use directory::{Directory, RegistryDirectory, StaticDirectory};
pub use extension::ExtensionRegistry;
pub use loadbalance::{LeastActiveLoadBalance, LoadBalance, RandomLoadBalance, RoundRobinLoadBalance};
