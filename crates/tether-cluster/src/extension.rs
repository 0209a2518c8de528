//! Named extension points.
//!
//! Clusters, load balancers, protocols and filters are looked up by the
//! names that appear in URL parameters (`cluster=failover`,
//! `loadbalance=roundrobin`, `reference.filter=active`, the URL scheme).
//! The registry is built once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tether_common::constants::{
    DEFAULT_CLUSTER, DEFAULT_LOADBALANCE, DEFAULT_REFERENCE_FILTERS, REFERENCE_FILTER_KEY,
};
use tether_common::{Protocol, Result, ServiceUrl, TetherError};
use tether_filter::{ActiveFilter, Filter};
use tether_metrics::RpcStatusRegistry;
use tether_protocol::JsonRpcProtocol;
use tracing::debug;

use crate::cluster::{Cluster, FailfastCluster, FailoverCluster, RegistryAwareCluster};
use crate::loadbalance::{LeastActiveLoadBalance, LoadBalance, RandomLoadBalance, RoundRobinLoadBalance};

pub struct ExtensionRegistry {
    clusters: HashMap<String, Arc<dyn Cluster>>,
    load_balances: HashMap<String, Arc<dyn LoadBalance>>,
    protocols: HashMap<String, Arc<dyn Protocol>>,
    filters: HashMap<String, Arc<dyn Filter>>,
    status: Arc<RpcStatusRegistry>,
    default_cluster: Arc<dyn Cluster>,
    default_load_balance: Arc<dyn LoadBalance>,
}

impl ExtensionRegistry {
    /// An empty registry. Only the fallback cluster and load balancer are
    /// usable until extensions are added.
    pub fn new(status: Arc<RpcStatusRegistry>) -> Self {
        Self {
            clusters: HashMap::new(),
            load_balances: HashMap::new(),
            protocols: HashMap::new(),
            filters: HashMap::new(),
            status,
            default_cluster: Arc::new(FailoverCluster),
            default_load_balance: Arc::new(RandomLoadBalance::new()),
        }
    }

    /// Built-in extensions over a fresh status registry.
    pub fn with_defaults() -> Self {
        Self::with_status(Arc::new(RpcStatusRegistry::new()))
    }

    /// Built-in extensions sharing `status` between the `active` filter and
    /// the `leastactive` load balancer.
    pub fn with_status(status: Arc<RpcStatusRegistry>) -> Self {
        let mut registry = Self::new(status.clone());
        let failover: Arc<dyn Cluster> = Arc::new(FailoverCluster);
        let random: Arc<dyn LoadBalance> = Arc::new(RandomLoadBalance::new());
        registry.default_cluster = failover.clone();
        registry.default_load_balance = random.clone();

        registry
            .with_cluster(FailoverCluster::NAME, failover)
            .with_cluster(FailfastCluster::NAME, Arc::new(FailfastCluster))
            .with_cluster(RegistryAwareCluster::NAME, Arc::new(RegistryAwareCluster))
            .with_load_balance(RandomLoadBalance::NAME, random)
            .with_load_balance(RoundRobinLoadBalance::NAME, Arc::new(RoundRobinLoadBalance::new()))
            .with_load_balance(
                LeastActiveLoadBalance::NAME,
                Arc::new(LeastActiveLoadBalance::new(status.clone())),
            )
            .with_protocol(JsonRpcProtocol::NAME, Arc::new(JsonRpcProtocol::new()))
            .with_filter(ActiveFilter::NAME, Arc::new(ActiveFilter::new(status)))
    }

    pub fn with_cluster(mut self, name: impl Into<String>, cluster: Arc<dyn Cluster>) -> Self {
        self.clusters.insert(name.into(), cluster);
        self
    }

    pub fn with_load_balance(mut self, name: impl Into<String>, load_balance: Arc<dyn LoadBalance>) -> Self {
        self.load_balances.insert(name.into(), load_balance);
        self
    }

    pub fn with_protocol(mut self, name: impl Into<String>, protocol: Arc<dyn Protocol>) -> Self {
        self.protocols.insert(name.into(), protocol);
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, filter: Arc<dyn Filter>) -> Self {
        self.filters.insert(name.into(), filter);
        self
    }

    pub fn cluster(&self, name: &str) -> Result<Arc<dyn Cluster>> {
        lookup(&self.clusters, "cluster", name)
    }

    pub fn load_balance(&self, name: &str) -> Result<Arc<dyn LoadBalance>> {
        lookup(&self.load_balances, "loadbalance", name)
    }

    pub fn protocol(&self, name: &str) -> Result<Arc<dyn Protocol>> {
        lookup(&self.protocols, "protocol", name)
    }

    pub fn filter(&self, name: &str) -> Result<Arc<dyn Filter>> {
        lookup(&self.filters, "filter", name)
    }

    /// Cluster used when a URL names an unknown one (`failover` unless overridden).
    pub fn default_cluster(&self) -> Arc<dyn Cluster> {
        self.default_cluster.clone()
    }

    pub fn default_load_balance(&self) -> Arc<dyn LoadBalance> {
        self.default_load_balance.clone()
    }

    /// Resolves the consumer filter chain named by `reference.filter`.
    ///
    /// The parameter is a comma-separated list, outermost first. When it is
    /// absent the `active` filter is used; an explicitly empty value means no
    /// filters at all.
    pub fn reference_filters(&self, url: &ServiceUrl) -> Result<Vec<Arc<dyn Filter>>> {
        let names = url.param(REFERENCE_FILTER_KEY).unwrap_or(DEFAULT_REFERENCE_FILTERS);
        names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| self.filter(name))
            .collect()
    }

    /// Call statistics shared by the built-in extensions.
    pub fn status(&self) -> &Arc<RpcStatusRegistry> {
        &self.status
    }

    /// Destroys every registered protocol and the invokers they created.
    pub fn destroy(&self) {
        for (name, protocol) in &self.protocols {
            debug!("Destroying protocol {}", name);
            protocol.destroy();
        }
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("clusters", &sorted_names(&self.clusters))
            .field("load_balances", &sorted_names(&self.load_balances))
            .field("protocols", &sorted_names(&self.protocols))
            .field("filters", &sorted_names(&self.filters))
            .finish()
    }
}

fn sorted_names<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
}

fn lookup<T: ?Sized>(map: &HashMap<String, Arc<T>>, kind: &'static str, name: &str) -> Result<Arc<T>> {
    map.get(name).cloned().ok_or_else(|| TetherError::UnknownExtension {
        kind,
        name: name.to_string(),
    })
}
