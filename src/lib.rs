//! Tether
//!
//! Client-side invocation core for registry-driven RPC. A consumer reference
//! becomes a single [`Invoker`]: providers are discovered through a
//! [`Registry`], cached in a [`RegistryDirectory`], wrapped in filters and
//! called through a fault-tolerant cluster policy with pluggable load
//! balancing.
//!
//! # Crates
//!
//! - [`tether_common`]: URLs, invocations, results, the `Invoker` and
//!   `Protocol` traits and the error type
//! - [`tether_metrics`]: per-endpoint in-flight call accounting
//! - [`tether_filter`]: filter chains and the active-calls filter
//! - [`tether_registry`]: registry and listener contracts, the bounded event
//!   watcher and an in-process registry
//! - [`tether_cluster`]: directories, load balancers, cluster invokers and
//!   reference assembly
//! - [`tether_protocol`]: the HTTP JSON-RPC protocol
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::{
//!     ExtensionRegistry, Invocation, MemoryRegistry, ReferenceConfig, Registry, ReplySlot, ServiceUrl,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> tether::Result<()> {
//! let registry: Arc<dyn Registry> =
//!     Arc::new(MemoryRegistry::new(ServiceUrl::new("memory", "127.0.0.1", 2181, "")));
//! let reference = ReferenceConfig {
//!     interface: "com.ikurento.UserProvider".to_string(),
//!     retries: Some(1),
//!     ..Default::default()
//! };
//! let invoker = reference
//!     .refer(vec![registry], Arc::new(ExtensionRegistry::with_defaults()))
//!     .await?;
//!
//! let reply = ReplySlot::new();
//! invoker
//!     .invoke(&Invocation::new("GetUser", vec![json!("A001")]).with_reply(reply.clone()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub use tether_cluster as cluster;
pub use tether_common as common;
pub use tether_filter as filter;
pub use tether_metrics as metrics;
pub use tether_protocol as protocol;
pub use tether_registry as registry;

pub use tether_cluster::{
    Cluster, Directory, ExtensionRegistry, FailfastCluster, FailoverCluster, LoadBalance, MethodConfig,
    ReferenceConfig, RegistryAwareCluster, RegistryDirectory, StaticDirectory,
};
pub use tether_common::{
    Invocation, InvokeResult, Invoker, Protocol, ReplySlot, Result, RpcResult, ServiceUrl, TetherError,
};
pub use tether_filter::{ActiveFilter, Filter};
pub use tether_metrics::RpcStatusRegistry;
pub use tether_protocol::JsonRpcProtocol;
pub use tether_registry::{EventType, Listener, MemoryRegistry, Registry, ServiceEvent};
