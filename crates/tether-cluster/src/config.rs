//! Consumer reference configuration.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tether_common::constants::{
    APPLICATION_KEY, ASYNC_KEY, CLUSTER_KEY, DEFAULT_CLUSTER, GROUP_KEY, INTERFACE_KEY,
    LOADBALANCE_KEY, REFERENCE_FILTER_KEY, REGISTRY_PROTOCOL, RETRIES_KEY, TIMEOUT_KEY,
    TIMESTAMP_KEY, VERSION_KEY,
};
use tether_common::url::method_key;
use tether_common::{Invoker, Result, ServiceUrl, TetherError};
use tether_filter::build_invoker_chain;
use tether_registry::Registry;
use tracing::info;

use crate::cluster::{Cluster, RegistryAwareCluster};
use crate::directory::{Directory, RegistryDirectory, StaticDirectory};
use crate::extension::ExtensionRegistry;

/// Per-method overrides inside a [`ReferenceConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MethodConfig {
    pub name: String,
    pub retries: Option<i64>,
    pub loadbalance: Option<String>,
}

/// One consumer reference.
///
/// Unset fields stay unset in the reference URL so that providers'
/// own values apply; see [`ServiceUrl::merge_reference`].
///
/// # Example
///
/// ```
/// use tether_cluster::ReferenceConfig;
///
/// let config = ReferenceConfig {
///     interface: "com.ikurento.UserProvider".to_string(),
///     retries: Some(1),
///     ..Default::default()
/// };
/// let url = config.to_url().unwrap();
/// assert_eq!(url.param("retries"), Some("1"));
/// assert_eq!(url.param("cluster"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub interface: String,
    pub protocol: Option<String>,
    /// Direct provider URLs separated by `;`; bypasses registry discovery when
    /// set, except for `registry://` entries.
    pub url: Option<String>,
    /// Comma-separated consumer filters, outermost first.
    pub filter: Option<String>,
    pub cluster: Option<String>,
    pub loadbalance: Option<String>,
    pub retries: Option<i64>,
    pub group: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "async")]
    pub is_async: Option<bool>,
    pub application: Option<String>,
    /// Call timeout in milliseconds.
    pub timeout: Option<u64>,
    pub methods: Vec<MethodConfig>,
}

impl ReferenceConfig {
    /// The reference URL describing this consumer.
    ///
    /// # Errors
    /// Returns [`TetherError::Configuration`] when no interface is named.
    pub fn to_url(&self) -> Result<ServiceUrl> {
        if self.interface.trim().is_empty() {
            return Err(TetherError::Configuration(
                "reference names no interface".to_string(),
            ));
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        let mut url = ServiceUrl::for_service(self.interface.trim())
            .with_protocol(self.protocol.clone().unwrap_or_default())
            .with_param(INTERFACE_KEY, self.interface.trim())
            .with_param(TIMESTAMP_KEY, timestamp.to_string());

        let optional = [
            (CLUSTER_KEY, self.cluster.clone()),
            (LOADBALANCE_KEY, self.loadbalance.clone()),
            (RETRIES_KEY, self.retries.map(|retries| retries.to_string())),
            (GROUP_KEY, self.group.clone()),
            (VERSION_KEY, self.version.clone()),
            (ASYNC_KEY, self.is_async.map(|is_async| is_async.to_string())),
            (APPLICATION_KEY, self.application.clone()),
            (TIMEOUT_KEY, self.timeout.map(|timeout| timeout.to_string())),
            (REFERENCE_FILTER_KEY, self.filter.clone()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                url = url.with_param(key, value);
            }
        }

        for method in self.methods.iter().filter(|m| !m.name.is_empty()) {
            if let Some(retries) = method.retries {
                url = url.with_param(method_key(&method.name, RETRIES_KEY), retries.to_string());
            }
            if let Some(loadbalance) = &method.loadbalance {
                url = url.with_param(method_key(&method.name, LOADBALANCE_KEY), loadbalance.clone());
            }
        }
        Ok(url)
    }

    /// Assembles the invocation pipeline for this reference.
    ///
    /// With direct URLs configured the providers are referred immediately.
    /// A `registry://host:port` entry among them stands for the registry in
    /// `registries` at that location, and the entries are then joined by
    /// [`RegistryAwareCluster`]. Without direct URLs providers are discovered
    /// through every registry in `registries`; several registries are joined
    /// the same way.
    ///
    /// # Errors
    /// Returns [`TetherError::Configuration`] when neither direct URLs nor a
    /// registry are available, a `registry://` entry matches no registry, or
    /// an unknown extension is named, and any error raised while referring
    /// providers or subscribing.
    pub async fn refer(
        &self,
        registries: Vec<Arc<dyn Registry>>,
        extensions: Arc<ExtensionRegistry>,
    ) -> Result<Arc<dyn Invoker>> {
        let reference = self.to_url()?;
        let cluster = extensions.cluster(reference.param_or(CLUSTER_KEY, DEFAULT_CLUSTER))?;

        let direct: Vec<&str> = self
            .url
            .as_deref()
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .collect();

        if direct.is_empty() {
            if registries.is_empty() {
                return Err(TetherError::Configuration(format!(
                    "reference {} has neither direct URLs nor a registry",
                    reference.service_key()
                )));
            }
            let mut invokers: Vec<Arc<dyn Invoker>> = Vec::with_capacity(registries.len());
            for registry in registries {
                match refer_registry(registry, &reference, cluster.as_ref(), &extensions).await {
                    Ok(invoker) => invokers.push(invoker),
                    Err(e) => {
                        invokers.iter().for_each(|invoker| invoker.destroy());
                        return Err(e);
                    }
                }
            }
            if invokers.len() == 1 {
                if let Some(invoker) = invokers.pop() {
                    return Ok(invoker);
                }
            }
            info!(
                "Referring {} through {} registries",
                reference.service_key(),
                invokers.len()
            );
            let directory = StaticDirectory::with_url(reference, invokers);
            return Ok(RegistryAwareCluster.join(Arc::new(directory), extensions));
        }

        let mut invokers: Vec<Arc<dyn Invoker>> = Vec::with_capacity(direct.len());
        let mut through_registry = false;
        for raw in direct {
            let referred = match ServiceUrl::parse(raw) {
                Ok(url) if url.protocol() == REGISTRY_PROTOCOL => {
                    through_registry = true;
                    match registries
                        .iter()
                        .find(|registry| registry.url().location() == url.location())
                    {
                        Some(registry) => {
                            refer_registry(registry.clone(), &reference, cluster.as_ref(), &extensions).await
                        }
                        None => Err(TetherError::Configuration(format!(
                            "no registry configured at {}",
                            url.location()
                        ))),
                    }
                }
                Ok(url) => refer_direct(&url, &reference, &extensions),
                Err(e) => Err(e),
            };
            match referred {
                Ok(invoker) => invokers.push(invoker),
                Err(e) => {
                    invokers.iter().for_each(|invoker| invoker.destroy());
                    return Err(e);
                }
            }
        }
        info!(
            "Referring {} directly to {} provider(s)",
            reference.service_key(),
            invokers.len()
        );
        let directory = Arc::new(StaticDirectory::with_url(reference, invokers));
        if through_registry {
            Ok(RegistryAwareCluster.join(directory, extensions))
        } else {
            Ok(cluster.join(directory, extensions))
        }
    }
}

/// Subscribes a fresh directory on `registry` and joins it with `cluster`.
async fn refer_registry(
    registry: Arc<dyn Registry>,
    reference: &ServiceUrl,
    cluster: &dyn Cluster,
    extensions: &Arc<ExtensionRegistry>,
) -> Result<Arc<dyn Invoker>> {
    let directory_url = registry.url().clone().with_sub_url(reference.clone());
    let directory = RegistryDirectory::new(directory_url, registry, extensions.clone())?;
    if let Err(e) = directory.subscribe(reference.clone()).await {
        directory.destroy();
        return Err(e);
    }
    Ok(cluster.join(directory, extensions.clone()))
}

/// Refers one direct provider URL and wraps it in the reference's filters.
fn refer_direct(
    provider: &ServiceUrl,
    reference: &ServiceUrl,
    extensions: &ExtensionRegistry,
) -> Result<Arc<dyn Invoker>> {
    let merged = ServiceUrl::merge_reference(provider, reference);
    let invoker = extensions.protocol(merged.protocol())?.refer(merged.clone())?;
    match extensions.reference_filters(&merged) {
        Ok(filters) => Ok(build_invoker_chain(invoker, &filters)),
        Err(e) => {
            invoker.destroy();
            Err(e)
        }
    }
}
