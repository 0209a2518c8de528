use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tether_common::constants::{CLUSTER_KEY, DEFAULT_CLUSTER};
use tether_common::{same_invoker, Invocation, Invoker, Result, ServiceUrl, TetherError};
use tether_filter::build_invoker_chain;
use tether_registry::{EventType, Listener, Registry, ServiceEvent};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{DestroyFlag, Directory, StaticDirectory};
use crate::extension::ExtensionRegistry;

struct CachedInvoker {
    invoker: Arc<dyn Invoker>,
    group: String,
    cluster: String,
}

/// Cluster invoker standing for one group, with the members it was built over.
struct GroupFacade {
    cluster: String,
    members: Vec<Arc<dyn Invoker>>,
    invoker: Arc<dyn Invoker>,
}

impl GroupFacade {
    fn serves(&self, cluster: &str, members: &[Arc<dyn Invoker>]) -> bool {
        self.cluster == cluster
            && self.members.len() == members.len()
            && self
                .members
                .iter()
                .zip(members)
                .all(|(a, b)| same_invoker(a, b))
    }
}

struct Subscription {
    url: ServiceUrl,
    task: JoinHandle<()>,
}

/// Invoker set for one service, kept current from registry events.
///
/// Events are applied by one background task per subscription. All cache
/// mutation happens under a single lock; `list()` reads an immutable
/// snapshot that is swapped after every mutation, so calls never observe a
/// half-applied event.
///
/// When providers span several groups, `list()` returns one cluster
/// invoker per group instead of the raw invokers. A group's cluster invoker
/// is kept across events until its members change.
pub struct RegistryDirectory {
    url: ServiceUrl,
    reference: ServiceUrl,
    registry: Arc<dyn Registry>,
    extensions: Arc<ExtensionRegistry>,
    /// Provider key -> invoker. Guarded for writes only.
    cache: Mutex<BTreeMap<String, CachedInvoker>>,
    snapshot: ArcSwap<Vec<Arc<dyn Invoker>>>,
    /// Group -> cluster invoker. Only locked while `cache` is held.
    facades: Mutex<BTreeMap<String, GroupFacade>>,
    subscriptions: Mutex<Vec<Subscription>>,
    destroyed: DestroyFlag,
}

impl RegistryDirectory {
    /// Creates a directory for the reference carried as `url`'s sub URL.
    ///
    /// # Errors
    /// Returns [`TetherError::Configuration`] when `url` has no sub URL.
    pub fn new(
        url: ServiceUrl,
        registry: Arc<dyn Registry>,
        extensions: Arc<ExtensionRegistry>,
    ) -> Result<Arc<Self>> {
        let reference = url.sub_url().cloned().ok_or_else(|| {
            TetherError::Configuration(format!(
                "registry URL '{}' carries no reference sub URL",
                url
            ))
        })?;

        Ok(Arc::new(Self {
            url,
            reference,
            registry,
            extensions,
            cache: Mutex::new(BTreeMap::new()),
            snapshot: ArcSwap::from_pointee(Vec::new()),
            facades: Mutex::new(BTreeMap::new()),
            subscriptions: Mutex::new(Vec::new()),
            destroyed: DestroyFlag::default(),
        }))
    }

    /// Starts watching providers matching `url`.
    ///
    /// Returns once the registry accepted the subscription; events are then
    /// applied by a background task until the listener terminates or the
    /// directory is destroyed.
    ///
    /// # Errors
    /// Returns [`TetherError::Configuration`] for a URL naming no service,
    /// [`TetherError::Destroyed`] after [`destroy`](Directory::destroy), and
    /// whatever the registry reports when it refuses the subscription.
    pub async fn subscribe(self: &Arc<Self>, url: ServiceUrl) -> Result<()> {
        if url.service().is_empty() {
            return Err(TetherError::Configuration(format!(
                "subscription URL '{}' names no service",
                url
            )));
        }
        if self.destroyed.is_set() {
            return Err(TetherError::destroyed(url.service()));
        }

        let listener = self.registry.subscribe(&url).await?;
        info!("Subscribed to {} on {}", url.service_key(), self.url.location());

        // registered before the task starts so its first events pass the
        // interest check
        let mut subscriptions = self.subscriptions.lock();
        if self.destroyed.is_set() {
            return Err(TetherError::destroyed(url.service()));
        }
        let task = tokio::spawn(watch(Arc::downgrade(self), listener));
        subscriptions.push(Subscription { url, task });
        Ok(())
    }

    /// Consumer reference this directory serves.
    pub fn reference(&self) -> &ServiceUrl {
        &self.reference
    }

    /// Number of cached provider invokers, across all groups.
    pub fn cached_invoker_count(&self) -> usize {
        self.cache.lock().len()
    }

    fn is_interested(&self, provider: &ServiceUrl) -> bool {
        self.subscriptions
            .lock()
            .iter()
            .any(|subscription| provider.matches_service(&subscription.url))
    }

    /// Applies one registry event to the cache.
    pub(crate) fn update(&self, event: ServiceEvent) {
        if self.destroyed.is_set() {
            return;
        }
        if !self.is_interested(&event.service) {
            debug!("Ignoring event for unrelated service {}", event.service);
            return;
        }

        let key = event.service.key();
        let mut cache = self.cache.lock();
        if self.destroyed.is_set() {
            return;
        }

        match event.action {
            EventType::Add => {
                if cache.contains_key(&key) {
                    debug!("Provider {} already cached", key);
                    return;
                }
                if let Some(entry) = self.refer(&event.service) {
                    cache.insert(key, entry);
                }
            }
            EventType::Update => {
                if let Some(stale) = cache.remove(&key) {
                    stale.invoker.destroy();
                }
                if let Some(entry) = self.refer(&event.service) {
                    cache.insert(key, entry);
                }
            }
            EventType::Delete => match cache.remove(&key) {
                Some(removed) => {
                    info!("Provider {} removed", key);
                    removed.invoker.destroy();
                }
                None => debug!("Delete for unknown provider {}", key),
            },
        }

        self.refresh(&cache);
    }

    /// Creates the filter-wrapped invoker for a discovered provider.
    fn refer(&self, provider: &ServiceUrl) -> Option<CachedInvoker> {
        let merged = ServiceUrl::merge_reference(provider, &self.reference);
        let referred = self
            .extensions
            .protocol(merged.protocol())
            .and_then(|protocol| protocol.refer(merged.clone()))
            .and_then(|invoker| match self.extensions.reference_filters(&merged) {
                Ok(filters) => Ok(build_invoker_chain(invoker, &filters)),
                Err(e) => {
                    invoker.destroy();
                    Err(e)
                }
            });

        match referred {
            Ok(invoker) => {
                info!("Provider {} added", merged.key());
                Some(CachedInvoker {
                    invoker,
                    group: merged.group().to_string(),
                    cluster: merged.param_or(CLUSTER_KEY, DEFAULT_CLUSTER).to_string(),
                })
            }
            Err(e) => {
                error!("Failed to refer provider {}: {}", merged, e);
                None
            }
        }
    }

    /// Rebuilds the read snapshot. Called with the cache lock held.
    fn refresh(&self, cache: &BTreeMap<String, CachedInvoker>) {
        let mut groups: BTreeMap<&str, Vec<&CachedInvoker>> = BTreeMap::new();
        for entry in cache.values() {
            groups.entry(entry.group.as_str()).or_default().push(entry);
        }

        let mut facades = self.facades.lock();
        let invokers: Vec<Arc<dyn Invoker>> = if groups.len() <= 1 {
            // dropped facades share their members with the cache, which owns them
            facades.clear();
            cache.values().map(|entry| entry.invoker.clone()).collect()
        } else {
            facades.retain(|group, _| groups.contains_key(group.as_str()));
            groups
                .into_iter()
                .map(|(group, entries)| self.join_group(&mut facades, group, &entries))
                .collect()
        };
        self.snapshot.store(Arc::new(invokers));
    }

    /// The cluster invoker for one group, rebuilt only when its members
    /// or cluster policy changed.
    fn join_group(
        &self,
        facades: &mut BTreeMap<String, GroupFacade>,
        group: &str,
        entries: &[&CachedInvoker],
    ) -> Arc<dyn Invoker> {
        let members: Vec<Arc<dyn Invoker>> =
            entries.iter().map(|entry| entry.invoker.clone()).collect();
        let name = entries
            .first()
            .map(|entry| entry.cluster.as_str())
            .unwrap_or(DEFAULT_CLUSTER);
        if let Some(facade) = facades.get(group).filter(|facade| facade.serves(name, &members)) {
            return facade.invoker.clone();
        }

        let cluster = self.extensions.cluster(name).unwrap_or_else(|e| {
            warn!("{}, falling back to {}", e, DEFAULT_CLUSTER);
            self.extensions.default_cluster()
        });
        let invoker = cluster.join(
            Arc::new(StaticDirectory::new(members.clone())),
            self.extensions.clone(),
        );
        debug!("Joined {} provider(s) of group '{}'", members.len(), group);
        facades.insert(
            group.to_string(),
            GroupFacade {
                cluster: name.to_string(),
                members,
                invoker: invoker.clone(),
            },
        );
        invoker
    }
}

/// Applies events from `listener` until it terminates or the directory goes away.
async fn watch(directory: Weak<RegistryDirectory>, mut listener: Box<dyn Listener>) {
    loop {
        let event = listener.next().await;
        let Some(directory) = directory.upgrade() else {
            listener.close();
            return;
        };

        match event {
            Ok(event) => directory.update(event),
            Err(e) => {
                // the cache keeps serving its last known providers
                warn!(
                    "Stopped watching providers for {}: {}",
                    directory.reference.service_key(),
                    e
                );
                listener.close();
                return;
            }
        }
    }
}

impl Directory for RegistryDirectory {
    fn url(&self) -> &ServiceUrl {
        &self.url
    }

    fn list(&self, _invocation: &Invocation) -> Vec<Arc<dyn Invoker>> {
        if self.destroyed.is_set() {
            return Vec::new();
        }
        self.snapshot.load().to_vec()
    }

    fn is_available(&self) -> bool {
        !self.destroyed.is_set()
            && self
                .snapshot
                .load()
                .iter()
                .any(|invoker| invoker.is_available())
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.is_set()
    }

    fn destroy(&self) {
        if !self.destroyed.set() {
            return;
        }
        info!("Destroying directory for {}", self.reference.service_key());

        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in subscriptions {
            subscription.task.abort();
            if let Err(e) = self.registry.unsubscribe(&subscription.url) {
                warn!("Failed to unsubscribe {}: {}", subscription.url, e);
            }
        }

        let mut cache = self.cache.lock();
        let drained = std::mem::take(&mut *cache);
        self.facades.lock().clear();
        self.snapshot.store(Arc::new(Vec::new()));
        drop(cache);

        for entry in drained.into_values() {
            entry.invoker.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockProtocol, SERVICE};
    use std::time::Duration;
    use tether_common::constants::GROUP_KEY;
    use tether_registry::MemoryRegistry;

    fn registry_url() -> ServiceUrl {
        ServiceUrl::new("registry", "127.0.0.1", 1111, "")
            .with_sub_url(ServiceUrl::new("mock", "127.0.0.1", 20000, SERVICE))
    }

    fn provider(port: u16) -> ServiceUrl {
        ServiceUrl::new("mock", "127.0.0.1", port, SERVICE)
    }

    struct Fixture {
        registry: Arc<MemoryRegistry>,
        protocol: Arc<MockProtocol>,
        directory: Arc<RegistryDirectory>,
    }

    async fn subscribed() -> Fixture {
        let registry = Arc::new(MemoryRegistry::new(ServiceUrl::new("registry", "127.0.0.1", 1111, "")));
        let protocol = Arc::new(MockProtocol::new());
        let extensions = Arc::new(ExtensionRegistry::with_defaults().with_protocol("mock", protocol.clone()));
        let directory =
            RegistryDirectory::new(registry_url(), registry.clone(), extensions).unwrap();
        directory
            .subscribe(ServiceUrl::for_service(SERVICE))
            .await
            .unwrap();
        Fixture {
            registry,
            protocol,
            directory,
        }
    }

    async fn wait_for_count(directory: &RegistryDirectory, expected: usize) {
        for _ in 0..200 {
            if directory.list(&Invocation::new("m", vec![])).len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "directory lists {} invokers, expected {}",
            directory.list(&Invocation::new("m", vec![])).len(),
            expected
        );
    }

    #[tokio::test]
    async fn test_new_requires_sub_url() {
        let registry = Arc::new(MemoryRegistry::new(ServiceUrl::new("registry", "127.0.0.1", 1111, "")));
        let result = RegistryDirectory::new(
            ServiceUrl::new("mock", "127.0.0.1", 1111, ""),
            registry,
            Arc::new(ExtensionRegistry::with_defaults()),
        );
        assert!(matches!(result, Err(TetherError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_url_without_service() {
        let f = subscribed().await;
        let err = f
            .directory
            .subscribe(ServiceUrl::new("mock", "127.0.0.1", 1, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_add_then_delete() {
        let f = subscribed().await;
        for port in 1..=3 {
            f.registry.register(provider(port)).await.unwrap();
        }
        wait_for_count(&f.directory, 3).await;
        assert!(f.directory.is_available());

        f.registry.unregister(&provider(1)).await.unwrap();
        wait_for_count(&f.directory, 2).await;
        assert!(f.directory.is_available());

        let referred = f.protocol.referred();
        let removed = referred
            .iter()
            .find(|invoker| invoker.url().port() == Some(1))
            .unwrap();
        assert!(removed.is_destroyed());
    }

    #[tokio::test]
    async fn test_deleting_every_provider_leaves_nothing_to_call() {
        let f = subscribed().await;
        for port in 1..=3 {
            f.registry.register(provider(port)).await.unwrap();
        }
        wait_for_count(&f.directory, 3).await;

        f.registry.unregister(&provider(1)).await.unwrap();
        wait_for_count(&f.directory, 2).await;
        assert!(f.directory.is_available());

        f.registry.unregister(&provider(2)).await.unwrap();
        f.registry.unregister(&provider(3)).await.unwrap();
        wait_for_count(&f.directory, 0).await;

        assert!(f.directory.list(&Invocation::new("m", vec![])).is_empty());
        assert!(!f.directory.is_available());
        assert_eq!(f.directory.cached_invoker_count(), 0);
        assert!(f.protocol.referred().iter().all(|invoker| invoker.is_destroyed()));
    }

    #[tokio::test]
    async fn test_add_immediately_followed_by_delete() {
        let f = subscribed().await;
        f.directory.update(ServiceEvent::new(EventType::Add, provider(5)));
        f.directory.update(ServiceEvent::new(EventType::Delete, provider(5)));

        assert_eq!(f.directory.cached_invoker_count(), 0);
        assert!(f.directory.list(&Invocation::new("m", vec![])).is_empty());
        assert!(!f.directory.is_available());
        let referred = f.protocol.referred();
        assert_eq!(referred.len(), 1);
        assert!(referred[0].is_destroyed());

        // same through the registry, without waiting in between
        f.registry.register(provider(6)).await.unwrap();
        f.registry.unregister(&provider(6)).await.unwrap();
        f.registry.register(provider(7)).await.unwrap();
        wait_for_count(&f.directory, 1).await;
        let listed = f.directory.list(&Invocation::new("m", vec![]));
        assert_eq!(listed[0].url().port(), Some(7));
    }

    #[tokio::test]
    async fn test_merge_uses_reference_parameters() {
        let registry = Arc::new(MemoryRegistry::new(ServiceUrl::new("registry", "127.0.0.1", 1111, "")));
        let protocol = Arc::new(MockProtocol::new());
        let extensions = Arc::new(ExtensionRegistry::with_defaults().with_protocol("mock", protocol.clone()));
        let reference = ServiceUrl::for_service(SERVICE)
            .with_param(CLUSTER_KEY, "failover")
            .with_param("retries", "3");
        let url = ServiceUrl::new("registry", "127.0.0.1", 1111, "").with_sub_url(reference);
        let directory = RegistryDirectory::new(url, registry.clone(), extensions).unwrap();
        directory.subscribe(ServiceUrl::for_service(SERVICE)).await.unwrap();

        registry
            .register(provider(1).with_param("timeout", "5000").with_param("retries", "0"))
            .await
            .unwrap();
        wait_for_count(&directory, 1).await;

        let merged = protocol.referred()[0].url().clone();
        assert_eq!(merged.param(CLUSTER_KEY), Some("failover"));
        assert_eq!(merged.param("retries"), Some("3"));
        assert_eq!(merged.param("timeout"), Some("5000"));
    }

    #[tokio::test]
    async fn test_update_replaces_invoker() {
        let f = subscribed().await;
        f.registry.register(provider(1)).await.unwrap();
        wait_for_count(&f.directory, 1).await;

        f.registry
            .register(provider(1).with_param("weight", "10"))
            .await
            .unwrap();
        for _ in 0..200 {
            if f.protocol.referred().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let referred = f.protocol.referred();
        assert_eq!(referred.len(), 2);
        assert!(referred[0].is_destroyed());
        assert_eq!(referred[1].url().param("weight"), Some("10"));
        assert_eq!(f.directory.list(&Invocation::new("m", vec![])).len(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_events_are_ignored() {
        let f = subscribed().await;
        f.directory.update(ServiceEvent::new(
            EventType::Add,
            ServiceUrl::new("mock", "127.0.0.1", 9, "com.Other"),
        ));
        assert_eq!(f.directory.cached_invoker_count(), 0);
    }

    #[tokio::test]
    async fn test_groups_are_joined_per_cluster() {
        let f = subscribed().await;
        for group in ["group1", "group2"] {
            for port in 1..=3 {
                f.registry
                    .register(
                        provider(port)
                            .with_param(GROUP_KEY, group)
                            .with_param(CLUSTER_KEY, "failover"),
                    )
                    .await
                    .unwrap();
            }
        }

        for _ in 0..200 {
            if f.directory.cached_invoker_count() == 6 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(f.directory.cached_invoker_count(), 6);
        assert_eq!(f.directory.list(&Invocation::new("m", vec![])).len(), 2);
        assert!(f.directory.is_available());
    }

    #[tokio::test]
    async fn test_unchanged_groups_keep_their_cluster_invoker() {
        let f = subscribed().await;
        for group in ["group1", "group2"] {
            for port in 1..=2 {
                f.registry
                    .register(provider(port).with_param(GROUP_KEY, group))
                    .await
                    .unwrap();
            }
        }
        for _ in 0..200 {
            if f.directory.cached_invoker_count() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let before = f.directory.list(&Invocation::new("m", vec![]));
        assert_eq!(before.len(), 2);

        f.registry
            .register(provider(3).with_param(GROUP_KEY, "group1"))
            .await
            .unwrap();
        for _ in 0..200 {
            if f.directory.cached_invoker_count() == 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let after = f.directory.list(&Invocation::new("m", vec![]));
        assert_eq!(after.len(), 2);

        // groups are listed in name order
        assert!(!same_invoker(&before[0], &after[0]));
        assert!(same_invoker(&before[1], &after[1]));

        // back to a single group: raw invokers again
        for port in 1..=2 {
            f.registry
                .unregister(&provider(port).with_param(GROUP_KEY, "group2"))
                .await
                .unwrap();
        }
        wait_for_count(&f.directory, 3).await;
        assert!(f
            .directory
            .list(&Invocation::new("m", vec![]))
            .iter()
            .all(|invoker| invoker.url().group() == "group1"));
    }

    #[tokio::test]
    async fn test_destroy_empties_cache_once() {
        let f = subscribed().await;
        for port in 1..=3 {
            f.registry.register(provider(port)).await.unwrap();
        }
        wait_for_count(&f.directory, 3).await;

        f.directory.destroy();
        f.directory.destroy();

        assert!(f.directory.is_destroyed());
        assert!(!f.directory.is_available());
        assert!(f.directory.list(&Invocation::new("m", vec![])).is_empty());
        assert_eq!(f.directory.cached_invoker_count(), 0);
        assert!(f.protocol.referred().iter().all(|invoker| invoker.is_destroyed()));
        assert_eq!(f.registry.subscription_count(), 0);

        // later events are ignored
        f.directory
            .update(ServiceEvent::new(EventType::Add, provider(7)));
        assert_eq!(f.directory.cached_invoker_count(), 0);
    }

    #[tokio::test]
    async fn test_listener_termination_keeps_last_known_providers() {
        let f = subscribed().await;
        f.registry.register(provider(1)).await.unwrap();
        wait_for_count(&f.directory, 1).await;

        f.registry.session().close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(f.directory.list(&Invocation::new("m", vec![])).len(), 1);
        assert!(f.directory.is_available());
    }
}
