use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tether_common::{Result, ServiceUrl, TerminationReason, TetherError};
use tokio_util::sync::CancellationToken;

use crate::event::{EventType, ServiceEvent};
use crate::listener::{event_queue, ConfigurationListener, DataListener};
use crate::registry::{Listener, Registry};
use crate::session::RegistrySession;

struct Subscription {
    pattern: ServiceUrl,
    listener: Arc<DataListener>,
}

#[derive(Default)]
struct State {
    /// Registered providers keyed by [`ServiceUrl::key`]
    providers: BTreeMap<String, ServiceUrl>,
    subscriptions: Vec<Subscription>,
}

/// In-process registry.
///
/// Providers registered here are announced to every matching subscription
/// through the same [`DataListener`] path a networked backend would use, so
/// notifications travel as URL text and are filtered by interest.
///
/// A table change and its notification happen under one publish lock, so
/// every subscription sees changes in the order they were applied.
pub struct MemoryRegistry {
    url: ServiceUrl,
    session: RegistrySession,
    shutdown: CancellationToken,
    state: Mutex<State>,
    publish: tokio::sync::Mutex<()>,
}

impl MemoryRegistry {
    pub fn new(url: ServiceUrl) -> Self {
        Self {
            url,
            session: RegistrySession::new(),
            shutdown: CancellationToken::new(),
            state: Mutex::new(State::default()),
            publish: tokio::sync::Mutex::new(()),
        }
    }

    /// Connection liveness; flip it to simulate reconnects and outages.
    pub fn session(&self) -> &RegistrySession {
        &self.session
    }

    /// Delivers a raw event to every live subscription interested in it,
    /// whether or not the provider is registered.
    pub async fn notify(&self, event: ServiceEvent) {
        let _publish = self.publish.lock().await;
        self.deliver(event).await;
    }

    /// Called with the publish lock held.
    async fn deliver(&self, event: ServiceEvent) {
        let listeners: Vec<Arc<DataListener>> = {
            let mut state = self.state.lock();
            state.subscriptions.retain(|s| !s.listener.is_closed());
            state
                .subscriptions
                .iter()
                .map(|s| s.listener.clone())
                .collect()
        };

        let content = event.service.to_string();
        for listener in listeners {
            listener.data_change(&content, event.action).await;
        }
    }

    /// Number of subscriptions still being served.
    pub fn subscription_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscriptions.retain(|s| !s.listener.is_closed());
        state.subscriptions.len()
    }

    fn check_open(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(TetherError::ListenerTerminated(
                TerminationReason::RegistryShutdown,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    fn url(&self) -> &ServiceUrl {
        &self.url
    }

    async fn register(&self, url: ServiceUrl) -> Result<()> {
        self.check_open()?;
        let _publish = self.publish.lock().await;
        let previous = self.state.lock().providers.insert(url.key(), url.clone());
        let action = match previous {
            None => EventType::Add,
            Some(previous) if previous == url => return Ok(()),
            Some(_) => EventType::Update,
        };
        tracing::info!("Registered provider {}", url);
        self.deliver(ServiceEvent::new(action, url)).await;
        Ok(())
    }

    async fn unregister(&self, url: &ServiceUrl) -> Result<()> {
        self.check_open()?;
        let _publish = self.publish.lock().await;
        let removed = self.state.lock().providers.remove(&url.key());
        if let Some(removed) = removed {
            tracing::info!("Unregistered provider {}", removed);
            self.deliver(ServiceEvent::new(EventType::Delete, removed)).await;
        }
        Ok(())
    }

    async fn subscribe(&self, url: &ServiceUrl) -> Result<Box<dyn Listener>> {
        self.check_open()?;
        if url.service().is_empty() {
            return Err(TetherError::Configuration(format!(
                "subscription URL '{}' names no service",
                url
            )));
        }

        let (sink, rx) = event_queue();
        let data_listener = Arc::new(DataListener::new(sink));
        data_listener.add_interested_url(url.clone());

        // no registration is in flight while the publish lock is held, so each
        // provider is either replayed here or delivered live, never both
        let _publish = self.publish.lock().await;
        let backlog: Vec<ServiceEvent> = {
            let mut state = self.state.lock();
            state.subscriptions.push(Subscription {
                pattern: url.clone(),
                listener: data_listener,
            });
            state
                .providers
                .values()
                .filter(|provider| provider.matches_service(url))
                .map(|provider| ServiceEvent::new(EventType::Add, provider.clone()))
                .collect()
        };

        tracing::info!(
            "Subscribed to {} ({} providers known)",
            url.service_key(),
            backlog.len()
        );
        let listener = ConfigurationListener::new(rx, self.session.watch(), self.shutdown.clone())
            .with_backlog(backlog);
        Ok(Box::new(listener))
    }

    fn unsubscribe(&self, url: &ServiceUrl) -> Result<()> {
        let key = url.key();
        let mut state = self.state.lock();
        let before = state.subscriptions.len();
        state.subscriptions.retain(|s| s.pattern.key() != key);
        tracing::info!(
            "Unsubscribed {} ({} listeners released)",
            url.service_key(),
            before - state.subscriptions.len()
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.shutdown.is_cancelled() && self.session.is_valid()
    }

    fn destroy(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        tracing::info!("Destroying registry {}", self.url);
        self.shutdown.cancel();
        let mut state = self.state.lock();
        state.subscriptions.clear();
        state.providers.clear();
    }
}
