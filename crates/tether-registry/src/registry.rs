use async_trait::async_trait;
use tether_common::{Result, ServiceUrl};

use crate::event::ServiceEvent;

/// Source of provider events for subscriptions.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Address of the registry itself.
    fn url(&self) -> &ServiceUrl;

    /// Publishes a provider.
    async fn register(&self, url: ServiceUrl) -> Result<()>;

    /// Withdraws a provider published with [`register`](Self::register).
    async fn unregister(&self, url: &ServiceUrl) -> Result<()>;

    /// Starts watching providers matching `url`.
    ///
    /// Providers already known to the registry are delivered first, as
    /// `Add` events.
    async fn subscribe(&self, url: &ServiceUrl) -> Result<Box<dyn Listener>>;

    /// Stops delivery to every listener created for `url`. Their `next()`
    /// returns a terminal error once the queued events are drained.
    fn unsubscribe(&self, url: &ServiceUrl) -> Result<()>;

    /// Whether the registry is open and its connection is valid.
    fn is_available(&self) -> bool;

    /// Shuts the registry down; every listener terminates.
    fn destroy(&self);
}

/// A per-subscription stream of provider events.
#[async_trait]
pub trait Listener: Send {
    /// Waits for the next event.
    ///
    /// # Errors
    /// Returns [`TetherError::ListenerTerminated`](tether_common::TetherError::ListenerTerminated)
    /// once the connection breaks, the registry shuts down or the
    /// subscription is cancelled. The listener yields nothing afterwards.
    async fn next(&mut self) -> Result<ServiceEvent>;

    fn close(&mut self);
}
