//! Tether Registry
//!
//! Provider discovery for the client pipeline. A [`Registry`] hands out one
//! [`Listener`] per subscription; the listener turns the registry's raw
//! notifications into a typed stream of [`ServiceEvent`]s.
//!
//! # Components
//!
//! - [`ConfigurationListener`]: the bounded event queue behind
//!   [`Listener::next`], with connection-loss and shutdown signalling
//! - [`DataListener`]: parses raw notifications and forwards only those
//!   matching a subscription of interest
//! - [`RegistrySession`]: liveness of the connection to the registry backend
//! - [`MemoryRegistry`]: an in-process registry, used for tests and for
//!   single-process deployments
//!
//! # Event Flow
//!
//! ```text
//! backend notification -> DataListener::data_change -> EventSink (bounded)
//!                                                         |
//!                      RegistryDirectory <- Listener::next
//! ```

mod event;
mod listener;
mod memory;
mod registry;
mod session;

pub use event::{ConfigChangeEvent, EventType, ServiceEvent};
pub use listener::{event_queue, ConfigurationListener, DataListener, EventSink, EVENT_QUEUE_CAPACITY};
pub use memory::MemoryRegistry;
pub use registry::{Listener, Registry};
pub use session::{RegistrySession, SessionState};
