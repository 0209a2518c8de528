use std::fmt;

use tether_common::ServiceUrl;

/// Kind of provider membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Add,
    Update,
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Add => f.write_str("add"),
            EventType::Update => f.write_str("update"),
            EventType::Delete => f.write_str("delete"),
        }
    }
}

/// A provider change as seen by a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub action: EventType,
    pub service: ServiceUrl,
}

impl ServiceEvent {
    pub fn new(action: EventType, service: ServiceUrl) -> Self {
        Self { action, service }
    }
}

impl fmt::Display for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceEvent{{action: {}, service: {}}}", self.action, self.service)
    }
}

/// A parsed registry notification waiting in a listener's queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChangeEvent {
    pub value: ServiceUrl,
    pub action: EventType,
}

impl From<ConfigChangeEvent> for ServiceEvent {
    fn from(event: ConfigChangeEvent) -> Self {
        ServiceEvent::new(event.action, event.value)
    }
}
