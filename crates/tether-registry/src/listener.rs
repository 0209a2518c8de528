use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tether_common::{Result, ServiceUrl, TerminationReason, TetherError};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::event::{ConfigChangeEvent, EventType, ServiceEvent};
use crate::registry::Listener;
use crate::session::SessionState;

/// Events buffered per subscription before producers start waiting.
pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Longest a producer waits on a saturated queue before dropping the event.
const PROCESS_TIMEOUT: Duration = Duration::from_secs(3);

/// Creates the bounded queue between a [`DataListener`] and a
/// [`ConfigurationListener`].
pub fn event_queue() -> (EventSink, mpsc::Receiver<ConfigChangeEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    (EventSink { tx }, rx)
}

/// Producer half of a listener's event queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ConfigChangeEvent>,
}

impl EventSink {
    /// Queues an event.
    ///
    /// Never waits while the queue has room. On a full queue the producer
    /// waits at most a few seconds, then drops the event so that one slow
    /// consumer cannot stall delivery to the others.
    ///
    /// Returns `false` when the event was not queued.
    pub async fn process(&self, event: ConfigChangeEvent) -> bool {
        let event = match self.tx.try_send(event) {
            Ok(()) => return true,
            Err(mpsc::error::TrySendError::Closed(_)) => return false,
            Err(mpsc::error::TrySendError::Full(event)) => event,
        };

        tracing::warn!(
            "Event queue full ({} events), waiting to deliver {} {}",
            EVENT_QUEUE_CAPACITY,
            event.action,
            event.value
        );
        match self.tx.send_timeout(event, PROCESS_TIMEOUT).await {
            Ok(()) => true,
            Err(mpsc::error::SendTimeoutError::Timeout(event)) => {
                tracing::error!(
                    "Dropped {} event for {} after {:?}: listener is not consuming",
                    event.action,
                    event.value,
                    PROCESS_TIMEOUT
                );
                false
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => false,
        }
    }

    /// Whether the consuming listener is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Forwards raw registry notifications for the URLs it is interested in.
#[derive(Debug)]
pub struct DataListener {
    interested: RwLock<Vec<ServiceUrl>>,
    sink: EventSink,
}

impl DataListener {
    pub fn new(sink: EventSink) -> Self {
        Self {
            interested: RwLock::new(Vec::new()),
            sink,
        }
    }

    pub fn add_interested_url(&self, url: ServiceUrl) {
        self.interested.write().push(url);
    }

    pub fn is_interested(&self, url: &ServiceUrl) -> bool {
        self.interested
            .read()
            .iter()
            .any(|interest| url.matches_service(interest))
    }

    /// Handles one raw notification; `content` is the provider URL text.
    ///
    /// Returns `true` when the event matched an interest and was queued.
    pub async fn data_change(&self, content: &str, action: EventType) -> bool {
        let service = match ServiceUrl::parse(content) {
            Ok(service) => service,
            Err(e) => {
                tracing::error!("Ignoring registry notification '{}': {}", content, e);
                return false;
            }
        };

        if !self.is_interested(&service) {
            return false;
        }
        self.sink
            .process(ConfigChangeEvent { value: service, action })
            .await
    }

    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

/// Consumer half of a subscription: the [`Listener`] handed to a directory.
pub struct ConfigurationListener {
    backlog: VecDeque<ServiceEvent>,
    events: mpsc::Receiver<ConfigChangeEvent>,
    session: watch::Receiver<SessionState>,
    shutdown: CancellationToken,
    terminated: Option<TerminationReason>,
}

impl ConfigurationListener {
    pub fn new(
        events: mpsc::Receiver<ConfigChangeEvent>,
        session: watch::Receiver<SessionState>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            backlog: VecDeque::new(),
            events,
            session,
            shutdown,
            terminated: None,
        }
    }

    /// Events returned by `next()` before anything from the queue.
    pub fn with_backlog(mut self, backlog: impl IntoIterator<Item = ServiceEvent>) -> Self {
        self.backlog.extend(backlog);
        self
    }

    fn is_valid(&self) -> bool {
        *self.session.borrow() == SessionState::Connected
    }

    fn pending_termination(&self) -> Option<TerminationReason> {
        if self.shutdown.is_cancelled() {
            Some(TerminationReason::RegistryShutdown)
        } else if *self.session.borrow() == SessionState::Closed {
            Some(TerminationReason::ConnectionBroken)
        } else {
            None
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> TetherError {
        match reason {
            TerminationReason::ConnectionBroken => tracing::warn!(
                "Registry connection is broken, event listener exits now"
            ),
            TerminationReason::RegistryShutdown => tracing::warn!(
                "Registry has been shut down, event listener exits now"
            ),
            TerminationReason::Unsubscribed => tracing::info!(
                "Subscription cancelled, event listener exits now"
            ),
        }
        self.terminated = Some(reason);
        self.events.close();
        TetherError::ListenerTerminated(reason)
    }
}

/// Resolves once the session is closed or its owner is gone.
async fn connection_lost(session: &mut watch::Receiver<SessionState>) {
    loop {
        if *session.borrow_and_update() == SessionState::Closed {
            return;
        }
        if session.changed().await.is_err() {
            return;
        }
    }
}

#[async_trait]
impl Listener for ConfigurationListener {
    async fn next(&mut self) -> Result<ServiceEvent> {
        loop {
            if let Some(reason) = self.terminated {
                return Err(TetherError::ListenerTerminated(reason));
            }

            let received = match self.backlog.pop_front() {
                Some(event) => match self.pending_termination() {
                    Some(reason) => Err(reason),
                    None => Ok(ConfigChangeEvent {
                        value: event.service,
                        action: event.action,
                    }),
                },
                None => tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => Err(TerminationReason::RegistryShutdown),
                    _ = connection_lost(&mut self.session) => Err(TerminationReason::ConnectionBroken),
                    event = self.events.recv() => event.ok_or(TerminationReason::Unsubscribed),
                },
            };

            let event = match received {
                Ok(event) => event,
                Err(reason) => return Err(self.terminate(reason)),
            };

            tracing::debug!("Got registry event {} {}", event.action, event.value);
            if event.action == EventType::Delete && !self.is_valid() {
                tracing::warn!(
                    "Ignoring delete of {}: connection to the registry is invalid",
                    event.value
                );
                continue;
            }
            return Ok(event.into());
        }
    }

    fn close(&mut self) {
        if self.terminated.is_none() {
            self.terminated = Some(TerminationReason::Unsubscribed);
        }
        self.backlog.clear();
        self.events.close();
    }
}
