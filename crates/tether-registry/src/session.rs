use tokio::sync::watch;

/// Connection state of a registry session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// Connection lost, reconnect in progress. Deletes are not trusted.
    Reconnecting,
    /// Connection broken for good.
    Closed,
}

/// Liveness signal shared between a registry and its listeners.
#[derive(Debug)]
pub struct RegistrySession {
    state: watch::Sender<SessionState>,
}

impl RegistrySession {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Connected);
        Self { state }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the connection can currently be trusted.
    pub fn is_valid(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn set_connected(&self) {
        self.transition(SessionState::Connected);
    }

    pub fn set_reconnecting(&self) {
        self.transition(SessionState::Reconnecting);
    }

    pub fn close(&self) {
        self.transition(SessionState::Closed);
    }

    fn transition(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            // Closed is final
            if *state == SessionState::Closed || *state == next {
                return false;
            }
            tracing::info!("Registry session {:?} -> {:?}", state, next);
            *state = next;
            true
        });
    }
}

impl Default for RegistrySession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let session = RegistrySession::new();
        assert!(session.is_valid());

        session.set_reconnecting();
        assert_eq!(session.state(), SessionState::Reconnecting);
        assert!(!session.is_valid());

        session.set_connected();
        assert!(session.is_valid());

        session.close();
        session.set_connected();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_watchers_see_changes() {
        let session = RegistrySession::new();
        let mut watcher = session.watch();

        session.set_reconnecting();
        watcher.changed().await.unwrap();
        assert_eq!(*watcher.borrow_and_update(), SessionState::Reconnecting);
    }
}
