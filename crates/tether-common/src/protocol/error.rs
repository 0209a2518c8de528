use std::fmt;

use thiserror::Error;

use crate::utils::VERSION;

/// Why a registry listener stopped producing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The registry connection broke; the listener must be re-created.
    ConnectionBroken,
    /// The registry itself was shut down.
    RegistryShutdown,
    /// The subscription was cancelled and its event queue closed.
    Unsubscribed,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::ConnectionBroken => f.write_str("registry connection broken"),
            TerminationReason::RegistryShutdown => f.write_str("registry shut down"),
            TerminationReason::Unsubscribed => f.write_str("subscription cancelled"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(
        "Failed to invoke the method {method}. No provider available for the service {service_key} \
         from registry {registry} on the consumer {consumer_ip} using tether version {version}. \
         Check that providers have been started and registered."
    )]
    NoProvider {
        method: String,
        service_key: String,
        registry: String,
        consumer_ip: String,
        version: &'static str,
    },

    #[error(
        "Invoker for {service} on the consumer {consumer_ip} using tether version \
         {version} is destroyed and cannot be used any more"
    )]
    Destroyed {
        service: String,
        consumer_ip: String,
        version: &'static str,
    },

    #[error(
        "Failed to invoke the method {method} in the service {service}. Tried {attempts} times \
         of the providers {providers:?} ({selected}/{total}) from the registry {registry} on the \
         consumer {consumer_ip} using tether version {version}. Last error is {last}"
    )]
    RetriesExhausted {
        method: String,
        service: String,
        attempts: usize,
        providers: Vec<String>,
        selected: usize,
        total: usize,
        registry: String,
        consumer_ip: String,
        version: &'static str,
        last: Box<TetherError>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Error reported by the remote service itself.
    #[error("Business error: {0}")]
    Business(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("request need @reply")]
    ReplyRequired,

    #[error("Listener terminated: {0}")]
    ListenerTerminated(TerminationReason),

    #[error("Unknown {kind} extension '{name}'")]
    UnknownExtension { kind: &'static str, name: String },

    #[error("Invoker panicked: {0}")]
    Panicked(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::url::ParseError> for TetherError {
    fn from(err: ::url::ParseError) -> Self {
        TetherError::Configuration(err.to_string())
    }
}

impl TetherError {
    /// Builds [`TetherError::NoProvider`] stamped with this consumer's identity.
    pub fn no_provider(
        method: impl Into<String>,
        service_key: impl Into<String>,
        registry: impl Into<String>,
    ) -> Self {
        TetherError::NoProvider {
            method: method.into(),
            service_key: service_key.into(),
            registry: registry.into(),
            consumer_ip: crate::utils::local_ip(),
            version: VERSION,
        }
    }

    pub fn destroyed(service: impl Into<String>) -> Self {
        TetherError::Destroyed {
            service: service.into(),
            consumer_ip: crate::utils::local_ip(),
            version: VERSION,
        }
    }

    /// Whether another provider might succeed where this one failed.
    ///
    /// Transport-level failures are always retryable. Errors raised by the
    /// remote service are retried only when `retry_business` is set.
    pub fn is_retryable(&self, retry_business: bool) -> bool {
        match self {
            TetherError::Transport(_)
            | TetherError::Timeout(_)
            | TetherError::Connection(_)
            | TetherError::ProviderUnavailable(_)
            | TetherError::Io(_) => true,
            TetherError::Business(_) | TetherError::InvalidResponse(_) => retry_business,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TetherError>;
