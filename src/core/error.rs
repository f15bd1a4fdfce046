//! Gateway error taxonomy.
//!
//! Every fallible operation in the crate resolves to one of these
//! variants. `Validation` and `Configuration` are surfaced to callers
//! before any side effect; `Auth`, `Network`, and `Provider` failures
//! raised during a send are absorbed at the gateway boundary and turned
//! into a normalized error message on the conversation.

use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed or missing required input; nothing was attempted.
    Validation(String),
    /// No usable credential for the resolved provider.
    Auth(String),
    /// No provider capable of the requested capability is selectable.
    Configuration(String),
    /// Transport failure or timeout before a response was received.
    Network(String),
    /// The provider was reachable but answered with a non-success status.
    Provider { status: u16, message: String },
    /// The persistence collaborator rejected a read or write.
    Storage(String),
    /// A uniqueness constraint was violated.
    Conflict(String),
}

impl GatewayError {
    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        GatewayError::Auth(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        GatewayError::Configuration(message.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        GatewayError::Network(message.into())
    }

    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Provider {
            status,
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        GatewayError::Storage(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        GatewayError::Conflict(message.into())
    }

    /// True for the failure classes a send converts into a normalized
    /// error message instead of propagating.
    pub fn is_send_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Auth(_) | GatewayError::Network(_) | GatewayError::Provider { .. }
        )
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Validation(message) => write!(f, "validation error: {message}"),
            GatewayError::Auth(message) => write!(f, "authentication error: {message}"),
            GatewayError::Configuration(message) => write!(f, "configuration error: {message}"),
            GatewayError::Network(message) => write!(f, "network error: {message}"),
            GatewayError::Provider { status, message } => {
                write!(f, "provider error (status {status}): {message}")
            }
            GatewayError::Storage(message) => write!(f, "storage error: {message}"),
            GatewayError::Conflict(message) => write!(f, "conflict: {message}"),
        }
    }
}

impl Error for GatewayError {}
