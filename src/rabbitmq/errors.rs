// src/rabbitmq/errors.rs

use lapin::Error as LapinError;
use serde_json::Error as SerdeError;
use thiserror::Error;
use tokio::time::error::Elapsed;

/// Error reported by a transport binding. Carries the broker client's message
/// as text so it can be cloned into logs and test assertions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError(message.into())
    }
}

impl From<LapinError> for TransportError {
    fn from(error: LapinError) -> Self {
        TransportError(error.to_string())
    }
}

impl From<Elapsed> for TransportError {
    fn from(_: Elapsed) -> Self {
        TransportError("Connection timed out".to_string())
    }
}

impl From<String> for TransportError {
    fn from(message: String) -> Self {
        TransportError(message)
    }
}

impl From<&str> for TransportError {
    fn from(message: &str) -> Self {
        TransportError(message.to_string())
    }
}

/// A single connect attempt failed. Never fatal, only logged by the supervisor.
#[derive(Debug, Clone, Error)]
pub enum ConnectError {
    #[error("failed to set connection to AMQP: {0}")]
    Dial(#[source] TransportError),

    #[error("failed to create AMQP channel: {0}")]
    OpenChannel(#[source] TransportError),

    #[error("failed to declare exchange: {0}")]
    DeclareExchange(#[source] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("publishing message body is empty")]
    EmptyBody,

    #[error("amqp channel is not set")]
    NoChannel,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Configuration rejected by process init. Cached and handed to every caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("service name is required")]
    MissingService,

    #[error("broker credentials are required")]
    MissingCredentials,

    #[error("broker host is required")]
    MissingHost,

    #[error("exchange is required")]
    MissingExchange,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log publisher is not initialized")]
    NotInitialized,

    #[error("Message serialization error: {0}")]
    Serialization(#[from] SerdeError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

// Custom Result type for logging operations
pub type Result<T> = std::result::Result<T, LogError>;
