// src/rabbitmq/mod.rs
// Broker side of the logger: transport binding, connection supervision and publishing

pub mod errors;
pub mod transport;
pub mod connection;
pub mod publisher;
pub mod amqp_client;

// Re-export specific items to simplify imports elsewhere
pub use amqp_client::LapinTransport;
pub use connection::{ConnectPolicy, Supervisor, SupervisorState};
pub use errors::{ConnectError, InitError, LogError, PublishError, Result, TransportError};
pub use publisher::{Publisher, CONTENT_TYPE_JSON};
pub use transport::{CloseEvent, CloseStream, Transport};
