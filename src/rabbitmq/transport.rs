// src/rabbitmq/transport.rs

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::config::{BrokerCredentials, ExchangeSpec, PublishOptions};
use crate::rabbitmq::errors::TransportError;

/// Why a connection's close subscription fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseEvent {
    /// The broker or the network reported an error on the connection.
    Error(String),
    /// The connection was closed without an error (e.g. during shutdown).
    Closed,
}

/// Close notifications for one specific connection.
pub type CloseStream = BoxStream<'static, CloseEvent>;

/// The broker operations the supervisor and publisher rely on.
///
/// Implementations must be cheap to share; the supervisor keeps one instance for the
/// lifetime of the process and calls it from background tasks.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;
    type Channel: Clone + Send + Sync + 'static;

    async fn dial(&self, credentials: &BrokerCredentials) -> Result<Self::Connection, TransportError>;

    async fn open_channel(&self, connection: &Self::Connection) -> Result<Self::Channel, TransportError>;

    async fn declare_exchange(
        &self,
        channel: &Self::Channel,
        exchange: &ExchangeSpec,
    ) -> Result<(), TransportError>;

    async fn publish(
        &self,
        channel: &Self::Channel,
        exchange: &str,
        options: &PublishOptions,
        content_type: &str,
        body: &[u8],
    ) -> Result<(), TransportError>;

    /// Subscribes to close events of `connection` and of the log `channel` opened on it. A
    /// channel-level failure (e.g. a broker channel exception) is reported like a connection
    /// failure. The stream ending counts as a close too.
    fn notify_close(&self, connection: &Self::Connection, channel: &Self::Channel) -> CloseStream;

    /// Best-effort shutdown; errors are swallowed.
    async fn close(&self, connection: Self::Connection, channel: Option<Self::Channel>);
}
