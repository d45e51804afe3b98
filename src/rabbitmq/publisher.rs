use tracing::trace;

use super::connection::Supervisor;
use super::errors::PublishError;
use super::transport::Transport;
use crate::config::PublishOptions;

pub const CONTENT_TYPE_JSON: &str = "text/json";

/// Sends raw bodies to the log exchange over the supervisor's current channel.
///
/// Publishing never waits for a reconnect: while the supervisor has no channel the call fails
/// with [`PublishError::NoChannel`] and the message is dropped.
pub struct Publisher<T: Transport> {
    supervisor: Supervisor<T>,
    exchange: String,
    options: PublishOptions,
}

impl<T: Transport> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            supervisor: self.supervisor.clone(),
            exchange: self.exchange.clone(),
            options: self.options.clone(),
        }
    }
}

impl<T: Transport> Publisher<T> {
    pub fn new(supervisor: Supervisor<T>, options: PublishOptions) -> Self {
        let exchange = supervisor.policy().exchange.name.clone();
        Self { supervisor, exchange, options }
    }

    pub async fn publish(&self, body: &[u8]) -> Result<(), PublishError> {
        if body.is_empty() {
            return Err(PublishError::EmptyBody);
        }
        let channel = self.supervisor.current_channel().ok_or(PublishError::NoChannel)?;

        trace!(
            exchange = %self.exchange,
            routing_key = %self.options.routing_key,
            bytes = body.len(),
            "Publishing log message"
        );
        self.supervisor
            .transport()
            .publish(&channel, &self.exchange, &self.options, CONTENT_TYPE_JSON, body)
            .await?;
        Ok(())
    }

    pub fn supervisor(&self) -> &Supervisor<T> {
        &self.supervisor
    }

    pub fn options(&self) -> &PublishOptions {
        &self.options
    }
}
