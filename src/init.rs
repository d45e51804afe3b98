use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::client::LogClient;
use crate::config::LoggerConfig;
use crate::rabbitmq::connection::{ConnectPolicy, Supervisor};
use crate::rabbitmq::errors::InitError;
use crate::rabbitmq::publisher::Publisher;
use crate::rabbitmq::transport::Transport;

type InitResult<T> = Result<Arc<LogClient<T>>, InitError>;

/// One-shot latch around logger initialization.
///
/// The first call to [`Bootstrap::init`] validates the configuration, builds the client and
/// runs the first bounded connect. Concurrent callers wait for it; every caller, now or later,
/// gets a clone of that first result.
pub struct Bootstrap<T: Transport> {
    cell: OnceCell<InitResult<T>>,
}

impl<T: Transport> Default for Bootstrap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> Bootstrap<T> {
    pub fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    pub async fn init(&self, transport: T, config: LoggerConfig) -> InitResult<T> {
        self.cell
            .get_or_init(|| bootstrap(transport, config))
            .await
            .clone()
    }

    /// The client, if initialization has completed successfully.
    pub fn client(&self) -> Option<Arc<LogClient<T>>> {
        match self.cell.get() {
            Some(Ok(client)) => Some(Arc::clone(client)),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

async fn bootstrap<T: Transport>(transport: T, config: LoggerConfig) -> InitResult<T> {
    let config = config.resolve().inspect_err(|e| {
        warn!("log publisher init rejected: {}", e);
    })?;

    let policy = ConnectPolicy::new(
        config.credentials,
        config.exchange,
        config.heartbeat,
        config.init_timeout,
    );
    let supervisor = Supervisor::new(transport, policy);
    let publisher = Publisher::new(supervisor.clone(), config.publish);
    let client = LogClient::new(publisher, &config.service, config.project.as_deref());

    supervisor.start().await;
    info!(
        service = %config.service,
        connected = supervisor.is_connected(),
        "log publisher initialized"
    );

    Ok(Arc::new(client))
}
