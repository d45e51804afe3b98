//! Structured logging to a RabbitMQ exchange.
//!
//! Log records (`level`, `service`, `text`, optionally `project` and `code`) are serialized to
//! JSON and published fire-and-forget on one shared broker channel. A [`Supervisor`] keeps that
//! channel alive: it connects with a bounded retry loop, watches the connection for a close and
//! reconnects on its own. While no channel is available log calls fail fast with
//! [`PublishError::NoChannel`] and the record is dropped.
//!
//! ```no_run
//! use rabbit_log::{BrokerCredentials, ExchangeSpec, LoggerConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LoggerConfig::new(
//!     "orders",
//!     BrokerCredentials::new("guest", "guest", "localhost", 5672),
//!     ExchangeSpec::named("log-service.logs"),
//! );
//! rabbit_log::init(config).await?;
//! let _ = rabbit_log::info("started").await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod env;
pub mod init;
pub mod message;
pub mod rabbitmq;

use std::future::Future;
use std::sync::{Arc, OnceLock};

pub use client::{install_panic_trace_hook, panic_message, LogClient};
pub use config::{BrokerCredentials, ExchangeSpec, LoggerConfig, PublishOptions};
pub use init::Bootstrap;
pub use message::{LogLevel, LogRecord, CODE_FATAL, CODE_PANIC};
pub use rabbitmq::{
    CloseEvent, ConnectError, ConnectPolicy, InitError, LapinTransport, LogError, PublishError,
    Publisher, Supervisor, SupervisorState, Transport, TransportError,
};

static LOGGER: OnceLock<Bootstrap<LapinTransport>> = OnceLock::new();

fn bootstrap() -> &'static Bootstrap<LapinTransport> {
    LOGGER.get_or_init(Bootstrap::new)
}

/// Initializes the process-wide logger. Only the first call does any work; every call returns
/// the outcome of that first one.
pub async fn init(config: LoggerConfig) -> Result<(), InitError> {
    let transport = LapinTransport::new(config.connection_timeout());
    bootstrap().init(transport, config).await.map(|_| ())
}

/// The process-wide client, once [`init`] has succeeded.
pub fn client() -> Option<Arc<LogClient<LapinTransport>>> {
    bootstrap().client()
}

fn require_client() -> rabbitmq::Result<Arc<LogClient<LapinTransport>>> {
    client().ok_or(LogError::NotInitialized)
}

pub async fn info(text: impl Into<String>) -> rabbitmq::Result<()> {
    require_client()?.info(text).await
}

pub async fn error(text: impl Into<String>) -> rabbitmq::Result<()> {
    require_client()?.error(text).await
}

pub async fn fatal(text: impl Into<String>) -> rabbitmq::Result<()> {
    require_client()?.fatal(text).await
}

/// Runs `future` behind a panic boundary, reporting a panic through the process-wide logger.
/// Returns `None` if the future panicked.
pub async fn guarded<F: Future>(future: F) -> Option<F::Output> {
    match client() {
        Some(client) => client.guarded(future).await,
        None => {
            use futures::FutureExt;
            match std::panic::AssertUnwindSafe(future).catch_unwind().await {
                Ok(output) => Some(output),
                Err(payload) => {
                    tracing::error!(
                        "panic before log publisher init: {}",
                        panic_message(payload.as_ref())
                    );
                    None
                }
            }
        }
    }
}
