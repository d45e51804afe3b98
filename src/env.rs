use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenv::dotenv;

use crate::config::{BrokerCredentials, ExchangeSpec, LoggerConfig, DEFAULT_PORT, DEFAULT_VHOST};

impl LoggerConfig {
    /// Reads the logger configuration from the process environment (and a `.env` file if present).
    ///
    /// `LOG_SERVICE` and `AMQP_HOST` select the service and broker; everything else is optional.
    /// Credentials are only configured when `AMQP_HOST` is set, so a missing host surfaces as
    /// [`InitError::MissingCredentials`](crate::InitError::MissingCredentials) at init.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LoggerConfig {
            service: lookup("LOG_SERVICE").unwrap_or_default(),
            project: lookup("LOG_PROJECT"),
            ..LoggerConfig::default()
        };

        if let Some(host) = lookup("AMQP_HOST") {
            config.credentials = Some(BrokerCredentials {
                user: lookup("AMQP_USER").unwrap_or_else(|| "guest".to_string()),
                password: lookup("AMQP_PASSWORD").unwrap_or_else(|| "guest".to_string()),
                host,
                port: parse_or(&lookup, "AMQP_PORT", DEFAULT_PORT)?,
                vhost: lookup("AMQP_VHOST").unwrap_or_else(|| DEFAULT_VHOST.to_string()),
            });
        }

        config.exchange = Some(ExchangeSpec {
            name: lookup("LOG_EXCHANGE").unwrap_or_default(),
            kind: lookup("LOG_EXCHANGE_KIND").unwrap_or_default(),
            durable: parse_or(&lookup, "LOG_EXCHANGE_DURABLE", false)?,
            ..ExchangeSpec::default()
        });

        if let Some(routing_key) = lookup("LOG_ROUTING_KEY") {
            config.publish.routing_key = routing_key;
        }
        config.heartbeat_ms = parse_or(&lookup, "LOG_HEARTBEAT_MS", config.heartbeat_ms)?;
        config.init_timeout_ms = parse_or(&lookup, "LOG_INIT_TIMEOUT_MS", config.init_timeout_ms)?;
        config.connection_timeout_ms =
            parse_or(&lookup, "AMQP_CONNECT_TIMEOUT_MS", config.connection_timeout_ms)?;

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(val) => val.parse().context(format!("Invalid value for {}: {}", key, val)),
        None => Ok(default),
    }
}
