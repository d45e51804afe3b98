// src/rabbitmq/amqp_client.rs

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions};
use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{
    BrokerCredentials, ExchangeSpec, PublishOptions, KIND_DIRECT, KIND_FANOUT, KIND_HEADERS,
    KIND_TOPIC,
};
use crate::rabbitmq::errors::TransportError;
use crate::rabbitmq::transport::{CloseEvent, CloseStream, Transport};

const REPLY_SUCCESS: u16 = 200;

/// [`Transport`] backed by a real RabbitMQ broker through `lapin`.
#[derive(Debug, Clone)]
pub struct LapinTransport {
    connect_timeout: Duration,
    connection_name: String,
}

impl LapinTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            connection_name: format!("rabbit_log-{}", &Uuid::new_v4().to_string()[..8]),
        }
    }

    fn connection_properties(&self) -> ConnectionProperties {
        ConnectionProperties::default()
            .with_connection_name(LongString::from(self.connection_name.clone()))
    }
}

#[async_trait]
impl Transport for LapinTransport {
    type Connection = Connection;
    type Channel = Channel;

    async fn dial(&self, credentials: &BrokerCredentials) -> Result<Connection, TransportError> {
        debug!(
            host = %credentials.host,
            port = credentials.port,
            connection = %self.connection_name,
            "Dialing RabbitMQ"
        );
        let connection = timeout(
            self.connect_timeout,
            Connection::connect(&credentials.uri(), self.connection_properties()),
        )
        .await??;
        Ok(connection)
    }

    async fn open_channel(&self, connection: &Connection) -> Result<Channel, TransportError> {
        Ok(connection.create_channel().await?)
    }

    async fn declare_exchange(
        &self,
        channel: &Channel,
        exchange: &ExchangeSpec,
    ) -> Result<(), TransportError> {
        channel
            .exchange_declare(
                &exchange.name,
                exchange_kind(&exchange.kind),
                ExchangeDeclareOptions {
                    passive: false,
                    durable: exchange.durable,
                    auto_delete: exchange.auto_delete,
                    internal: exchange.internal,
                    nowait: exchange.no_wait,
                },
                field_table(exchange.args.iter()),
            )
            .await?;
        Ok(())
    }

    async fn publish(
        &self,
        channel: &Channel,
        exchange: &str,
        options: &PublishOptions,
        content_type: &str,
        body: &[u8],
    ) -> Result<(), TransportError> {
        let properties = BasicProperties::default()
            .with_message_id(Uuid::new_v4().to_string().into())
            .with_content_type(content_type.into())
            .with_timestamp(chrono::Utc::now().timestamp() as u64);

        // Confirms are not awaited: delivery is best effort.
        channel
            .basic_publish(
                exchange,
                &options.routing_key,
                BasicPublishOptions {
                    mandatory: options.mandatory,
                    immediate: options.immediate,
                },
                body,
                properties,
            )
            .await?;
        Ok(())
    }

    fn notify_close(&self, connection: &Connection, channel: &Channel) -> CloseStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel_tx = tx.clone();
        connection.on_error(move |err| {
            let _ = tx.send(CloseEvent::Error(err.to_string()));
        });
        channel.on_error(move |err| {
            let _ = channel_tx.send(CloseEvent::Error(format!("channel: {}", err)));
        });

        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }

    async fn close(&self, connection: Connection, channel: Option<Channel>) {
        if let Some(channel) = channel {
            if let Err(e) = channel.close(REPLY_SUCCESS, "Closing log channel").await {
                debug!("Ignoring channel close error: {}", e);
            }
        }
        if let Err(e) = connection.close(REPLY_SUCCESS, "Closing log connection").await {
            debug!("Ignoring connection close error: {}", e);
        }
    }
}

fn exchange_kind(kind: &str) -> ExchangeKind {
    match kind {
        KIND_DIRECT => ExchangeKind::Direct,
        KIND_FANOUT => ExchangeKind::Fanout,
        KIND_HEADERS => ExchangeKind::Headers,
        KIND_TOPIC => ExchangeKind::Topic,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

fn field_table<'a>(args: impl Iterator<Item = (&'a String, &'a Value)>) -> FieldTable {
    let mut table = FieldTable::default();
    for (key, value) in args {
        table.insert(ShortString::from(key.clone()), amqp_value(value));
    }
    table
}

fn amqp_value(value: &Value) -> AMQPValue {
    match value {
        Value::Null => AMQPValue::Void,
        Value::Bool(b) => AMQPValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AMQPValue::LongLongInt(i)
            } else if let Some(f) = n.as_f64() {
                AMQPValue::Double(f)
            } else {
                warn!("Exchange argument {} does not fit an AMQP number, sending as text", n);
                AMQPValue::LongString(LongString::from(n.to_string()))
            }
        }
        Value::String(s) => AMQPValue::LongString(LongString::from(s.clone())),
        Value::Array(items) => {
            let mut array = FieldArray::default();
            for item in items {
                array.push(amqp_value(item));
            }
            AMQPValue::FieldArray(array)
        }
        Value::Object(map) => AMQPValue::FieldTable(field_table(map.iter())),
    }
}
