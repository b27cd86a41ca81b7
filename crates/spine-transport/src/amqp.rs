//! ---
//! spine_section: "02-messaging-ipc-data-model"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Transport implementations for messaging layers."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
//! AMQP 0-9-1 sessions backed by `lapin`.
//!
//! Each session owns a current-thread Tokio runtime and blocks on it for every
//! broker operation, so the component loop stays a plain synchronous loop.

use std::time::Duration;

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use spine_msg::{DeliveryTag, WIRE_CONTENT_TYPE};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::{
    Binding, Broker, Delivery, ExchangeKind, ExchangeSpec, Poll, QueueSpec, Result, Session,
    TransportError,
};

const CLOSE_REPLY_CODE: u16 = 200;

/// Broker reached over AMQP.
#[derive(Debug, Clone, Default)]
pub struct AmqpBroker {
    connection_name: Option<String>,
}

impl AmqpBroker {
    /// Broker handle with default connection properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Name reported to the broker's management view for connections opened by this handle.
    pub fn with_connection_name(mut self, name: impl Into<String>) -> Self {
        self.connection_name = Some(name.into());
        self
    }
}

impl Broker for AmqpBroker {
    type Session = AmqpSession;

    fn connect(&self, url: &str) -> Result<AmqpSession> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let mut properties = ConnectionProperties::default();
        if let Some(name) = &self.connection_name {
            properties = properties.with_connection_name(name.clone().into());
        }

        let (connection, channel) = runtime.block_on(async {
            let connection = Connection::connect(url, properties)
                .await
                .map_err(|err| TransportError::Connect(err.to_string()))?;
            let channel = connection.create_channel().await.map_err(classify)?;
            Ok::<_, TransportError>((connection, channel))
        })?;

        info!(channel_id = channel.id(), "amqp session opened");
        Ok(AmqpSession {
            runtime,
            connection,
            channel,
            consumer: None,
            closed: false,
        })
    }
}

/// Connection and channel to an AMQP broker.
pub struct AmqpSession {
    runtime: Runtime,
    connection: Connection,
    channel: Channel,
    consumer: Option<Consumer>,
    closed: bool,
}

impl std::fmt::Debug for AmqpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpSession")
            .field("channel_id", &self.channel.id())
            .field("consuming", &self.consumer.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

fn exchange_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

/// Map a lapin error onto the transport taxonomy.
fn classify(err: lapin::Error) -> TransportError {
    match &err {
        lapin::Error::ProtocolError(amqp) => match amqp.kind() {
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED) => {
                TransportError::PreconditionFailed(err.to_string())
            }
            AMQPErrorKind::Soft(AMQPSoftError::NOTFOUND) => {
                TransportError::NotFound(err.to_string())
            }
            _ => TransportError::Protocol(err.to_string()),
        },
        lapin::Error::IOError(_)
        | lapin::Error::InvalidChannelState(_)
        | lapin::Error::InvalidConnectionState(_) => TransportError::ConnectionLost(err.to_string()),
        _ => TransportError::Protocol(err.to_string()),
    }
}

impl Session for AmqpSession {
    fn declare_exchange(&mut self, exchange: &ExchangeSpec) -> Result<()> {
        let options = ExchangeDeclareOptions {
            durable: exchange.durable,
            ..ExchangeDeclareOptions::default()
        };
        self.runtime
            .block_on(self.channel.exchange_declare(
                &exchange.name,
                exchange_kind(exchange.kind),
                options,
                FieldTable::default(),
            ))
            .map_err(classify)
    }

    fn declare_queue(&mut self, queue: &QueueSpec) -> Result<()> {
        let options = QueueDeclareOptions {
            durable: queue.durable,
            exclusive: queue.exclusive,
            auto_delete: queue.auto_delete,
            ..QueueDeclareOptions::default()
        };
        let declared = self
            .runtime
            .block_on(
                self.channel
                    .queue_declare(&queue.name, options, FieldTable::default()),
            )
            .map_err(classify)?;
        debug!(
            queue = %queue.name,
            messages = declared.message_count(),
            consumers = declared.consumer_count(),
            "amqp queue declared"
        );
        Ok(())
    }

    fn bind_queue(&mut self, binding: &Binding) -> Result<()> {
        self.runtime
            .block_on(self.channel.queue_bind(
                &binding.queue,
                &binding.exchange,
                &binding.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            ))
            .map_err(classify)
    }

    fn consume(&mut self, queue: &str, consumer_tag: &str) -> Result<()> {
        let consumer = self
            .runtime
            .block_on(self.channel.basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            ))
            .map_err(classify)?;
        self.consumer = Some(consumer);
        Ok(())
    }

    fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        let properties = BasicProperties::default().with_content_type(WIRE_CONTENT_TYPE.into());
        // the returned confirmation is dropped: publishes are fire-and-forget
        let _confirm = self
            .runtime
            .block_on(self.channel.basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            ))
            .map_err(classify)?;
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<Poll> {
        let consumer = self
            .consumer
            .as_mut()
            .ok_or_else(|| TransportError::Protocol("poll called before consume".into()))?;
        match self
            .runtime
            .block_on(tokio::time::timeout(timeout, consumer.next()))
        {
            Err(_elapsed) => Ok(Poll::Idle),
            Ok(None) => Err(TransportError::ConnectionLost(
                "consumer stream closed by broker".into(),
            )),
            Ok(Some(Err(err))) => Err(classify(err)),
            Ok(Some(Ok(delivery))) => Ok(Poll::Delivery(Delivery {
                tag: DeliveryTag(delivery.delivery_tag),
                routing_key: delivery.routing_key.as_str().to_owned(),
                payload: delivery.data,
            })),
        }
    }

    fn ack(&mut self, tag: DeliveryTag) -> Result<()> {
        self.runtime
            .block_on(self.channel.basic_ack(tag.0, BasicAckOptions::default()))
            .map_err(classify)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.consumer = None;
        self.runtime
            .block_on(
                self.connection
                    .close(CLOSE_REPLY_CODE, "component stopped"),
            )
            .map_err(classify)?;
        info!("amqp session closed");
        Ok(())
    }
}

impl Drop for AmqpSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close amqp session on drop");
        }
    }
}
