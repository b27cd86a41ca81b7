//! ---
//! spine_section: "02-messaging-ipc-data-model"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Transport implementations for messaging layers."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
//! Broker sessions for the spine bus.
//!
//! A [`Broker`] opens one [`Session`] (connection plus channel) per component.
//! Sessions are synchronous: the component loop owns its session on a single
//! thread and waits for deliveries with a bounded [`Session::poll`].

#![warn(missing_docs)]

use std::fmt;
use std::time::Duration;

use spine_msg::DeliveryTag;

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod in_memory;
pub mod topic;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpBroker, AmqpSession};
pub use in_memory::{InMemoryBroker, InMemorySession};
pub use topic::topic_matches;

/// Shared result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures surfaced by broker sessions.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The broker could not be reached or refused the connection.
    #[error("unable to connect to broker: {0}")]
    Connect(String),
    /// An entity already exists with incompatible parameters.
    #[error("broker precondition failed: {0}")]
    PreconditionFailed(String),
    /// A referenced exchange or queue does not exist.
    #[error("broker entity not found: {0}")]
    NotFound(String),
    /// The connection or consumer went away while in use.
    #[error("broker connection lost: {0}")]
    ConnectionLost(String),
    /// Any other protocol-level failure.
    #[error("broker protocol error: {0}")]
    Protocol(String),
    /// The local IO runtime backing a session could not be created.
    #[error("transport runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Exchange routing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Routing-key pattern matching with `*` and `#` wildcards.
    Topic,
    /// Exact routing-key match.
    Direct,
    /// Every bound queue receives every message.
    Fanout,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExchangeKind::Topic => "topic",
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
        })
    }
}

/// Parameters of an exchange declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    /// Exchange name.
    pub name: String,
    /// Routing mode.
    pub kind: ExchangeKind,
    /// Survives broker restarts.
    pub durable: bool,
}

impl ExchangeSpec {
    /// Durable topic exchange.
    pub fn durable_topic(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Topic,
            durable: true,
        }
    }
}

/// Parameters of a queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    /// Queue name.
    pub name: String,
    /// Survives broker restarts.
    pub durable: bool,
    /// Restricted to the declaring connection.
    pub exclusive: bool,
    /// Deleted once the last consumer leaves.
    pub auto_delete: bool,
}

impl QueueSpec {
    /// Durable, shared, persistent queue.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }
}

/// Binding of a queue to an exchange under a routing-key pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Bound queue.
    pub queue: String,
    /// Source exchange.
    pub exchange: String,
    /// Routing key (or pattern, for topic exchanges).
    pub routing_key: String,
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle used to acknowledge this delivery.
    pub tag: DeliveryTag,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Raw wire payload.
    pub payload: Vec<u8>,
}

/// Outcome of one bounded wait for a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll {
    /// A delivery arrived within the wait window.
    Delivery(Delivery),
    /// Nothing arrived; the caller should re-check its own state and poll again.
    Idle,
}

/// Opens sessions against a broker.
pub trait Broker {
    /// Session type produced by this broker.
    type Session: Session + 'static;

    /// Open a connection and channel at `url`.
    fn connect(&self, url: &str) -> Result<Self::Session>;
}

/// A connection plus channel owned by a single component thread.
pub trait Session {
    /// Declare an exchange; a no-op when an identical one already exists.
    fn declare_exchange(&mut self, exchange: &ExchangeSpec) -> Result<()>;
    /// Declare a queue; a no-op when an identical one already exists.
    fn declare_queue(&mut self, queue: &QueueSpec) -> Result<()>;
    /// Bind a queue to an exchange.
    fn bind_queue(&mut self, binding: &Binding) -> Result<()>;
    /// Start consuming from `queue`; deliveries are then returned by [`Session::poll`].
    fn consume(&mut self, queue: &str, consumer_tag: &str) -> Result<()>;
    /// Publish a payload without waiting for a broker confirmation.
    fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()>;
    /// Wait up to `timeout` for the next delivery.
    fn poll(&mut self, timeout: Duration) -> Result<Poll>;
    /// Acknowledge a delivery received on this session.
    fn ack(&mut self, tag: DeliveryTag) -> Result<()>;
    /// Release the channel and connection. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
}
