//! ---
//! spine_section: "01-core-functionality"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Component runtime and lifecycle management."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
//! Exchange and inbox declaration performed once per component start.

use spine_transport::{Binding, ExchangeSpec, QueueSpec, Session};
use tracing::info;

use crate::error::Result;

/// First word of every inbox routing key.
pub const ROUTING_PREFIX: &str = "components";
/// Last word of every inbox routing key.
pub const INBOX_SUFFIX: &str = "inbox";

/// Routing key addressing the inbox of the component called `name`.
pub fn inbox_routing_key(name: &str) -> String {
    [ROUTING_PREFIX, name, INBOX_SUFFIX].join(".")
}

/// Broker entities a component needs before it can consume.
///
/// The queue is named after the routing key, so every component owns a
/// distinct queue even though they share the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Durable topic exchange shared by all components.
    pub exchange: ExchangeSpec,
    /// The component's durable inbox queue.
    pub queue: QueueSpec,
    /// Inbox queue bound to the exchange under its own name.
    pub binding: Binding,
}

impl Topology {
    /// Entities for the component called `name` on `exchange`.
    pub fn for_component(name: &str, exchange: &str) -> Self {
        let routing_key = inbox_routing_key(name);
        Self {
            exchange: ExchangeSpec::durable_topic(exchange),
            queue: QueueSpec::durable(routing_key.clone()),
            binding: Binding {
                queue: routing_key.clone(),
                exchange: exchange.to_owned(),
                routing_key,
            },
        }
    }

    /// Declare exchange, queue and binding. Idempotent for compatible
    /// existing entities; incompatible ones fail with
    /// [`spine_transport::TransportError::PreconditionFailed`].
    pub fn declare(&self, session: &mut dyn Session) -> Result<()> {
        session.declare_exchange(&self.exchange)?;
        info!(exchange = %self.exchange.name, kind = %self.exchange.kind, "declared exchange");

        session.declare_queue(&self.queue)?;
        session.bind_queue(&self.binding)?;
        info!(queue = %self.queue.name, routing_key = %self.binding.routing_key, "declared queue");
        Ok(())
    }
}
