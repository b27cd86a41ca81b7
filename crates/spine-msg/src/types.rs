//! ---
//! spine_section: "02-messaging-ipc-data-model"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Envelope model and wire codec."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
use std::fmt;

use serde_json::Value as JsonValue;

use crate::CodecError;

/// Command body that asks a component to shut down.
pub const QUIT_SENTINEL: &str = "quit";

/// Classification of an envelope; selects the handler slot on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Kind {
    /// Fire-and-forget notification.
    #[default]
    Message,
    /// Instruction addressed to a component.
    Command,
    /// Request for information.
    Query,
}

impl Kind {
    /// Every kind, in wire-tag order.
    pub const ALL: [Kind; 3] = [Kind::Message, Kind::Command, Kind::Query];

    /// Integer tag written to the `type` wire field.
    pub const fn tag(self) -> u8 {
        match self {
            Kind::Message => 1,
            Kind::Command => 2,
            Kind::Query => 3,
        }
    }

    /// Lower-case label used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Kind::Message => "message",
            Kind::Command => "command",
            Kind::Query => "query",
        }
    }
}

impl TryFrom<i64> for Kind {
    type Error = CodecError;

    fn try_from(tag: i64) -> Result<Self, Self::Error> {
        match tag {
            1 => Ok(Kind::Message),
            2 => Ok(Kind::Command),
            3 => Ok(Kind::Query),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-assigned identifier of a delivery, used only to acknowledge it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// In-process representation of a bus message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    kind: Kind,
    destinations: Vec<String>,
    body: JsonValue,
    delivery: Option<DeliveryTag>,
}

impl Envelope {
    fn with_kind(kind: Kind, body: JsonValue) -> Self {
        Self {
            kind,
            destinations: Vec::new(),
            body,
            delivery: None,
        }
    }

    /// Construct a fire-and-forget message.
    pub fn message(body: impl Into<JsonValue>) -> Self {
        Self::with_kind(Kind::Message, body.into())
    }

    /// Construct a command.
    pub fn command(body: impl Into<JsonValue>) -> Self {
        Self::with_kind(Kind::Command, body.into())
    }

    /// Construct a query.
    pub fn query(body: impl Into<JsonValue>) -> Self {
        Self::with_kind(Kind::Query, body.into())
    }

    /// Construct the command that stops the receiving component.
    pub fn quit() -> Self {
        Self::command(QUIT_SENTINEL)
    }

    /// Rebuild an envelope from decoded wire fields.
    pub(crate) fn from_parts(
        kind: Kind,
        destinations: Vec<String>,
        body: JsonValue,
        delivery: Option<DeliveryTag>,
    ) -> Self {
        Self {
            kind,
            destinations,
            body,
            delivery,
        }
    }

    /// Append one routing key to the destination list.
    pub fn with_destination(mut self, routing_key: impl Into<String>) -> Self {
        self.destinations.push(routing_key.into());
        self
    }

    /// Append several routing keys to the destination list.
    pub fn with_destinations<I, S>(mut self, routing_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.destinations
            .extend(routing_keys.into_iter().map(Into::into));
        self
    }

    /// Envelope kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Routing keys this envelope is sent to.
    pub fn destinations(&self) -> &[String] {
        &self.destinations
    }

    /// Opaque payload.
    pub fn body(&self) -> &JsonValue {
        &self.body
    }

    /// Consume the envelope, returning its payload.
    pub fn into_body(self) -> JsonValue {
        self.body
    }

    /// Pending delivery handle, if this envelope came off the bus and is not acknowledged yet.
    pub fn delivery(&self) -> Option<DeliveryTag> {
        self.delivery
    }

    /// Detach the delivery handle so it can be acknowledged exactly once.
    pub fn take_delivery(&mut self) -> Option<DeliveryTag> {
        self.delivery.take()
    }

    /// True for a command whose body is the quit sentinel.
    pub fn is_quit(&self) -> bool {
        self.kind == Kind::Command && self.body.as_str() == Some(QUIT_SENTINEL)
    }
}
