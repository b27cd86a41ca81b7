//! ---
//! spine_section: "02-messaging-ipc-data-model"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Envelope model and wire codec."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Envelope model shared by every component on the bus, plus the JSON codec
//! that moves envelopes on and off the wire.

pub mod codec;
pub mod logging;
pub mod types;

/// Shared result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Failures converting between envelopes and wire payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A required wire field is absent.
    #[error("wire payload is missing required field '{0}'")]
    MissingField(&'static str),
    /// The payload is not a JSON object of the expected shape.
    #[error("malformed wire payload: {0}")]
    Malformed(String),
    /// The `type` tag does not name a known envelope kind.
    #[error("unknown envelope kind {0}")]
    UnknownKind(i64),
    /// Wrapper for JSON serialization or deserialization problems.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub use codec::{decode, encode, WIRE_CONTENT_TYPE};
pub use logging::{log_envelope, EnvelopeDirection};
pub use types::{DeliveryTag, Envelope, Kind, QUIT_SENTINEL};
