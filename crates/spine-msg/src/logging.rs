//! ---
//! spine_section: "02-messaging-ipc-data-model"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Envelope model and wire codec."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
use tracing::debug;

use crate::types::Envelope;

/// Direction of the envelope movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeDirection {
    /// Envelope published to the bus.
    Outbound,
    /// Envelope received from the component inbox.
    Inbound,
}

/// Emit a structured log entry for envelope activity.
pub fn log_envelope(direction: EnvelopeDirection, envelope: &Envelope) {
    debug!(
        kind = envelope.kind().as_str(),
        destinations = envelope.destinations().len(),
        delivery = ?envelope.delivery(),
        body = %envelope.body(),
        direction = ?direction,
        "messaging activity"
    );
}
