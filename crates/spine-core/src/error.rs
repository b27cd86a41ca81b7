//! ---
//! spine_section: "01-core-functionality"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Component runtime and lifecycle management."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
use spine_msg::CodecError;
use spine_transport::TransportError;

use crate::component::Lifecycle;
use crate::dispatch::Slot;

/// Shared result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by the component runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The operation is not valid in the current lifecycle state.
    #[error("cannot {operation} while component is {state}")]
    InvalidState {
        /// What was attempted, e.g. `"start"`.
        operation: &'static str,
        /// State the runtime was in at the time.
        state: Lifecycle,
    },
    /// Name or broker URL cannot be used to build the topology.
    #[error("invalid component identity: {0}")]
    InvalidIdentity(String),
    /// Configuration failed validation before the runtime was built.
    #[error("invalid component configuration: {0}")]
    Config(#[source] anyhow::Error),
    /// Connecting, declaring, consuming, publishing or acking failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// An outbound envelope could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A user handler returned an error; logged and absorbed by the loop.
    #[error("{slot} handler failed: {source}")]
    Handler {
        /// Slot whose handler failed.
        slot: Slot,
        /// Error returned by the handler.
        #[source]
        source: anyhow::Error,
    },
    /// The `on_start` hook failed; the component does not enter its loop.
    #[error("startup hook failed: {0}")]
    Startup(#[source] anyhow::Error),
}
