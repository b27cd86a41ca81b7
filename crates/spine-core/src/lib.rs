//! ---
//! spine_section: "01-core-functionality"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Component runtime and lifecycle management."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
//! Component runtime for the spine bus.
//!
//! A component is a named participant with one inbox queue bound to the shared
//! topic exchange under `components.<name>.inbox`. It receives envelopes,
//! dispatches them by kind to a [`Handler`] and can send envelopes to any
//! number of routing keys.

#![warn(missing_docs)]

pub mod component;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod topology;

pub use component::{ComponentIdentity, ComponentRuntime, Context, Lifecycle, StopHandle};
pub use dispatch::{Handler, HandlerResult, Handlers, NoopHandler, Slot};
pub use error::{Result, RuntimeError};
pub use metrics::RuntimeMetrics;
pub use topology::{inbox_routing_key, Topology};

pub use spine_msg::{Envelope, Kind};
