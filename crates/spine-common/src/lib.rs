//! ---
//! spine_section: "01-core-functionality"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Shared primitives and utilities for spine components."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
//! Shared primitives for the spine workspace.
//! This crate exposes configuration loading and tracing setup consumed by the
//! component runtime and the `spined` binary.

pub mod config;
pub mod logging;

pub use config::{AckMode, BrokerConfig, ComponentConfig, LoadedComponentConfig, LoggingConfig};
pub use logging::{init_tracing, LogFormat};
