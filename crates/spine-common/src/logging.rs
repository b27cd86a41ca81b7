//! ---
//! spine_section: "01-core-functionality"
//! spine_subsection: "module"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Shared primitives and utilities for spine components."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
use anyhow::{Context as _, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "SPINE_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available stdout log formats.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    StructuredJson,
    #[default]
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured-json" | "json" => Ok(LogFormat::StructuredJson),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Resolve the filter directive: `SPINE_LOG` first, then `RUST_LOG`, then `info`.
fn env_filter() -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to {} logging",
                LOG_ENV, err, DEFAULT_DIRECTIVE
            );
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        Err(_) => {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        }
    }
}

/// Default file name stem when no prefix is configured.
const DEFAULT_FILE_PREFIX: &str = "spine";

/// File name of the rolling log for one component, before the date suffix.
pub fn log_file_name(prefix: Option<&str>, component: &str) -> String {
    format!("{}-{}.log", prefix.unwrap_or(DEFAULT_FILE_PREFIX), component)
}

fn stdout_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = STDOUT_GUARD.set(guard);

    let layer = fmt::layer().with_timer(fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().with_writer(writer).boxed(),
        LogFormat::Pretty => layer.with_target(true).with_writer(writer).boxed(),
    }
}

fn file_layer<S>(component: &str, config: &LoggingConfig) -> Result<Box<dyn Layer<S> + Send + Sync>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("failed to create log directory {}", config.directory.display())
    })?;
    let appender = daily(
        &config.directory,
        log_file_name(config.file_prefix.as_deref(), component),
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);

    Ok(fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_current_span(false)
        .with_writer(writer)
        .boxed())
}

/// Install the process-wide subscriber for one component.
///
/// Stdout always gets the configured format. With `config.file` set, a daily
/// rolling JSON file named by [`log_file_name`] is written under
/// `config.directory`. Only the first call installs anything; later calls
/// return `Ok(false)`.
pub fn init_tracing(component: &str, config: &LoggingConfig) -> Result<bool> {
    let file = if config.file {
        Some(file_layer(component, config)?)
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer(config.format))
        .with(file)
        .try_init()
        .is_ok();

    if installed {
        info!(
            component,
            format = ?config.format,
            log_dir = ?config.file.then(|| config.directory.clone()),
            "tracing initialised"
        );
    }
    Ok(installed)
}
