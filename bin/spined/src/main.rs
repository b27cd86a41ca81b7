//! ---
//! spine_section: "01-core-functionality"
//! spine_subsection: "binary"
//! spine_type: "source"
//! spine_scope: "code"
//! spine_description: "Binary entrypoint for a spine component."
//! spine_version: "v0.1.0"
//! spine_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::thread;

use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use spine_common::logging::init_tracing;
use spine_common::{AckMode, ComponentConfig, LogFormat};
use spine_core::{ComponentRuntime, Context, Envelope, Handler, HandlerResult, StopHandle};
use spine_transport::AmqpBroker;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "configs/spine.toml";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run a spine component bound to its inbox",
    long_about = None
)]
struct Cli {
    #[arg(short, long, env = "SPINE_NAME", help = "Component name; a UUID is generated when omitted")]
    name: Option<String>,

    #[arg(
        short,
        long,
        value_name = "URL",
        env = "SPINE_BROKER_URL",
        help = "AMQP broker URL"
    )]
    broker_url: Option<String>,

    #[arg(short, long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Directory for rolling log files")]
    log_dir: Option<PathBuf>,

    #[arg(long, help = "Log to stdout only")]
    no_log_file: bool,

    #[arg(long, value_enum, help = "Override stdout log format")]
    log_format: Option<CliLogFormat>,

    #[arg(long, value_enum, help = "Override delivery acknowledgement mode")]
    ack_mode: Option<CliAckMode>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogFormat {
    Pretty,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(value: CliLogFormat) -> Self {
        match value {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::Json => LogFormat::StructuredJson,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliAckMode {
    OnReceipt,
    Manual,
}

impl From<CliAckMode> for AckMode {
    fn from(value: CliAckMode) -> Self {
        match value {
            CliAckMode::OnReceipt => AckMode::OnReceipt,
            CliAckMode::Manual => AckMode::Manual,
        }
    }
}

/// Logs everything it receives. With manual acks it acknowledges after logging.
struct LoggingHandler {
    ack_mode: AckMode,
}

impl LoggingHandler {
    fn handle(&self, ctx: &mut Context<'_>, slot: &str, mut envelope: Envelope) -> HandlerResult {
        info!(
            component = ctx.name(),
            slot,
            destinations = ?envelope.destinations(),
            body = %envelope.body(),
            "received"
        );
        if self.ack_mode == AckMode::Manual {
            ctx.ack(&mut envelope)?;
        }
        Ok(())
    }
}

impl Handler for LoggingHandler {
    fn on_start(&mut self, ctx: &mut Context<'_>) -> HandlerResult {
        info!(
            component = ctx.name(),
            inbox = %ctx.identity().inbox_routing_key(),
            "component ready"
        );
        Ok(())
    }

    fn on_message(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        self.handle(ctx, "message", envelope)
    }

    fn on_command(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        self.handle(ctx, "command", envelope)
    }

    fn on_query(&mut self, ctx: &mut Context<'_>, envelope: Envelope) -> HandlerResult {
        self.handle(ctx, "query", envelope)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = ComponentConfig::load_explicit_or(cli.config.as_deref(), &[DEFAULT_CONFIG_PATH])?;
    let mut config = loaded.config;
    apply_overrides(&mut config, &cli);
    config.validate().context("invalid component configuration")?;
    let name = config.ensure_name().to_owned();

    init_tracing(&name, &config.logging)?;
    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), "configuration loaded"),
        None => info!("no configuration file; using defaults"),
    }

    let handler = LoggingHandler {
        ack_mode: config.broker.ack_mode,
    };
    let broker = AmqpBroker::new().with_connection_name(name.clone());
    let mut runtime = ComponentRuntime::from_config(&mut config, broker, handler)
        .context("failed to build component runtime")?;

    spawn_signal_watcher(runtime.stop_handle())?;
    info!(component = %name, "starting component");

    runtime
        .start()
        .with_context(|| format!("component {name} terminated with an error"))?;

    info!(component = %name, "shutdown complete");
    Ok(())
}

fn apply_overrides(config: &mut ComponentConfig, cli: &Cli) {
    if let Some(name) = &cli.name {
        config.name = Some(name.clone());
    }
    if let Some(url) = &cli.broker_url {
        config.broker.url = url.clone();
    }
    if let Some(dir) = &cli.log_dir {
        config.logging.directory = dir.clone();
    }
    if cli.no_log_file {
        config.logging.file = false;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.into();
    }
    if let Some(mode) = cli.ack_mode {
        config.broker.ack_mode = mode.into();
    }
}

/// Raise the stop flag on Ctrl-C or SIGTERM.
///
/// The component loop blocks the main thread, so the signals are awaited on a
/// helper thread with its own single-threaded runtime.
fn spawn_signal_watcher(stop: StopHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    thread::Builder::new()
        .name("spined-signals".into())
        .spawn(move || {
            runtime.block_on(async {
                wait_for_shutdown().await;
            });
            info!("shutdown signal received; stopping component");
            stop.stop();
        })
        .context("failed to spawn signal thread")?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(error = %err, "unable to listen for SIGTERM; only Ctrl-C will stop the component");
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "unable to listen for Ctrl-C");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "unable to listen for Ctrl-C");
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for Ctrl-C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_replace_config_values() {
        let cli = Cli::parse_from([
            "spined",
            "-n",
            "worker-7",
            "-b",
            "amqp://rabbit/components",
            "--log-format",
            "json",
            "--ack-mode",
            "manual",
            "--no-log-file",
        ]);
        let mut config = ComponentConfig::default();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.name.as_deref(), Some("worker-7"));
        assert_eq!(config.broker.url, "amqp://rabbit/components");
        assert_eq!(config.logging.format, LogFormat::StructuredJson);
        assert_eq!(config.broker.ack_mode, AckMode::Manual);
        assert!(!config.logging.file);
        config.validate().expect("overridden config is valid");
    }

    #[test]
    fn cli_without_flags_keeps_defaults() {
        let cli = Cli::parse_from(["spined"]);
        let mut config = ComponentConfig::default();
        apply_overrides(&mut config, &cli);
        assert_eq!(config.broker.ack_mode, AckMode::OnReceipt);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.logging.file);
    }

    #[test]
    fn missing_config_flag_path_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("spine.toml");
        let cli = Cli::parse_from(["spined", "-c", missing.to_str().expect("utf-8 path")]);
        let err = ComponentConfig::load_explicit_or(cli.config.as_deref(), &[DEFAULT_CONFIG_PATH])
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }
}
