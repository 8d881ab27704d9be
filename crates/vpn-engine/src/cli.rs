//! Service runner for the engine.
//!
//! Loads configuration, sets up logging and metrics, starts the [`Engine`]
//! and keeps it running until SIGTERM/SIGINT. SIGHUP reconciles every
//! backend against the ledger.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vpn_config::{CliOverrides, Config, LoggingConfig, apply_overrides, load_config, validate_config};

use crate::{CancellationToken, Engine};

/// Engine service arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "vpn-engine", version, about = "VPN provisioning and accounting engine")]
pub struct EngineArgs {
    /// Config file path (json/jsonc/yaml/toml)
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

/// Load, override and validate the configuration at `path`.
pub fn resolve_config(
    path: &Path,
    overrides: &CliOverrides,
) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = load_config(path)?;
    apply_overrides(&mut config, overrides);
    validate_config(&config)?;
    Ok(config)
}

/// Run the engine service until a shutdown signal arrives.
pub async fn run(args: EngineArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(&args.config, &args.overrides)?;
    init_tracing(&config.logging);

    if let Some(listen) = &config.metrics.listen {
        match vpn_metrics::init_prometheus(listen) {
            Ok(()) => info!(%listen, "metrics exporter listening"),
            Err(e) => warn!(error = %e, "failed to start metrics exporter"),
        }
    }

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal_handler().await;
        info!("shutdown signal received");
        shutdown_signal.cancel();
    });

    run_with_shutdown(config, shutdown).await
}

/// Start the engine and hold it until `shutdown` is cancelled.
pub async fn run_with_shutdown(
    config: Config,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Arc::new(Engine::start(config).await?);

    #[cfg(unix)]
    {
        let engine = engine.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            reconcile_signal_handler(engine, token).await;
        });
    }

    shutdown.cancelled().await;
    engine.shutdown().await;
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Reconcile all backends on SIGHUP (Unix only).
#[cfg(unix)]
async fn reconcile_signal_handler(engine: Arc<Engine>, shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            warn!(error = %e, "failed to install SIGHUP handler, reconcile on signal disabled");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            received = sighup.recv() => {
                if received.is_none() {
                    return;
                }
            }
        }
        info!("SIGHUP received, reconciling backends");
        match engine.reconcile_all().await {
            Ok(reports) => {
                for r in reports {
                    info!(backend = ?r.backend, applied = r.applied, removed = r.removed, failed = r.failed, "reconciled");
                }
            }
            Err(e) => warn!(error = %e, "reconcile failed"),
        }
    }
}

/// `EnvFilter` directives: the base level followed by per-module filters.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut directives = config.level.as_deref().unwrap_or("info").to_string();
    let mut modules: Vec<_> = config.filters.iter().collect();
    modules.sort();
    for (module, level) in modules {
        directives.push(',');
        directives.push_str(module);
        directives.push('=');
        directives.push_str(level);
    }
    directives
}

/// Initialize the tracing subscriber from the logging configuration.
///
/// - `level`: base level (trace, debug, info, warn, error)
/// - `format`: json, pretty or compact. Default: pretty
/// - `output`: stdout or stderr. Default: stderr
/// - `filters`: per-module overrides, e.g. `sqlx = "warn"`
pub fn init_tracing(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_new(filter_directives(config)).unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = match config.output.as_deref() {
        Some("stdout") => BoxMakeWriter::new(io::stdout),
        _ => BoxMakeWriter::new(io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format.as_deref().unwrap_or("pretty") {
        "json" => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        "compact" => registry
            .with(fmt::layer().compact().with_writer(writer))
            .try_init(),
        _ => registry.with(fmt::layer().with_writer(writer)).try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}
