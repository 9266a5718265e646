//! Ping Exporter Binary Entry Point
//!
//! Probes the configured targets and serves their latency and loss for
//! Prometheus. Core functionality is provided by the `ping_exporter` library
//! crate.

use clap::Parser;
use ping_exporter::{
    collector::PingCollector,
    config::{AppConfig, ConfigError, PingGroupConfig, parse_duration},
    engine::{EngineError, IcmpMonitor, ProbeEngine},
    refresh::{RefreshScheduler, Resolver, SchedulerError, SystemResolver, TargetGroup},
    server::{AppState, create_router},
};
use prometheus::Registry;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Configuration file used when `--config` is not given, if it exists.
const DEFAULT_CONFIG_PATH: &str = "/etc/ping-exporter/ping-exporter.yaml";

/// Ping Exporter - ICMP latency and loss for Prometheus
#[derive(Parser, Debug)]
#[command(name = "ping-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "PING_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides config file)
    #[arg(long, env = "PING_EXPORTER_LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// Path under which metrics are exposed (overrides config file)
    #[arg(long, env = "PING_EXPORTER_METRICS_PATH")]
    metrics_path: Option<String>,

    /// DNS refresh interval, 0s disables refresh (overrides config file)
    #[arg(long, value_parser = parse_duration)]
    dns_refresh: Option<Duration>,

    /// DNS resolution timeout (overrides config file)
    #[arg(long, value_parser = parse_duration)]
    dns_timeout: Option<Duration>,

    /// Probe interval for targets given on the command line
    #[arg(long, value_parser = parse_duration)]
    ping_interval: Option<Duration>,

    /// Probe timeout for targets given on the command line
    #[arg(long, value_parser = parse_duration)]
    ping_timeout: Option<Duration>,

    /// IPv4 source address for targets given on the command line
    #[arg(long)]
    source_v4: Option<IpAddr>,

    /// IPv6 source address for targets given on the command line
    #[arg(long)]
    source_v6: Option<IpAddr>,

    /// Targets to probe when the config file defines no ping groups
    targets: Vec<String>,
}

/// Startup and runtime failures, each mapped to a process exit code.
#[derive(Debug, Error)]
enum AppError {
    #[error("configuration file does not exist: {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start monitor for {group}: {source}")]
    Monitor {
        group: String,
        #[source]
        source: EngineError,
    },

    #[error("failed to start DNS refresh: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("failed to register collector: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

impl AppError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::ConfigMissing(_) => 4,
            Self::Config(_) => 3,
            Self::Monitor { .. } | Self::Scheduler(_) => 2,
            Self::Metrics(_) | Self::Server(_) => 1,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ping_exporter=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Ping exporter failed");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting ping exporter"
    );

    let config = load_config(&cli)?;
    let addr = config.listen_address()?;

    tracing::info!(
        listen_address = %addr,
        metrics_path = %config.web.metrics_path,
        dns_refresh = ?config.dns.refresh,
        groups = config.ping.len(),
        "Configuration loaded"
    );

    // Start one engine per target group
    let scheduler = RefreshScheduler::new().await?;
    let resolver: Arc<dyn Resolver> = Arc::new(SystemResolver);
    let mut engines: Vec<Arc<dyn ProbeEngine>> = Vec::with_capacity(config.ping.len());

    for (i, group_config) in config.ping.iter().enumerate() {
        let name = format!("group-{i}");
        let monitor = IcmpMonitor::new(group_config.monitor_config()).map_err(|source| {
            AppError::Monitor {
                group: name.clone(),
                source,
            }
        })?;
        let engine: Arc<dyn ProbeEngine> = Arc::new(monitor);

        let group = TargetGroup::new(
            name,
            &group_config.targets,
            group_config.sources(),
            Arc::clone(&engine),
            Arc::clone(&resolver),
        )
        .with_refresh_interval(config.dns.refresh)
        .with_resolve_timeout(config.dns.timeout);

        let report = group.register_initial().await;
        tracing::info!(
            group = %group.name(),
            targets = group.len(),
            addresses = report.added,
            failed = report.failed,
            interval = ?group_config.interval,
            "Monitor started"
        );

        scheduler.spawn(Arc::new(group)).await?;
        engines.push(engine);
    }

    scheduler.start().await?;
    tracing::info!(jobs = scheduler.job_count().await, "DNS refresh scheduled");
    for job in scheduler.list_jobs().await {
        tracing::debug!(
            job_id = %job.id,
            group = %job.group,
            interval = ?job.interval,
            targets = job.targets,
            "Refresh job"
        );
    }

    // Expose the collector through a dedicated registry
    let registry = Registry::new();
    registry.register(Box::new(PingCollector::new(engines)?))?;

    let app = create_router(AppState {
        registry,
        metrics_path: config.web.metrics_path.clone(),
    });

    tracing::info!("Web server listening on: http://{}", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    // Start server with graceful shutdown
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(scheduler))
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load the configuration file and merge command line overrides on top.
fn load_config(cli: &Cli) -> Result<AppConfig, AppError> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                return Err(AppError::ConfigMissing(path.clone()));
            }
            tracing::info!("Loading configuration from: {}", path.display());
            AppConfig::load(path)?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            tracing::info!("Loading configuration from: {}", DEFAULT_CONFIG_PATH);
            AppConfig::load(DEFAULT_CONFIG_PATH)?
        }
        None => AppConfig::default(),
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(listen_address) = &cli.listen_address {
        config.web.listen_address = listen_address.clone();
    }
    if let Some(metrics_path) = &cli.metrics_path {
        config.web.metrics_path = metrics_path.clone();
    }
    if let Some(refresh) = cli.dns_refresh {
        config.dns.refresh = refresh;
    }
    if let Some(timeout) = cli.dns_timeout {
        config.dns.timeout = timeout;
    }

    if config.ping.is_empty() && !cli.targets.is_empty() {
        config.ping.push(flag_group(cli));
    }

    config.validate()?;
    Ok(config)
}

/// Build the single target group described by command line flags.
fn flag_group(cli: &Cli) -> PingGroupConfig {
    let mut group = PingGroupConfig::new(cli.targets.clone());
    if let Some(interval) = cli.ping_interval {
        group = group.with_interval(interval);
    }
    if let Some(timeout) = cli.ping_timeout {
        group = group.with_timeout(timeout);
    }
    if cli.source_v4.is_some() || cli.source_v6.is_some() {
        let (v4, v6) = group.sources();
        group = group.with_sources(cli.source_v4.or(v4), cli.source_v6.or(v6));
    }
    group
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal(scheduler: RefreshScheduler) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    tracing::info!("Shutting down DNS refresh...");
    if let Err(e) = scheduler.shutdown().await {
        tracing::error!("Failed to shutdown refresh scheduler: {}", e);
    }
}
