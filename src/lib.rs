//! Ping Exporter - ICMP latency and loss for Prometheus
//!
//! This crate provides the core functionality of the ping exporter. It can be
//! used as a library by other Rust projects, or run as a standalone binary
//! with the `ping-exporter` executable.
//!
//! # Architecture
//!
//! - **Engine**: probes every registered address and keeps per-target statistics
//! - **Refresh**: re-resolves configured hostnames and reconciles engine targets
//! - **Collector**: drains the engines on scrape and renders the `ping_*` metrics
//! - **Config**: YAML configuration with command line overrides
//! - **Server**: HTTP exposition endpoint
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ping_exporter::collector::PingCollector;
//! use ping_exporter::engine::{IcmpMonitor, MonitorConfig, ProbeEngine};
//! use ping_exporter::refresh::{SystemResolver, TargetGroup};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = Some("0.0.0.0".parse()?);
//!     let config = MonitorConfig::default().with_source_v4(source);
//!     let engine: Arc<dyn ProbeEngine> = Arc::new(IcmpMonitor::new(config)?);
//!     let group = TargetGroup::new(
//!         "default",
//!         &["example.com".to_string()],
//!         (source, None),
//!         Arc::clone(&engine),
//!         Arc::new(SystemResolver),
//!     );
//!     group.register_initial().await;
//!
//!     let registry = prometheus::Registry::new();
//!     registry.register(Box::new(PingCollector::new(vec![engine])?))?;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod engine;
pub mod refresh;
pub mod server;

pub use collector::PingCollector;
pub use config::{AppConfig, ConfigError};
pub use engine::{IcmpMonitor, ProbeEngine, ProbeMetrics, TargetId};
pub use refresh::{RefreshScheduler, TargetGroup};
