//! Collector Layer
//!
//! Scrape-time aggregation of probing-engine exports into Prometheus metrics.
//!
//! # Architecture
//!
//! - [`MetricStore`]: latest statistics per target, merged with override semantics
//! - [`PingCollector`]: `prometheus` collector that drains engines on every scrape
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ping_exporter::collector::PingCollector;
//! use ping_exporter::engine::{IcmpMonitor, MonitorConfig, ProbeEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let monitor: Arc<dyn ProbeEngine> = Arc::new(IcmpMonitor::new(MonitorConfig::default())?);
//! let registry = prometheus::Registry::new();
//! registry.register(Box::new(PingCollector::new(vec![monitor])?))?;
//! # Ok(())
//! # }
//! ```

mod ping;
mod store;

pub use ping::{LABEL_NAMES, METRIC_PREFIX, PingCollector};
pub use store::{MergeOutcome, MetricStore};
