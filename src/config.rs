//! Configuration module for the ping exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Web settings (listen address, metrics path)
//! - DNS refresh settings (interval, resolution timeout)
//! - Ping target groups (targets, timing, source addresses)
//!
//! Command line flags are merged on top of the file by the binary before
//! [`AppConfig::validate`] runs.

mod app;
mod validation;

pub use app::{AppConfig, DnsConfig, PingGroupConfig, WebConfig};
pub use validation::{ConfigError, parse_duration};

// Re-export constants
pub use app::{DEFAULT_LISTEN_ADDRESS, DEFAULT_METRICS_PATH};
