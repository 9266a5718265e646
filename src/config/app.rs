//! Application configuration structures.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::ConfigError;
use crate::engine::{DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT, MonitorConfig};
use crate::refresh::{DEFAULT_REFRESH_INTERVAL, DEFAULT_RESOLVE_TIMEOUT};

// =============================================================================
// Constants
// =============================================================================

/// Default listen address of the exporter.
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9346";

/// Default path serving the metrics.
pub const DEFAULT_METRICS_PATH: &str = "/metrics";

/// Paths routed by the web server besides the metrics path.
const RESERVED_PATHS: [&str; 2] = ["/", "/healthz"];

fn default_ping_interval() -> Duration {
    DEFAULT_PING_INTERVAL
}

fn default_ping_timeout() -> Duration {
    DEFAULT_PING_TIMEOUT
}

fn default_source_v4() -> Option<IpAddr> {
    Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn default_source_v6() -> Option<IpAddr> {
    Some(IpAddr::V6(Ipv6Addr::UNSPECIFIED))
}

// =============================================================================
// Web Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Address to listen on (default: "0.0.0.0:9346").
    pub listen_address: String,

    /// Path under which metrics are exposed (default: "/metrics").
    pub metrics_path: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            metrics_path: DEFAULT_METRICS_PATH.to_string(),
        }
    }
}

// =============================================================================
// DNS Configuration
// =============================================================================

/// DNS refresh configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// Interval between re-resolutions; `0s` disables refresh (default: 1m).
    #[serde(with = "humantime_serde")]
    pub refresh: Duration,

    /// Bound on a single resolution (default: 5s).
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            refresh: DEFAULT_REFRESH_INTERVAL,
            timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }
}

// =============================================================================
// Ping Configuration
// =============================================================================

/// One group of targets probed by a shared engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingGroupConfig {
    /// Hostnames or IP literals to probe.
    pub targets: Vec<String>,

    /// Probe interval (default: 5s).
    #[serde(default = "default_ping_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Probe timeout (default: 4s).
    #[serde(default = "default_ping_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// IPv4 source address (default: 0.0.0.0); `null` disables IPv4.
    #[serde(default = "default_source_v4")]
    pub source_v4: Option<IpAddr>,

    /// IPv6 source address (default: ::); `null` disables IPv6.
    #[serde(default = "default_source_v6")]
    pub source_v6: Option<IpAddr>,
}

impl PingGroupConfig {
    /// Create a group with default timing and sources.
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            targets,
            interval: DEFAULT_PING_INTERVAL,
            timeout: DEFAULT_PING_TIMEOUT,
            source_v4: default_source_v4(),
            source_v6: default_source_v6(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_sources(mut self, source_v4: Option<IpAddr>, source_v6: Option<IpAddr>) -> Self {
        self.source_v4 = source_v4;
        self.source_v6 = source_v6;
        self
    }

    /// Source addresses as `(v4, v6)`.
    pub fn sources(&self) -> (Option<IpAddr>, Option<IpAddr>) {
        (self.source_v4, self.source_v6)
    }

    /// Engine settings for this group.
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::new(self.interval, self.timeout)
            .with_source_v4(self.source_v4)
            .with_source_v6(self.source_v6)
    }

    fn validate(&self, context: &str) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{context}: at least one target is required"
            )));
        }
        if self.targets.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "{context}: target cannot be empty"
            )));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "{context}: interval must be positive"
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationError(format!(
                "{context}: timeout must be positive"
            )));
        }
        if self.timeout > self.interval {
            return Err(ConfigError::ValidationError(format!(
                "{context}: timeout ({:?}) must not exceed interval ({:?})",
                self.timeout, self.interval
            )));
        }
        if let Some(source) = self.source_v4.filter(|ip| !ip.is_ipv4()) {
            return Err(ConfigError::ValidationError(format!(
                "{context}: source_v4 '{source}' is not an IPv4 address"
            )));
        }
        if let Some(source) = self.source_v6.filter(|ip| !ip.is_ipv6()) {
            return Err(ConfigError::ValidationError(format!(
                "{context}: source_v6 '{source}' is not an IPv6 address"
            )));
        }
        if self.source_v4.is_none() && self.source_v6.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "{context}: at least one of source_v4 and source_v6 is required"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub web: WebConfig,

    /// DNS refresh configuration.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Target groups.
    #[serde(default)]
    pub ping: Vec<PingGroupConfig>,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// The result is not validated yet, since command line flags may still
    /// complete it; call [`AppConfig::validate`] afterwards.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Parsed listen address.
    pub fn listen_address(&self) -> Result<SocketAddr, ConfigError> {
        self.web.listen_address.parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid listen address: '{}'",
                self.web.listen_address
            ))
        })
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_address()?;

        let path = &self.web.metrics_path;
        if !path.starts_with('/') || path == "/" {
            return Err(ConfigError::ValidationError(format!(
                "invalid metrics path: '{path}' (must start with '/' and not be '/')"
            )));
        }
        if RESERVED_PATHS.contains(&path.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "invalid metrics path: '{path}' is already served"
            )));
        }
        if path.contains(['{', '}', '*']) {
            return Err(ConfigError::ValidationError(format!(
                "invalid metrics path: '{path}' (must not contain '{{', '}}' or '*')"
            )));
        }

        if self.dns.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "dns timeout must be positive".to_string(),
            ));
        }

        if self.ping.is_empty() {
            return Err(ConfigError::ValidationError(
                "no ping targets configured".to_string(),
            ));
        }

        for (i, group) in self.ping.iter().enumerate() {
            group.validate(&format!("ping group {i}"))?;
        }

        Ok(())
    }
}
