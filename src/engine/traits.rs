//! Core engine traits and types.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by a probing engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// ICMP client could not be created (usually missing raw socket permission).
    #[error("failed to create ICMP client: {0}")]
    Client(#[from] std::io::Error),

    /// The engine has no socket for the target's address family.
    #[error("no {0} source configured for target {1}")]
    Unsupported(IpVersion, IpAddr),
}

/// IP protocol version of a resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }

    /// Label value used in exposition (`4` or `6`).
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::V4 => "4",
            Self::V6 => "6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("IPv4"),
            Self::V6 => f.write_str("IPv6"),
        }
    }
}

/// Identity of one monitored series.
///
/// One hostname can resolve to several addresses; each address is probed and
/// exported as its own series, so the hostname alone is not a key. The IP
/// version is derived from `ip` and cannot disagree with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId {
    /// Configured hostname (or IP literal) the address was resolved from.
    pub target: String,
    /// Resolved address being probed.
    pub ip: IpAddr,
    /// Source address the probes are sent from.
    pub source_ip: IpAddr,
}

impl TargetId {
    pub fn new(target: impl Into<String>, ip: IpAddr, source_ip: IpAddr) -> Self {
        Self {
            target: target.into(),
            ip,
            source_ip,
        }
    }

    pub fn ip_version(&self) -> IpVersion {
        IpVersion::of(&self.ip)
    }

    /// Label values in exposition order: `target, ip, ip_version, source_ip`.
    pub fn labels(&self) -> [String; 4] {
        [
            self.target.clone(),
            self.ip.to_string(),
            self.ip_version().as_label().to_string(),
            self.source_ip.to_string(),
        ]
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} via {})", self.target, self.ip, self.source_ip)
    }
}

/// Statistics for one target over the window since the last export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeMetrics {
    pub best: Duration,
    pub worst: Duration,
    pub mean: Duration,
    pub std_dev: Duration,
    pub packets_sent: u64,
    pub packets_lost: u64,
}

impl ProbeMetrics {
    /// Whether `packets_lost <= packets_sent` holds.
    pub fn is_consistent(&self) -> bool {
        self.packets_lost <= self.packets_sent
    }

    /// Lost packets as a fraction of sent packets.
    ///
    /// Returns `None` when nothing was sent, since the ratio is undefined.
    pub fn loss_ratio(&self) -> Option<f64> {
        if self.packets_sent == 0 {
            return None;
        }
        Some(self.packets_lost as f64 / self.packets_sent as f64)
    }
}

/// Boundary to a probing engine.
///
/// Engines probe a dynamic set of addresses and accumulate per-target
/// statistics. All methods may be called concurrently: the refresh scheduler
/// adds and removes targets while scrapes export.
pub trait ProbeEngine: Send + Sync + 'static {
    /// Drain the statistics accumulated since the previous export.
    ///
    /// This is a destructive read: the engine's per-target accumulators are
    /// reset and ownership of the returned data moves to the caller.
    fn export_and_clear(&self) -> std::collections::HashMap<TargetId, ProbeMetrics>;

    /// Start probing `id.ip` from `id.source_ip`. Adding a known target is a no-op.
    fn add_target(&self, id: TargetId) -> Result<(), EngineError>;

    /// Stop probing a target. Removing an unknown target is a no-op.
    fn remove_target(&self, id: &TargetId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_target_id_labels() {
        let id = TargetId::new(
            "example.com",
            "93.184.216.34".parse().unwrap(),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        );
        assert_eq!(
            id.labels(),
            [
                "example.com".to_string(),
                "93.184.216.34".to_string(),
                "4".to_string(),
                "0.0.0.0".to_string(),
            ]
        );
    }

    #[test]
    fn test_target_id_ipv6_version() {
        let id = TargetId::new(
            "example.com",
            "2606:2800:220:1::248".parse().unwrap(),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        );
        assert_eq!(id.ip_version(), IpVersion::V6);
        assert_eq!(id.labels()[2], "6");
        assert_eq!(id.labels()[3], "::");
    }

    #[test]
    fn test_hostname_with_spaces_is_preserved() {
        let id = TargetId::new(
            "odd host name",
            "10.0.0.1".parse().unwrap(),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        );
        assert_eq!(id.labels()[0], "odd host name");
        assert_eq!(id.labels()[1], "10.0.0.1");
    }

    #[test]
    fn test_loss_ratio() {
        let metrics = ProbeMetrics {
            packets_sent: 10,
            packets_lost: 2,
            ..Default::default()
        };
        assert_eq!(metrics.loss_ratio(), Some(0.2));

        let empty = ProbeMetrics::default();
        assert_eq!(empty.loss_ratio(), None);
    }

    #[test]
    fn test_consistency() {
        let bad = ProbeMetrics {
            packets_sent: 1,
            packets_lost: 2,
            ..Default::default()
        };
        assert!(!bad.is_consistent());
        assert!(ProbeMetrics::default().is_consistent());
    }
}
