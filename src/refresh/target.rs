//! A configured hostname and the addresses registered for it.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use crate::engine::{IpVersion, ProbeEngine, TargetId};

/// Delay between the initial registrations of two consecutive targets.
pub const REGISTRATION_STAGGER: Duration = Duration::from_millis(10);

/// Changes applied to the engine by one [`PingTarget::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub added: Vec<IpAddr>,
    pub removed: Vec<IpAddr>,
    /// Addresses the engine refused; they stay unregistered until the next tick.
    pub rejected: Vec<IpAddr>,
}

/// One configured hostname.
#[derive(Debug, Clone)]
pub struct PingTarget {
    host: String,
    source_v4: Option<IpAddr>,
    source_v6: Option<IpAddr>,
    delay: Duration,
    addresses: BTreeSet<IpAddr>,
}

impl PingTarget {
    /// Create the `index`-th target of a group; its initial registration is
    /// delayed by `index * 10ms`.
    pub fn new(host: impl Into<String>, index: usize) -> Self {
        Self {
            host: host.into(),
            source_v4: None,
            source_v6: None,
            delay: REGISTRATION_STAGGER * index as u32,
            addresses: BTreeSet::new(),
        }
    }

    /// Set source addresses; a `None` family is never probed.
    pub fn with_sources(mut self, source_v4: Option<IpAddr>, source_v6: Option<IpAddr>) -> Self {
        self.source_v4 = source_v4;
        self.source_v6 = source_v6;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Addresses currently registered with the engine.
    pub fn addresses(&self) -> &BTreeSet<IpAddr> {
        &self.addresses
    }

    fn source_for(&self, ip: &IpAddr) -> Option<IpAddr> {
        match IpVersion::of(ip) {
            IpVersion::V4 => self.source_v4,
            IpVersion::V6 => self.source_v6,
        }
    }

    fn target_id(&self, ip: IpAddr) -> Option<TargetId> {
        self.source_for(&ip)
            .map(|source| TargetId::new(self.host.clone(), ip, source))
    }

    /// Bring the engine in line with a fresh resolution result.
    ///
    /// Addresses of a family without a configured source are ignored. Vanished
    /// addresses are removed, new ones added, addresses present in both sets
    /// are left alone so their probing is not interrupted.
    pub fn reconcile(
        &mut self,
        resolved: BTreeSet<IpAddr>,
        engine: &dyn ProbeEngine,
    ) -> Reconciliation {
        let wanted: BTreeSet<IpAddr> = resolved
            .into_iter()
            .filter(|ip| self.source_for(ip).is_some())
            .collect();
        let mut result = Reconciliation::default();

        for ip in self.addresses.difference(&wanted) {
            if let Some(id) = self.target_id(*ip) {
                tracing::info!(host = %self.host, ip = %ip, "Removing target address");
                engine.remove_target(&id);
            }
            result.removed.push(*ip);
        }

        let mut registered: BTreeSet<IpAddr> =
            self.addresses.intersection(&wanted).copied().collect();

        for ip in wanted.difference(&self.addresses) {
            let Some(id) = self.target_id(*ip) else {
                continue;
            };
            tracing::info!(host = %self.host, ip = %ip, "Adding target address");
            match engine.add_target(id) {
                Ok(()) => {
                    registered.insert(*ip);
                    result.added.push(*ip);
                }
                Err(e) => {
                    tracing::warn!(host = %self.host, ip = %ip, error = %e, "Failed to add target address");
                    result.rejected.push(*ip);
                }
            }
        }

        self.addresses = registered;
        result
    }
}
