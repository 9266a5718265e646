//! ICMP probing engine.
//!
//! Every registered address gets its own Tokio task that pings it at a fixed
//! interval and records the outcome into a bounded [`History`]. Exports reduce
//! each history to [`ProbeMetrics`] and clear it.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::stats::{DEFAULT_HISTORY_SIZE, History};
use super::{EngineError, IpVersion, ProbeEngine, ProbeMetrics, TargetId};

/// Default probe interval (5 seconds).
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);

/// Default probe timeout (4 seconds).
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(4);

const PAYLOAD: [u8; 56] = [0; 56];

/// Settings shared by all targets of one monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Time between two probes of the same target.
    pub interval: Duration,
    /// Time after which an unanswered probe counts as lost.
    pub timeout: Duration,
    /// IPv4 source address; `None` disables IPv4 probing.
    pub source_v4: Option<IpAddr>,
    /// IPv6 source address; `None` disables IPv6 probing.
    pub source_v6: Option<IpAddr>,
    /// Maximum results kept per target between two exports.
    pub history_size: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_PING_INTERVAL,
            timeout: DEFAULT_PING_TIMEOUT,
            source_v4: None,
            source_v6: None,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

impl MonitorConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            ..Default::default()
        }
    }

    pub fn with_source_v4(mut self, source: Option<IpAddr>) -> Self {
        self.source_v4 = source;
        self
    }

    pub fn with_source_v6(mut self, source: Option<IpAddr>) -> Self {
        self.source_v6 = source;
        self
    }

    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }
}

struct ProbeTask {
    history: Arc<Mutex<History>>,
    handle: JoinHandle<()>,
}

/// ICMP echo monitor implementing [`ProbeEngine`].
///
/// One ICMP client per enabled address family is created up front, so a
/// missing raw-socket permission surfaces at startup rather than per target.
pub struct IcmpMonitor {
    config: MonitorConfig,
    client_v4: Option<Client>,
    client_v6: Option<Client>,
    targets: Mutex<HashMap<TargetId, ProbeTask>>,
}

impl IcmpMonitor {
    /// Create a monitor. Must be called from within a Tokio runtime.
    pub fn new(config: MonitorConfig) -> Result<Self, EngineError> {
        let client_v4 = config
            .source_v4
            .map(|source| new_client(ICMP::V4, source))
            .transpose()?;
        let client_v6 = config
            .source_v6
            .map(|source| new_client(ICMP::V6, source))
            .transpose()?;

        Ok(Self {
            config,
            client_v4,
            client_v6,
            targets: Mutex::new(HashMap::new()),
        })
    }

    /// Number of addresses currently being probed.
    pub fn target_count(&self) -> usize {
        lock(&self.targets).len()
    }

    fn client_for(&self, ip: &IpAddr) -> Option<&Client> {
        match IpVersion::of(ip) {
            IpVersion::V4 => self.client_v4.as_ref(),
            IpVersion::V6 => self.client_v6.as_ref(),
        }
    }
}

impl std::fmt::Debug for IcmpMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IcmpMonitor")
            .field("config", &self.config)
            .field("target_count", &self.target_count())
            .finish_non_exhaustive()
    }
}

impl ProbeEngine for IcmpMonitor {
    fn export_and_clear(&self) -> HashMap<TargetId, ProbeMetrics> {
        lock(&self.targets)
            .iter()
            .filter_map(|(id, task)| {
                lock(&task.history)
                    .take_metrics()
                    .map(|metrics| (id.clone(), metrics))
            })
            .collect()
    }

    fn add_target(&self, id: TargetId) -> Result<(), EngineError> {
        let client = self
            .client_for(&id.ip)
            .ok_or(EngineError::Unsupported(id.ip_version(), id.ip))?
            .clone();

        let mut targets = lock(&self.targets);
        if targets.contains_key(&id) {
            return Ok(());
        }

        let history = Arc::new(Mutex::new(History::new(self.config.history_size)));
        let handle = tokio::spawn(probe_loop(
            client,
            id.clone(),
            self.config.interval,
            self.config.timeout,
            Arc::clone(&history),
        ));

        tracing::info!(target_host = %id.target, ip = %id.ip, "Probing started");
        targets.insert(id, ProbeTask { history, handle });
        Ok(())
    }

    fn remove_target(&self, id: &TargetId) {
        if let Some(task) = lock(&self.targets).remove(id) {
            task.handle.abort();
            tracing::info!(target_host = %id.target, ip = %id.ip, "Probing stopped");
        }
    }
}

impl Drop for IcmpMonitor {
    fn drop(&mut self) {
        for task in lock(&self.targets).values() {
            task.handle.abort();
        }
    }
}

fn new_client(kind: ICMP, source: IpAddr) -> Result<Client, EngineError> {
    let config = Config::builder()
        .kind(kind)
        .bind(SocketAddr::new(source, 0))
        .build();
    Ok(Client::new(&config)?)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn probe_loop(
    client: Client,
    id: TargetId,
    interval: Duration,
    timeout: Duration,
    history: Arc<Mutex<History>>,
) {
    let mut pinger = client.pinger(id.ip, PingIdentifier(rand::random())).await;
    pinger.timeout(timeout);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut seq: u16 = 0;

    loop {
        ticker.tick().await;

        let rtt = match pinger.ping(PingSequence(seq), &PAYLOAD).await {
            Ok((_, rtt)) => Some(rtt),
            Err(e) => {
                tracing::trace!(
                    target_host = %id.target,
                    ip = %id.ip,
                    seq,
                    error = %e,
                    "Probe lost"
                );
                None
            }
        };
        seq = seq.wrapping_add(1);

        lock(&history).record(rtt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.interval, DEFAULT_PING_INTERVAL);
        assert_eq!(config.timeout, DEFAULT_PING_TIMEOUT);
        assert_eq!(config.history_size, DEFAULT_HISTORY_SIZE);
        assert!(config.source_v4.is_none());
    }

    #[test]
    fn test_monitor_config_builder() {
        let config = MonitorConfig::new(Duration::from_secs(1), Duration::from_millis(500))
            .with_source_v4(Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)))
            .with_history_size(10);

        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.timeout, Duration::from_millis(500));
        assert_eq!(config.source_v4, Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
        assert!(config.source_v6.is_none());
        assert_eq!(config.history_size, 10);
    }

    #[tokio::test]
    async fn test_add_target_without_family_client() {
        // No sources configured, so no sockets are opened.
        let monitor = IcmpMonitor::new(MonitorConfig::default()).unwrap();
        let id = TargetId::new(
            "localhost",
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        );

        let err = monitor.add_target(id.clone()).unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(IpVersion::V4, _)));
        assert_eq!(monitor.target_count(), 0);
        assert!(monitor.export_and_clear().is_empty());

        // Removing an unknown target is a no-op.
        monitor.remove_target(&id);
    }
}
