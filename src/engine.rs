//! Probing Engine
//!
//! The boundary between metric exposition and the code that actually sends
//! ICMP echo requests.
//!
//! - [`ProbeEngine`]: export/add/remove contract consumed by the collector and
//!   the refresh scheduler
//! - [`TargetId`] / [`ProbeMetrics`]: series identity and per-window statistics
//! - [`IcmpMonitor`]: `surge-ping` based implementation

mod monitor;
mod stats;
mod traits;

pub use monitor::{DEFAULT_PING_INTERVAL, DEFAULT_PING_TIMEOUT, IcmpMonitor, MonitorConfig};
pub use stats::{DEFAULT_HISTORY_SIZE, History};
pub use traits::{EngineError, IpVersion, ProbeEngine, ProbeMetrics, TargetId};
