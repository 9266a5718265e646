//! Per-target result history and its reduction to [`ProbeMetrics`].

use std::collections::VecDeque;
use std::time::Duration;

use super::ProbeMetrics;

/// Default cap on results kept between two exports.
pub const DEFAULT_HISTORY_SIZE: usize = 3600;

/// Bounded history of probe outcomes; `None` marks a lost packet.
#[derive(Debug)]
pub struct History {
    results: VecDeque<Option<Duration>>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            results: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record one probe outcome, evicting the oldest when full.
    pub fn record(&mut self, rtt: Option<Duration>) {
        if self.results.len() == self.capacity {
            self.results.pop_front();
        }
        self.results.push_back(rtt);
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Compute statistics over the recorded results and clear the history.
    ///
    /// Returns `None` when nothing was recorded since the last call.
    pub fn take_metrics(&mut self) -> Option<ProbeMetrics> {
        if self.results.is_empty() {
            return None;
        }
        let metrics = compute(self.results.iter().copied());
        self.results.clear();
        Some(metrics)
    }
}

fn compute(results: impl Iterator<Item = Option<Duration>>) -> ProbeMetrics {
    let mut sent = 0u64;
    let mut rtts = Vec::new();
    for result in results {
        sent += 1;
        if let Some(rtt) = result {
            rtts.push(rtt.as_secs_f64());
        }
    }

    let lost = sent - rtts.len() as u64;
    if rtts.is_empty() {
        return ProbeMetrics {
            packets_sent: sent,
            packets_lost: lost,
            ..Default::default()
        };
    }

    let n = rtts.len() as f64;
    let best = rtts.iter().copied().fold(f64::INFINITY, f64::min);
    let worst = rtts.iter().copied().fold(0.0, f64::max);
    let mean = rtts.iter().sum::<f64>() / n;
    let variance = rtts.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;

    ProbeMetrics {
        best: Duration::from_secs_f64(best),
        worst: Duration::from_secs_f64(worst),
        mean: Duration::from_secs_f64(mean),
        std_dev: Duration::from_secs_f64(variance.sqrt()),
        packets_sent: sent,
        packets_lost: lost,
    }
}
