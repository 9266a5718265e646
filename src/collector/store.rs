//! Process-wide accumulator of the latest statistics per target.

use std::collections::{BTreeMap, HashMap};

use crate::engine::{ProbeMetrics, TargetId};

/// Result of one [`MetricStore::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Entries written to the store.
    pub merged: usize,
    /// Malformed entries dropped.
    pub skipped: usize,
}

/// Latest [`ProbeMetrics`] per target.
///
/// Entries are overwritten by newer exports and never removed: a target that
/// stops being probed (for instance after its hostname stops resolving to an
/// address) keeps exposing its last values until the process restarts.
#[derive(Debug, Default)]
pub struct MetricStore {
    entries: BTreeMap<TargetId, ProbeMetrics>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one engine export with override semantics.
    ///
    /// Keys present in `export` replace the stored value, absent keys are left
    /// untouched. Entries reporting more lost than sent packets are skipped and
    /// the previous value for that key, if any, stays in place.
    pub fn merge(&mut self, export: HashMap<TargetId, ProbeMetrics>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        for (id, metrics) in export {
            if !metrics.is_consistent() {
                tracing::warn!(
                    target_host = %id.target,
                    ip = %id.ip,
                    packets_sent = metrics.packets_sent,
                    packets_lost = metrics.packets_lost,
                    "Skipping malformed probe entry"
                );
                outcome.skipped += 1;
                continue;
            }
            self.entries.insert(id, metrics);
            outcome.merged += 1;
        }

        outcome
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TargetId, &ProbeMetrics)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
impl MetricStore {
    pub fn get(&self, id: &TargetId) -> Option<&ProbeMetrics> {
        self.entries.get(id)
    }
}
