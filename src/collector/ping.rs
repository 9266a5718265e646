//! Scrape-time aggregation of ping statistics.
//!
//! [`PingCollector`] plugs into a [`prometheus::Registry`]. Every gather drains
//! all probing engines, merges the exports into the [`MetricStore`] and renders
//! the fixed `ping_*` metric families, all under a single lock so that one
//! scrape always sees one consistent snapshot.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, IntCounter, Opts};

use super::store::MetricStore;
use crate::engine::{ProbeEngine, ProbeMetrics, TargetId};

/// Prefix shared by every exported metric name.
pub const METRIC_PREFIX: &str = "ping_";

/// Label names carried by every per-target series.
pub const LABEL_NAMES: [&str; 4] = ["target", "ip", "ip_version", "source_ip"];

/// Extra label of the deprecated `ping_rtt_ms` family.
const TYPE_LABEL: &str = "type";

/// Collector exposing latency and loss for every target ever exported.
pub struct PingCollector {
    engines: Vec<Arc<dyn ProbeEngine>>,
    store: Mutex<MetricStore>,
    rtt: GaugeVec,
    best: GaugeVec,
    worst: GaugeVec,
    mean: GaugeVec,
    std_dev: GaugeVec,
    loss: GaugeVec,
    scrape_errors: IntCounter,
}

impl PingCollector {
    /// Create a collector draining the given engines on every scrape.
    pub fn new(engines: Vec<Arc<dyn ProbeEngine>>) -> Result<Self, prometheus::Error> {
        let mut rtt_labels = LABEL_NAMES.to_vec();
        rtt_labels.push(TYPE_LABEL);

        Ok(Self {
            engines,
            store: Mutex::new(MetricStore::new()),
            rtt: GaugeVec::new(
                opts("rtt_ms", "Round trip time in millis (deprecated)"),
                &rtt_labels,
            )?,
            best: GaugeVec::new(
                opts("rtt_best_ms", "Best round trip time in millis"),
                &LABEL_NAMES,
            )?,
            worst: GaugeVec::new(
                opts("rtt_worst_ms", "Worst round trip time in millis"),
                &LABEL_NAMES,
            )?,
            mean: GaugeVec::new(
                opts("rtt_mean_ms", "Mean round trip time in millis"),
                &LABEL_NAMES,
            )?,
            std_dev: GaugeVec::new(
                opts("rtt_std_deviation_ms", "Standard deviation in millis"),
                &LABEL_NAMES,
            )?,
            // The value is a 0..1 fraction despite the name; kept for dashboard compatibility.
            loss: GaugeVec::new(opts("loss_percent", "Packet loss in percent"), &LABEL_NAMES)?,
            scrape_errors: IntCounter::with_opts(opts(
                "scrape_errors_total",
                "Malformed probe entries skipped while merging",
            ))?,
        })
    }

    /// Number of targets currently held in the store.
    pub fn target_count(&self) -> usize {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn gauges(&self) -> [&GaugeVec; 6] {
        [
            &self.rtt,
            &self.best,
            &self.worst,
            &self.mean,
            &self.std_dev,
            &self.loss,
        ]
    }

    fn render(&self, store: &MetricStore) -> Vec<MetricFamily> {
        for gauge in self.gauges() {
            gauge.reset();
        }

        for (id, metrics) in store.iter() {
            self.observe(id, metrics);
        }

        self.gauges()
            .into_iter()
            .flat_map(|gauge| gauge.collect())
            .chain(self.scrape_errors.collect())
            .filter(|family| !family.get_metric().is_empty())
            .collect()
    }

    fn observe(&self, id: &TargetId, metrics: &ProbeMetrics) {
        let labels = id.labels();
        let base = labels.each_ref().map(String::as_str);
        let [target, ip, version, source] = base;

        let stats = [
            ("best", &self.best, metrics.best),
            ("worst", &self.worst, metrics.worst),
            ("mean", &self.mean, metrics.mean),
            ("std_dev", &self.std_dev, metrics.std_dev),
        ];
        for (kind, gauge, value) in stats {
            let value = millis(value);
            self.rtt
                .with_label_values(&[target, ip, version, source, kind])
                .set(value);
            gauge.with_label_values(&base).set(value);
        }

        if let Some(ratio) = metrics.loss_ratio() {
            self.loss.with_label_values(&base).set(ratio);
        }
    }
}

impl std::fmt::Debug for PingCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PingCollector")
            .field("engines", &self.engines.len())
            .field("targets", &self.target_count())
            .finish_non_exhaustive()
    }
}

impl Collector for PingCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.gauges()
            .into_iter()
            .flat_map(|gauge| gauge.desc())
            .chain(self.scrape_errors.desc())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);

        for engine in &self.engines {
            let export = engine.export_and_clear();
            if export.is_empty() {
                continue;
            }

            let outcome = store.merge(export);
            if outcome.skipped > 0 {
                self.scrape_errors.inc_by(outcome.skipped as u64);
            }
            tracing::trace!(
                merged = outcome.merged,
                skipped = outcome.skipped,
                "Merged engine export"
            );
        }

        if store.is_empty() {
            if self.scrape_errors.get() == 0 {
                return Vec::new();
            }
            return self.scrape_errors.collect();
        }

        self.render(&store)
    }
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(format!("{METRIC_PREFIX}{name}"), help)
}

fn millis(value: Duration) -> f64 {
    value.as_secs_f64() * 1000.0
}
