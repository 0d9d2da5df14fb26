//! Observability: cumulative sync counters and timing histograms.
//! Histograms keep the last 1024 samples per metric for p50/p95/p99.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A span measuring elapsed time from creation to explicit end.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    pub fn new(name: &'static str, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            name,
            start: Instant::now(),
            registry,
        }
    }

    /// End the span, recording elapsed duration in milliseconds.
    pub fn finish(self) -> f64 {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.registry.record(self.name, elapsed_ms);
        elapsed_ms
    }
}

/// Fixed-capacity ring buffer for histogram samples.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        sorted[idx.min(self.count - 1)]
    }
}

/// Running totals across all cycles since startup.
#[derive(Default)]
pub struct SyncCounters {
    pub cycles: AtomicU64,
    pub idle_cycles: AtomicU64,
    pub failed_cycles: AtomicU64,
    pub items_removed: AtomicU64,
    pub fields_from_cache: AtomicU64,
    pub fields_from_api: AtomicU64,
    pub api_calls: AtomicU64,
    pub api_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CounterSnapshot {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub failed_cycles: u64,
    pub items_removed: u64,
    pub fields_from_cache: u64,
    pub fields_from_api: u64,
    pub api_calls: u64,
    pub api_failures: u64,
}

impl SyncCounters {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            idle_cycles: self.idle_cycles.load(Ordering::Relaxed),
            failed_cycles: self.failed_cycles.load(Ordering::Relaxed),
            items_removed: self.items_removed.load(Ordering::Relaxed),
            fields_from_cache: self.fields_from_cache.load(Ordering::Relaxed),
            fields_from_api: self.fields_from_api.load(Ordering::Relaxed),
            api_calls: self.api_calls.load(Ordering::Relaxed),
            api_failures: self.api_failures.load(Ordering::Relaxed),
        }
    }
}

/// Stores histograms for all named metrics plus the sync counters.
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, SampleRing>>,
    ring_capacity: usize,
    pub counters: SyncCounters,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            ring_capacity: 1024,
            counters: SyncCounters::default(),
        }
    }

    /// Record a sample (in milliseconds) for the named metric.
    pub fn record(&self, name: &'static str, value_ms: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value_ms);
        tracing::trace!(metric = name, value_ms, "metric_recorded");
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan::new(name, Arc::clone(self))
    }

    /// Percentile for a metric (p value 0-100), in milliseconds.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        let hists = self.histograms.lock();
        hists.get(name).map(|ring| ring.percentile(p)).unwrap_or(0.0)
    }

    /// Summary of all metrics at p50/p95/p99.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        hists
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50_ms: ring.percentile(50.0),
                        p95_ms: ring.percentile(95.0),
                        p99_ms: ring.percentile(99.0),
                        count: ring.count,
                    },
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub count: usize,
}

/// Well-known metric names.
pub mod metric_names {
    pub const CYCLE: &str = "t_cycle";
    pub const QUEUE_FETCH: &str = "t_queue_fetch";
    pub const API_CALL: &str = "t_api_call";
    pub const WRITE_BACK: &str = "t_write_back";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_over_recorded_samples() {
        let registry = MetricsRegistry::new();
        for v in 1..=100 {
            registry.record(metric_names::API_CALL, v as f64);
        }
        assert_eq!(registry.percentile(metric_names::API_CALL, 50.0), 51.0);
        assert_eq!(registry.percentile(metric_names::API_CALL, 99.0), 99.0);
        assert_eq!(registry.percentile("unknown", 50.0), 0.0);

        let summary = registry.summary();
        assert_eq!(summary[metric_names::API_CALL].count, 100);
    }

    #[test]
    fn ring_keeps_only_latest_samples() {
        let mut ring = SampleRing::new(4);
        for v in [100.0, 1.0, 2.0, 3.0, 4.0] {
            ring.push(v);
        }
        assert_eq!(ring.count, 4);
        assert_eq!(ring.percentile(100.0), 4.0);
    }

    #[test]
    fn counters_snapshot() {
        let registry = MetricsRegistry::new();
        SyncCounters::add(&registry.counters.items_removed, 3);
        SyncCounters::add(&registry.counters.items_removed, 2);
        assert_eq!(registry.counters.snapshot().items_removed, 5);
    }
}
