//! Metrics collection.
//!
//! Atomic primitives plus a named, namespaced registry shared between the
//! plugin registry and every plugin context.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsConfig {
    pub fn new() -> Self {
        Self {
            enabled: true,
            latency_buckets: DEFAULT_LATENCY_BUCKETS.to_vec(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }
}

const DEFAULT_LATENCY_BUCKETS: [f64; 10] = [
    10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe atomic gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Simple histogram using fixed buckets.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    bucket_bounds: Vec<f64>,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(bucket_bounds: Vec<f64>) -> Self {
        let buckets = (0..=bucket_bounds.len())
            .map(|_| AtomicU64::new(0))
            .collect();
        Self {
            buckets,
            bucket_bounds,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn default_latency() -> Self {
        Self::new(DEFAULT_LATENCY_BUCKETS.to_vec())
    }

    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .bucket_bounds
            .iter()
            .position(|&bound| value <= bound)
            .unwrap_or(self.bucket_bounds.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum
            .fetch_add((value.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum in the observed unit. Stored internally scaled by 1000.
    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum() / n as f64,
        }
    }

    /// Per-bucket counts; the last entry is the overflow bucket.
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub mean: f64,
}

/// Point-in-time view of a registry (or one namespace of it).
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl MetricsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.gauges.is_empty() && self.histograms.is_empty()
    }
}

/// Named metric registry.
///
/// Children share the parent's store and prefix every name with their
/// namespace (`parent.child.name`). After `dispose`, recording calls are
/// ignored and the store is empty.
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    store: Arc<DashMap<String, Metric>>,
    namespace: Option<String>,
    buckets: Arc<Vec<f64>>,
    enabled: bool,
    disposed: Arc<AtomicBool>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

impl MetricsRegistry {
    pub fn new(config: &MetricsConfig) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            namespace: None,
            buckets: Arc::new(config.latency_buckets.clone()),
            enabled: config.enabled,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn child(&self, namespace: &str) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: Some(self.qualify(namespace)),
            buckets: Arc::clone(&self.buckets),
            enabled: self.enabled,
            disposed: Arc::clone(&self.disposed),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn qualify(&self, name: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, name),
            None => name.to_string(),
        }
    }

    fn recording(&self) -> bool {
        self.enabled && !self.disposed.load(Ordering::Acquire)
    }

    /// Counter registered under `name`, created on first use.
    ///
    /// A name already bound to a different metric kind yields a detached
    /// counter that is never exported.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if !self.recording() {
            return Arc::new(Counter::new());
        }
        let entry = self
            .store
            .entry(self.qualify(name))
            .or_insert_with(|| Metric::Counter(Arc::new(Counter::new())));
        match entry.value() {
            Metric::Counter(c) => Arc::clone(c),
            _ => Arc::new(Counter::new()),
        }
    }

    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        if !self.recording() {
            return Arc::new(Gauge::new());
        }
        let entry = self
            .store
            .entry(self.qualify(name))
            .or_insert_with(|| Metric::Gauge(Arc::new(Gauge::new())));
        match entry.value() {
            Metric::Gauge(g) => Arc::clone(g),
            _ => Arc::new(Gauge::new()),
        }
    }

    pub fn histogram(&self, name: &str) -> Arc<Histogram> {
        if !self.recording() {
            return Arc::new(Histogram::new(self.buckets.to_vec()));
        }
        let entry = self.store.entry(self.qualify(name)).or_insert_with(|| {
            Metric::Histogram(Arc::new(Histogram::new(self.buckets.to_vec())))
        });
        match entry.value() {
            Metric::Histogram(h) => Arc::clone(h),
            _ => Arc::new(Histogram::new(self.buckets.to_vec())),
        }
    }

    pub fn increment(&self, name: &str) {
        self.counter(name).inc();
    }

    pub fn add(&self, name: &str, n: u64) {
        self.counter(name).add(n);
    }

    pub fn set_gauge(&self, name: &str, value: i64) {
        self.gauge(name).set(value);
    }

    pub fn observe(&self, name: &str, value: f64) {
        self.histogram(name).observe(value);
    }

    /// Snapshot of every metric under this registry's namespace.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let prefix = self.namespace.as_ref().map(|ns| format!("{}.", ns));
        let mut snapshot = MetricsSnapshot::default();

        for entry in self.store.iter() {
            let name = entry.key();
            if let Some(prefix) = &prefix
                && !name.starts_with(prefix.as_str())
            {
                continue;
            }
            match entry.value() {
                Metric::Counter(c) => {
                    snapshot.counters.insert(name.clone(), c.get());
                }
                Metric::Gauge(g) => {
                    snapshot.gauges.insert(name.clone(), g.get());
                }
                Metric::Histogram(h) => {
                    snapshot.histograms.insert(
                        name.clone(),
                        HistogramSnapshot {
                            count: h.count(),
                            sum: h.sum(),
                            mean: h.mean(),
                        },
                    );
                }
            }
        }
        snapshot
    }

    /// Removes every metric under this namespace.
    pub fn reset(&self) {
        match &self.namespace {
            Some(ns) => {
                let prefix = format!("{}.", ns);
                self.store.retain(|name, _| !name.starts_with(&prefix));
            }
            None => self.store.clear(),
        }
    }

    /// Drops all metrics and stops recording, for this registry and every
    /// child sharing its store.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.store.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
