//! In-process registry backed by sharded maps of atomics.
//!
//! # Responsibilities
//! - Register-or-fetch counter and timer series without a global lock
//! - Enforce a ceiling on the number of live series
//! - Expose snapshots (counter values, histogram statistics) for reports and tests
//!
//! # Design Decisions
//! - `DashMap` shards the series maps; a new series only write-locks its shard
//! - Updates are relaxed atomic adds; no read-modify-write of stored values
//! - Histograms use fixed upper-inclusive buckets plus an overflow bucket
//! - Percentiles interpolate linearly inside the matching bucket

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::registry::{
    CounterHandle, Labels, MetricDescriptor, MetricsRegistry, RegistryError, SchemaTable,
    SeriesKey, TimerHandle,
};

/// Default ceiling on live series.
pub const DEFAULT_MAX_SERIES: usize = 10_000;

/// Registry holding every series in memory.
#[derive(Debug)]
pub struct InMemoryRegistry {
    schemas: SchemaTable,
    counters: DashMap<SeriesKey, Arc<AtomicCounter>>,
    timers: DashMap<SeriesKey, Arc<AtomicHistogram>>,
    series: AtomicUsize,
    max_series: usize,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SERIES)
    }

    /// Create a registry that refuses new series beyond `max_series`.
    pub fn with_capacity(max_series: usize) -> Self {
        Self {
            schemas: SchemaTable::default(),
            counters: DashMap::new(),
            timers: DashMap::new(),
            series: AtomicUsize::new(0),
            max_series,
        }
    }

    /// Number of live series across all metrics.
    pub fn series_count(&self) -> usize {
        self.series.load(Ordering::Relaxed)
    }

    /// Label keys bound to `name`, if it was ever registered.
    pub fn label_keys(&self, name: &str) -> Option<&'static [&'static str]> {
        self.schemas.label_keys(name)
    }

    /// Current value of one counter series.
    pub fn counter_value(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        self.counters
            .iter()
            .find(|entry| series_matches(entry.key(), name, labels))
            .map(|entry| entry.value().get())
    }

    /// Sum of every series of a counter.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|entry| entry.key().name == name)
            .map(|entry| entry.value().get())
            .sum()
    }

    /// Number of distinct series registered under `name`.
    pub fn series_of(&self, name: &str) -> usize {
        let counters = self.counters.iter().filter(|e| e.key().name == name).count();
        let timers = self.timers.iter().filter(|e| e.key().name == name).count();
        counters + timers
    }

    /// Statistics of one timer series.
    pub fn timer_snapshot(&self, name: &str, labels: &[(&str, &str)]) -> Option<HistogramSnapshot> {
        self.timers
            .iter()
            .find(|entry| series_matches(entry.key(), name, labels))
            .map(|entry| entry.value().snapshot())
    }

    /// Point-in-time copy of every series, sorted by name then labels.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut counters: Vec<CounterSample> = self
            .counters
            .iter()
            .map(|entry| CounterSample {
                name: entry.key().name.clone(),
                labels: label_pairs(&entry.key().labels),
                value: entry.value().get(),
            })
            .collect();
        counters.sort_by(|a, b| (&a.name, &a.labels).cmp(&(&b.name, &b.labels)));

        let mut timers: Vec<TimerSample> = self
            .timers
            .iter()
            .map(|entry| TimerSample {
                name: entry.key().name.clone(),
                labels: label_pairs(&entry.key().labels),
                histogram: entry.value().snapshot(),
            })
            .collect();
        timers.sort_by(|a, b| (&a.name, &a.labels).cmp(&(&b.name, &b.labels)));

        RegistrySnapshot { counters, timers }
    }

    fn reserve_series(&self, name: &str) -> Result<(), RegistryError> {
        let previous = self.series.fetch_add(1, Ordering::Relaxed);
        if previous >= self.max_series {
            self.series.fetch_sub(1, Ordering::Relaxed);
            return Err(RegistryError::CapacityExceeded {
                name: name.to_string(),
                limit: self.max_series,
            });
        }
        Ok(())
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry for InMemoryRegistry {
    fn register_or_fetch_counter(
        &self,
        descriptor: &MetricDescriptor,
        labels: &Labels,
    ) -> Result<Arc<dyn CounterHandle>, RegistryError> {
        self.schemas.admit(descriptor, labels, None)?;
        let key = SeriesKey::new(descriptor, labels);
        if let Some(existing) = self.counters.get(&key) {
            return Ok(existing.clone());
        }
        let counter = match self.counters.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                self.reserve_series(descriptor.name())?;
                entry.insert(Arc::new(AtomicCounter::default())).clone()
            }
        };
        Ok(counter)
    }

    fn register_or_fetch_timer(
        &self,
        descriptor: &MetricDescriptor,
        labels: &Labels,
        buckets: &[Duration],
    ) -> Result<Arc<dyn TimerHandle>, RegistryError> {
        self.schemas.admit(descriptor, labels, Some(buckets))?;
        let key = SeriesKey::new(descriptor, labels);
        if let Some(existing) = self.timers.get(&key) {
            return Ok(existing.clone());
        }
        let timer = match self.timers.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                self.reserve_series(descriptor.name())?;
                entry.insert(Arc::new(AtomicHistogram::new(buckets))).clone()
            }
        };
        Ok(timer)
    }
}

fn series_matches(key: &SeriesKey, name: &str, labels: &[(&str, &str)]) -> bool {
    key.name == name
        && key.labels.len() == labels.len()
        && key.labels.iter().zip(labels).all(|((k, v), (ek, ev))| k == *ek && v == *ev)
}

fn label_pairs(labels: &Labels) -> Vec<(String, String)> {
    labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Monotonic counter.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl CounterHandle for AtomicCounter {
    fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fixed-bucket histogram of nanosecond samples.
#[derive(Debug)]
pub struct AtomicHistogram {
    /// Upper bounds (inclusive), ascending, in nanoseconds.
    bounds: Vec<u64>,
    /// One slot per bound plus the overflow slot.
    buckets: Vec<AtomicU64>,
    sum_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl AtomicHistogram {
    pub fn new(bounds: &[Duration]) -> Self {
        let bounds: Vec<u64> = bounds
            .iter()
            .map(|b| u64::try_from(b.as_nanos()).unwrap_or(u64::MAX))
            .collect();
        let buckets = (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            bounds,
            buckets,
            sum_nanos: AtomicU64::new(0),
            max_nanos: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let counts: Vec<u64> = self.buckets.iter().map(|b| b.load(Ordering::Relaxed)).collect();
        let count = counts.iter().sum();
        let buckets = counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| BucketCount {
                upper_bound: self.bounds.get(i).map(|b| Duration::from_nanos(*b)),
                count,
            })
            .collect();
        HistogramSnapshot {
            count,
            sum: Duration::from_nanos(self.sum_nanos.load(Ordering::Relaxed)),
            max: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
            buckets,
        }
    }
}

impl TimerHandle for AtomicHistogram {
    fn record(&self, duration_nanos: u64) {
        let idx = self.bounds.partition_point(|bound| *bound < duration_nanos);
        if let Some(bucket) = self.buckets.get(idx) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
        self.sum_nanos.fetch_add(duration_nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(duration_nanos, Ordering::Relaxed);
    }
}

/// Samples falling at or below `upper_bound` (and above the previous bound).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    /// `None` for the overflow bucket.
    pub upper_bound: Option<Duration>,
    pub count: u64,
}

/// Statistics derived from one timer series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: Duration,
    pub max: Duration,
    pub buckets: Vec<BucketCount>,
}

impl HistogramSnapshot {
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(u64::try_from(self.sum.as_nanos() / u128::from(self.count)).unwrap_or(u64::MAX))
    }

    /// Estimate the `q`-quantile (`0.0..=1.0`).
    pub fn percentile(&self, q: f64) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let q = q.clamp(0.0, 1.0);
        let rank = q * self.count as f64;
        let mut cumulative = 0u64;
        let mut lower = Duration::ZERO;

        for bucket in &self.buckets {
            let previous = cumulative;
            cumulative += bucket.count;
            if bucket.count > 0 && cumulative as f64 >= rank {
                let Some(upper) = bucket.upper_bound else {
                    return self.max;
                };
                let fraction = ((rank - previous as f64) / bucket.count as f64).clamp(0.0, 1.0);
                let width = upper.saturating_sub(lower).as_nanos() as f64;
                let estimate = lower + Duration::from_nanos((width * fraction) as u64);
                return estimate.min(self.max.max(lower));
            }
            if let Some(upper) = bucket.upper_bound {
                lower = upper;
            }
        }
        self.max
    }

    pub fn p50(&self) -> Duration {
        self.percentile(0.50)
    }

    pub fn p95(&self) -> Duration {
        self.percentile(0.95)
    }

    pub fn p99(&self) -> Duration {
        self.percentile(0.99)
    }
}

/// One counter series in a [`RegistrySnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct CounterSample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: u64,
}

/// One timer series in a [`RegistrySnapshot`].
#[derive(Debug, Clone, Serialize)]
pub struct TimerSample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub histogram: HistogramSnapshot,
}

/// Every series of an [`InMemoryRegistry`] at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub counters: Vec<CounterSample>,
    pub timers: Vec<TimerSample>,
}

impl RegistrySnapshot {
    /// Format as a human-readable report.
    pub fn format_report(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Call Metrics ===\n\n");

        if !self.timers.is_empty() {
            report.push_str("Timers:\n");
            for timer in &self.timers {
                let h = &timer.histogram;
                report.push_str(&format!(
                    "  {}{}: {} calls, mean {:.2?}, p50 {:.2?}, p95 {:.2?}, p99 {:.2?}, max {:.2?}\n",
                    timer.name,
                    format_labels(&timer.labels),
                    h.count,
                    h.mean(),
                    h.p50(),
                    h.p95(),
                    h.p99(),
                    h.max
                ));
            }
            report.push('\n');
        }

        if !self.counters.is_empty() {
            report.push_str("Counters:\n");
            for counter in &self.counters {
                report.push_str(&format!(
                    "  {}{}: {}\n",
                    counter.name,
                    format_labels(&counter.labels),
                    counter.value
                ));
            }
        }

        report
    }
}

fn format_labels(labels: &[(String, String)]) -> String {
    let inner: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{{{}}}", inner.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MetricKind;

    const KEYS: &[&str] = &["class", "method"];

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn nanos(d: Duration) -> u64 {
        d.as_nanos() as u64
    }

    fn labels(method: &str) -> Labels {
        Labels::new().with("class", "OwnerRepository").with("method", method)
    }

    #[test]
    fn test_counter_register_or_fetch_shares_series() {
        let registry = InMemoryRegistry::new();
        let descriptor = MetricDescriptor::new("repository.calls", MetricKind::Counter, KEYS, "");

        let a = registry.register_or_fetch_counter(&descriptor, &labels("findById")).unwrap();
        let b = registry.register_or_fetch_counter(&descriptor, &labels("findById")).unwrap();
        a.increment();
        b.increment();

        assert_eq!(
            registry.counter_value("repository.calls", &[("class", "OwnerRepository"), ("method", "findById")]),
            Some(2)
        );
        assert_eq!(registry.series_count(), 1);
    }

    #[test]
    fn test_capacity_exceeded() {
        let registry = InMemoryRegistry::with_capacity(1);
        let descriptor = MetricDescriptor::new("repository.calls", MetricKind::Counter, KEYS, "");

        registry.register_or_fetch_counter(&descriptor, &labels("findById")).unwrap();
        let err = registry
            .register_or_fetch_counter(&descriptor, &labels("save"))
            .err()
            .unwrap();
        assert_eq!(
            err,
            RegistryError::CapacityExceeded {
                name: "repository.calls".into(),
                limit: 1
            }
        );
        // Existing series are still served.
        assert!(registry.register_or_fetch_counter(&descriptor, &labels("findById")).is_ok());
        assert_eq!(registry.series_count(), 1);
    }

    #[test]
    fn test_histogram_buckets_are_upper_inclusive() {
        let histogram = AtomicHistogram::new(&[ms(10), ms(50), ms(100)]);
        histogram.record(nanos(ms(10)));
        histogram.record(nanos(ms(11)));
        histogram.record(nanos(ms(50)));
        histogram.record(nanos(ms(500)));

        let snapshot = histogram.snapshot();
        let counts: Vec<u64> = snapshot.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 2, 0, 1]);
        assert_eq!(snapshot.count, 4);
        assert_eq!(snapshot.sum, ms(571));
        assert_eq!(snapshot.max, ms(500));
        assert_eq!(snapshot.buckets[3].upper_bound, None);
    }

    #[test]
    fn test_percentiles_interpolate() {
        let histogram = AtomicHistogram::new(&[ms(10), ms(100), ms(1000)]);
        for _ in 0..100 {
            histogram.record(nanos(ms(60)));
        }
        let snapshot = histogram.snapshot();

        // All samples live in (10ms, 100ms]; the median lands mid-bucket.
        assert_eq!(snapshot.p50(), ms(55));
        // Estimates never exceed the largest observed sample.
        assert_eq!(snapshot.p95(), ms(60));
        assert!(snapshot.p99() > ms(10));
    }

    #[test]
    fn test_percentile_overflow_uses_max() {
        let histogram = AtomicHistogram::new(&[ms(1), ms(10)]);
        histogram.record(nanos(Duration::from_secs(3)));
        assert_eq!(histogram.snapshot().p99(), Duration::from_secs(3));
    }

    #[test]
    fn test_empty_histogram_statistics() {
        let snapshot = AtomicHistogram::new(&[ms(1)]).snapshot();
        assert_eq!(snapshot.p50(), Duration::ZERO);
        assert_eq!(snapshot.mean(), Duration::ZERO);
    }

    #[test]
    fn test_snapshot_and_report() {
        let registry = InMemoryRegistry::new();
        let timer = MetricDescriptor::new("repository.execution", MetricKind::Timer, KEYS, "");
        let counter = MetricDescriptor::new("repository.calls", MetricKind::Counter, KEYS, "");
        registry
            .register_or_fetch_timer(&timer, &labels("findById"), &[ms(10), ms(100)])
            .unwrap()
            .record(nanos(ms(20)));
        registry
            .register_or_fetch_counter(&counter, &labels("findById"))
            .unwrap()
            .increment();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.counters.len(), 1);
        assert_eq!(snapshot.timers.len(), 1);
        assert_eq!(registry.series_of("repository.execution"), 1);
        assert_eq!(registry.counter_total("repository.calls"), 1);

        let report = snapshot.format_report();
        assert!(report.contains("repository.execution{class=OwnerRepository,method=findById}: 1 calls"));
        assert!(report.contains("repository.calls{class=OwnerRepository,method=findById}: 1"));
    }
}
