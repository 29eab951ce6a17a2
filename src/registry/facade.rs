//! Registry backed by the `metrics` crate facade.
//!
//! # Responsibilities
//! - Translate descriptors and label sets into `metrics` keys
//! - Describe each metric once, on first registration
//! - Cache series handles so hot paths skip key construction
//!
//! # Design Decisions
//! - Handles come from whatever recorder is active when a series is first
//!   used; install the exporter before the first intercepted call
//! - Timer samples are recorded in seconds (Prometheus base unit)
//! - Bucket boundaries are the exporter's concern; they are only checked
//!   here for schema consistency

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::registry::{
    CounterHandle, Labels, MetricDescriptor, MetricKind, MetricsRegistry, RegistryError,
    SchemaTable, SeriesKey, TimerHandle,
};

/// Registry forwarding to the installed `metrics` recorder.
#[derive(Default)]
pub struct MetricsFacadeRegistry {
    schemas: SchemaTable,
    counters: DashMap<SeriesKey, Arc<FacadeCounter>>,
    timers: DashMap<SeriesKey, Arc<FacadeTimer>>,
}

impl MetricsFacadeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn describe(descriptor: &MetricDescriptor) {
        let name = descriptor.name().to_string();
        match descriptor.kind() {
            MetricKind::Counter => metrics::describe_counter!(name, descriptor.description()),
            MetricKind::Timer => {
                metrics::describe_histogram!(name, metrics::Unit::Seconds, descriptor.description())
            }
        }
    }
}

fn facade_labels(labels: &Labels) -> Vec<metrics::Label> {
    labels
        .iter()
        .map(|(key, value)| metrics::Label::new(key, value.to_string()))
        .collect()
}

impl MetricsRegistry for MetricsFacadeRegistry {
    fn register_or_fetch_counter(
        &self,
        descriptor: &MetricDescriptor,
        labels: &Labels,
    ) -> Result<Arc<dyn CounterHandle>, RegistryError> {
        if self.schemas.admit(descriptor, labels, None)? {
            Self::describe(descriptor);
        }
        let key = SeriesKey::new(descriptor, labels);
        if let Some(existing) = self.counters.get(&key) {
            return Ok(existing.clone());
        }
        let counter = self
            .counters
            .entry(key)
            .or_insert_with(|| {
                let inner = metrics::counter!(descriptor.name().to_string(), facade_labels(labels));
                Arc::new(FacadeCounter { inner })
            })
            .clone();
        Ok(counter)
    }

    fn register_or_fetch_timer(
        &self,
        descriptor: &MetricDescriptor,
        labels: &Labels,
        buckets: &[Duration],
    ) -> Result<Arc<dyn TimerHandle>, RegistryError> {
        if self.schemas.admit(descriptor, labels, Some(buckets))? {
            Self::describe(descriptor);
        }
        let key = SeriesKey::new(descriptor, labels);
        if let Some(existing) = self.timers.get(&key) {
            return Ok(existing.clone());
        }
        let timer = self
            .timers
            .entry(key)
            .or_insert_with(|| {
                let inner = metrics::histogram!(descriptor.name().to_string(), facade_labels(labels));
                Arc::new(FacadeTimer { inner })
            })
            .clone();
        Ok(timer)
    }
}

struct FacadeCounter {
    inner: metrics::Counter,
}

impl CounterHandle for FacadeCounter {
    fn increment(&self) {
        self.inner.increment(1);
    }
}

struct FacadeTimer {
    inner: metrics::Histogram,
}

impl TimerHandle for FacadeTimer {
    fn record(&self, duration_nanos: u64) {
        self.inner.record(Duration::from_nanos(duration_nanos).as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    const KEYS: &[&str] = &["class", "method", "outcome"];
    const TIMER_KEYS: &[&str] = &["class", "method"];

    #[test]
    fn test_forwards_to_installed_recorder() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let registry = MetricsFacadeRegistry::new();
        let calls = MetricDescriptor::new("repository.calls", MetricKind::Counter, KEYS, "Calls");
        let execution = MetricDescriptor::new("repository.execution", MetricKind::Timer, TIMER_KEYS, "Latency");
        let labels = Labels::new()
            .with("class", "OwnerRepository")
            .with("method", "findById");

        metrics::with_local_recorder(&recorder, || {
            let outcome = labels.clone().with("outcome", "success");
            registry.register_or_fetch_counter(&calls, &outcome).unwrap().increment();
            registry.register_or_fetch_counter(&calls, &outcome).unwrap().increment();
            registry
                .register_or_fetch_timer(&execution, &labels, &[Duration::from_millis(50)])
                .unwrap()
                .record(120_000_000);
        });

        let rendered = handle.render();
        assert!(rendered.contains("repository_calls"), "{rendered}");
        assert!(rendered.contains("outcome=\"success\""), "{rendered}");
        assert!(rendered.contains("repository_execution"), "{rendered}");
    }

    #[test]
    fn test_schema_drift_rejected_before_reaching_recorder() {
        let registry = MetricsFacadeRegistry::new();
        let calls = MetricDescriptor::new("endpoint.calls", MetricKind::Counter, KEYS, "");
        let bad = Labels::new().with("class", "OwnerController");

        let err = registry.register_or_fetch_counter(&calls, &bad).err().unwrap();
        assert!(matches!(err, RegistryError::SchemaMismatch { .. }));
    }
}
