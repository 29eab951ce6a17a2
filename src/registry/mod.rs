//! Metrics registry contract.
//!
//! # Data Flow
//! ```text
//! DurationRecorder / OutcomeCounter / SlowCallDetector
//!     → MetricsRegistry::register_or_fetch_{counter,timer}(descriptor, labels)
//!         → SchemaTable::admit (first use fixes kind, label keys, buckets)
//!         → per-series handle (created once, then shared)
//!     → CounterHandle::increment / TimerHandle::record
//! ```
//!
//! Implementations:
//! - memory.rs (sharded atomic store with snapshots; test fake and CLI report)
//! - facade.rs (forwards to the `metrics` crate recorder, e.g. Prometheus)
//!
//! # Design Decisions
//! - Registries are injected as `Arc<dyn MetricsRegistry>`, never global
//! - Only append-only operations: register-or-fetch, increment, record
//! - A name is bound to one schema for the life of the process

pub mod facade;
pub mod memory;

use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use facade::MetricsFacadeRegistry;
pub use memory::{HistogramSnapshot, InMemoryRegistry, RegistrySnapshot};

/// Kind of a registered metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Timer,
    Counter,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::Timer => f.write_str("timer"),
            MetricKind::Counter => f.write_str("counter"),
        }
    }
}

/// Static definition of a metric name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    name: String,
    kind: MetricKind,
    label_keys: &'static [&'static str],
    description: &'static str,
}

impl MetricDescriptor {
    pub fn new(
        name: impl Into<String>,
        kind: MetricKind,
        label_keys: &'static [&'static str],
        description: &'static str,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            label_keys,
            description,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn label_keys(&self) -> &'static [&'static str] {
        self.label_keys
    }

    pub fn description(&self) -> &'static str {
        self.description
    }
}

/// Ordered label set of one series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Labels(Vec<(&'static str, String)>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label, keeping insertion order.
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.push((key, value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().map(|(k, _)| *k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the keys equal `keys`, in the same order.
    pub fn matches_keys(&self, keys: &[&str]) -> bool {
        self.0.len() == keys.len() && self.keys().zip(keys).all(|(a, b)| a == *b)
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("}")
    }
}

/// Handle to one counter series.
pub trait CounterHandle: Send + Sync {
    fn increment(&self);
}

/// Handle to one timer series.
pub trait TimerHandle: Send + Sync {
    fn record(&self, duration_nanos: u64);
}

/// The sink every recording component writes through.
pub trait MetricsRegistry: Send + Sync {
    /// Register the counter series on first use, or return the existing one.
    fn register_or_fetch_counter(
        &self,
        descriptor: &MetricDescriptor,
        labels: &Labels,
    ) -> Result<Arc<dyn CounterHandle>, RegistryError>;

    /// Register the timer series on first use, or return the existing one.
    fn register_or_fetch_timer(
        &self,
        descriptor: &MetricDescriptor,
        labels: &Labels,
        buckets: &[Duration],
    ) -> Result<Arc<dyn TimerHandle>, RegistryError>;
}

/// Errors raised by a registry. Never surfaced to callers of wrapped code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("metric '{name}' is registered as a {registered}, not a {requested}")]
    KindMismatch {
        name: String,
        registered: MetricKind,
        requested: MetricKind,
    },

    #[error("metric '{name}' has label keys {registered:?}, got {requested:?}")]
    SchemaMismatch {
        name: String,
        registered: Vec<String>,
        requested: Vec<String>,
    },

    #[error("timer '{name}' is registered with different bucket boundaries")]
    BucketMismatch { name: String },

    #[error("cannot register a new series of '{name}': registry holds {limit} series")]
    CapacityExceeded { name: String, limit: usize },
}

#[derive(Debug, Clone)]
struct RegisteredSchema {
    kind: MetricKind,
    label_keys: &'static [&'static str],
    buckets: Option<Vec<Duration>>,
}

/// Name → schema bindings shared by the registry implementations.
#[derive(Debug, Default)]
pub(crate) struct SchemaTable {
    schemas: DashMap<String, RegisteredSchema>,
}

impl SchemaTable {
    /// Check a registration against the schema bound to its name, binding it
    /// on first use. Returns `true` when this call created the binding.
    pub(crate) fn admit(
        &self,
        descriptor: &MetricDescriptor,
        labels: &Labels,
        buckets: Option<&[Duration]>,
    ) -> Result<bool, RegistryError> {
        let name = descriptor.name();
        if !labels.matches_keys(descriptor.label_keys()) {
            return Err(RegistryError::SchemaMismatch {
                name: name.to_string(),
                registered: owned_keys(descriptor.label_keys().iter().copied()),
                requested: owned_keys(labels.keys()),
            });
        }

        // Fast path: no shard write lock once the name is bound.
        if let Some(existing) = self.schemas.get(name) {
            Self::compare(name, &existing, descriptor, buckets)?;
            return Ok(false);
        }

        let mut created = false;
        let existing = self
            .schemas
            .entry(name.to_string())
            .or_insert_with(|| {
                created = true;
                RegisteredSchema {
                    kind: descriptor.kind(),
                    label_keys: descriptor.label_keys(),
                    buckets: buckets.map(<[Duration]>::to_vec),
                }
            });
        Self::compare(name, &existing, descriptor, buckets)?;
        Ok(created)
    }

    /// Label keys bound to `name`, if registered.
    pub(crate) fn label_keys(&self, name: &str) -> Option<&'static [&'static str]> {
        self.schemas.get(name).map(|s| s.label_keys)
    }

    fn compare(
        name: &str,
        existing: &RegisteredSchema,
        descriptor: &MetricDescriptor,
        buckets: Option<&[Duration]>,
    ) -> Result<(), RegistryError> {
        if existing.kind != descriptor.kind() {
            return Err(RegistryError::KindMismatch {
                name: name.to_string(),
                registered: existing.kind,
                requested: descriptor.kind(),
            });
        }
        if existing.label_keys != descriptor.label_keys() {
            return Err(RegistryError::SchemaMismatch {
                name: name.to_string(),
                registered: owned_keys(existing.label_keys.iter().copied()),
                requested: owned_keys(descriptor.label_keys().iter().copied()),
            });
        }
        if existing.buckets.as_deref() != buckets {
            return Err(RegistryError::BucketMismatch {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

fn owned_keys<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<String> {
    keys.map(str::to_string).collect()
}

/// Key of one series: metric name plus its label values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SeriesKey {
    pub(crate) name: String,
    pub(crate) labels: Labels,
}

impl SeriesKey {
    pub(crate) fn new(descriptor: &MetricDescriptor, labels: &Labels) -> Self {
        Self {
            name: descriptor.name().to_string(),
            labels: labels.clone(),
        }
    }
}
