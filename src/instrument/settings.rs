//! Resolved, read-only interceptor settings.
//!
//! Built once at startup (usually from `CallwatchConfig`) and never mutated.

use std::sync::Arc;
use std::time::Duration;

use crate::instrument::context::Layer;
use crate::instrument::labels::{CALLS_KEYS, DURATION_KEYS, ERRORS_KEYS, SLOW_CALLS_KEYS};
use crate::registry::{MetricDescriptor, MetricKind};

/// Default timer boundaries: 1ms up to 10s.
pub const DEFAULT_BUCKETS_MS: [u64; 12] = [1, 5, 10, 20, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000];

/// One value per layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMap<T> {
    pub data_access: T,
    pub web_endpoint: T,
}

impl<T> LayerMap<T> {
    pub fn get(&self, layer: Layer) -> &T {
        match layer {
            Layer::DataAccess => &self.data_access,
            Layer::WebEndpoint => &self.web_endpoint,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Layer, &T) -> U) -> LayerMap<U> {
        LayerMap {
            data_access: f(Layer::DataAccess, &self.data_access),
            web_endpoint: f(Layer::WebEndpoint, &self.web_endpoint),
        }
    }
}

/// Slow-call thresholds per layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdConfig {
    slow_call_threshold: [Duration; 2],
}

impl ThresholdConfig {
    pub fn new(data_access: Duration, web_endpoint: Duration) -> Self {
        Self {
            slow_call_threshold: [data_access, web_endpoint],
        }
    }

    pub fn slow_call_threshold(&self, layer: Layer) -> Duration {
        match layer {
            Layer::DataAccess => self.slow_call_threshold[0],
            Layer::WebEndpoint => self.slow_call_threshold[1],
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(50), Duration::from_millis(100))
    }
}

/// Metric names of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerMetricNames {
    pub execution: String,
    pub calls: String,
    pub errors: String,
    pub slow_calls: String,
}

impl LayerMetricNames {
    /// Names derived from a dotted prefix, e.g. `repository` → `repository.execution`.
    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            execution: format!("{}.execution", prefix),
            calls: format!("{}.calls", prefix),
            errors: format!("{}.errors", prefix),
            slow_calls: format!("{}.slow.calls", prefix),
        }
    }

    pub fn all(&self) -> [&str; 4] {
        [&self.execution, &self.calls, &self.errors, &self.slow_calls]
    }

    pub fn default_prefix(layer: Layer) -> &'static str {
        match layer {
            Layer::DataAccess => "repository",
            Layer::WebEndpoint => "endpoint",
        }
    }
}

/// Descriptors of the four metrics of one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptors {
    pub execution: MetricDescriptor,
    pub calls: MetricDescriptor,
    pub errors: MetricDescriptor,
    pub slow_calls: MetricDescriptor,
}

impl LayerDescriptors {
    pub fn new(names: &LayerMetricNames) -> Self {
        Self {
            execution: MetricDescriptor::new(
                names.execution.clone(),
                MetricKind::Timer,
                DURATION_KEYS,
                "Execution time of intercepted calls",
            ),
            calls: MetricDescriptor::new(
                names.calls.clone(),
                MetricKind::Counter,
                CALLS_KEYS,
                "Intercepted calls by outcome",
            ),
            errors: MetricDescriptor::new(
                names.errors.clone(),
                MetricKind::Counter,
                ERRORS_KEYS,
                "Failed intercepted calls by error kind",
            ),
            slow_calls: MetricDescriptor::new(
                names.slow_calls.clone(),
                MetricKind::Counter,
                SLOW_CALLS_KEYS,
                "Intercepted calls slower than the layer threshold",
            ),
        }
    }
}

/// Everything the interceptor needs, resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorConfig {
    pub thresholds: ThresholdConfig,
    pub names: LayerMap<LayerMetricNames>,
    /// Ascending timer boundaries.
    pub buckets: Arc<[Duration]>,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            names: LayerMap {
                data_access: LayerMetricNames::from_prefix(LayerMetricNames::default_prefix(Layer::DataAccess)),
                web_endpoint: LayerMetricNames::from_prefix(LayerMetricNames::default_prefix(Layer::WebEndpoint)),
            },
            buckets: DEFAULT_BUCKETS_MS.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }
}

impl InterceptorConfig {
    pub fn with_threshold(mut self, layer: Layer, threshold: Duration) -> Self {
        let da = self.thresholds.slow_call_threshold(Layer::DataAccess);
        let web = self.thresholds.slow_call_threshold(Layer::WebEndpoint);
        self.thresholds = match layer {
            Layer::DataAccess => ThresholdConfig::new(threshold, web),
            Layer::WebEndpoint => ThresholdConfig::new(da, threshold),
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let config = InterceptorConfig::default();
        assert_eq!(config.names.data_access.execution, "repository.execution");
        assert_eq!(config.names.data_access.slow_calls, "repository.slow.calls");
        assert_eq!(config.names.get(Layer::WebEndpoint).calls, "endpoint.calls");
        assert_eq!(config.buckets.first(), Some(&Duration::from_millis(1)));
        assert_eq!(config.buckets.last(), Some(&Duration::from_secs(10)));
    }

    #[test]
    fn test_threshold_override_keeps_other_layer() {
        let config = InterceptorConfig::default().with_threshold(Layer::DataAccess, Duration::from_millis(10));
        assert_eq!(config.thresholds.slow_call_threshold(Layer::DataAccess), Duration::from_millis(10));
        assert_eq!(config.thresholds.slow_call_threshold(Layer::WebEndpoint), Duration::from_millis(100));
    }

    #[test]
    fn test_descriptors_carry_schema() {
        let descriptors = LayerDescriptors::new(&LayerMetricNames::from_prefix("db.repository"));
        assert_eq!(descriptors.execution.name(), "db.repository.execution");
        assert_eq!(descriptors.execution.kind(), MetricKind::Timer);
        assert_eq!(descriptors.errors.label_keys(), ERRORS_KEYS);
    }
}
