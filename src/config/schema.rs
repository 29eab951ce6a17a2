//! Configuration schema definitions.
//!
//! Every section derives Serde traits and is defaulted, so an empty file is
//! a valid configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::instrument::context::Layer;
use crate::instrument::settings::{
    InterceptorConfig, LayerMap, LayerMetricNames, ThresholdConfig, DEFAULT_BUCKETS_MS,
};
use crate::registry::memory::DEFAULT_MAX_SERIES;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CallwatchConfig {
    /// Common tag applied to every exported metric (`application=<name>`).
    pub application: String,

    /// In-memory registry limits.
    pub registry: RegistryConfig,

    /// Timer bucket boundaries.
    pub timers: TimerConfig,

    /// Per-layer metric naming and thresholds.
    pub layers: LayersConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Prometheus exporter settings.
    pub exporter: ExporterConfig,
}

impl Default for CallwatchConfig {
    fn default() -> Self {
        Self {
            application: "petclinic".to_string(),
            registry: RegistryConfig::default(),
            timers: TimerConfig::default(),
            layers: LayersConfig::default(),
            observability: ObservabilityConfig::default(),
            exporter: ExporterConfig::default(),
        }
    }
}

impl CallwatchConfig {
    /// Resolve into the immutable settings the interceptor runs with.
    ///
    /// Expects a validated configuration.
    pub fn to_interceptor_config(&self) -> InterceptorConfig {
        let layers = LayerMap {
            data_access: self.layers.data_access.clone(),
            web_endpoint: self.layers.web_endpoint.clone(),
        };
        InterceptorConfig {
            thresholds: ThresholdConfig::new(
                layers.data_access.slow_call_threshold(),
                layers.web_endpoint.slow_call_threshold(),
            ),
            names: layers.map(|_, layer| LayerMetricNames::from_prefix(&layer.metric_prefix)),
            buckets: self.timers.buckets().into(),
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of distinct series held in memory.
    pub max_series: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_series: DEFAULT_MAX_SERIES,
        }
    }
}

/// Timer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Ascending bucket boundaries in milliseconds.
    pub buckets_ms: Vec<u64>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            buckets_ms: DEFAULT_BUCKETS_MS.to_vec(),
        }
    }
}

impl TimerConfig {
    pub fn buckets(&self) -> Vec<Duration> {
        self.buckets_ms.iter().map(|ms| Duration::from_millis(*ms)).collect()
    }
}

/// Both layers. Fields missing from a layer section take that layer's defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(from = "LayersFile")]
pub struct LayersConfig {
    pub data_access: LayerConfig,
    pub web_endpoint: LayerConfig,
}

impl Default for LayersConfig {
    fn default() -> Self {
        Self {
            data_access: LayerConfig::defaults_for(Layer::DataAccess),
            web_endpoint: LayerConfig::defaults_for(Layer::WebEndpoint),
        }
    }
}

impl LayersConfig {
    pub fn get(&self, layer: Layer) -> &LayerConfig {
        match layer {
            Layer::DataAccess => &self.data_access,
            Layer::WebEndpoint => &self.web_endpoint,
        }
    }
}

/// As written in the file, before layer defaults are applied.
#[derive(Default, Deserialize)]
#[serde(default)]
struct LayersFile {
    data_access: PartialLayerConfig,
    web_endpoint: PartialLayerConfig,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct PartialLayerConfig {
    metric_prefix: Option<String>,
    slow_call_threshold_ms: Option<u64>,
}

impl PartialLayerConfig {
    fn resolve(self, layer: Layer) -> LayerConfig {
        let defaults = LayerConfig::defaults_for(layer);
        LayerConfig {
            metric_prefix: self.metric_prefix.unwrap_or(defaults.metric_prefix),
            slow_call_threshold_ms: self.slow_call_threshold_ms.unwrap_or(defaults.slow_call_threshold_ms),
        }
    }
}

impl From<LayersFile> for LayersConfig {
    fn from(file: LayersFile) -> Self {
        Self {
            data_access: file.data_access.resolve(Layer::DataAccess),
            web_endpoint: file.web_endpoint.resolve(Layer::WebEndpoint),
        }
    }
}

/// One layer.
#[derive(Debug, Clone, Serialize)]
pub struct LayerConfig {
    /// Dotted prefix of the layer's metric names (e.g. "repository").
    pub metric_prefix: String,

    /// Calls strictly slower than this are counted as slow.
    pub slow_call_threshold_ms: u64,
}

impl LayerConfig {
    pub fn defaults_for(layer: Layer) -> Self {
        let threshold = ThresholdConfig::default().slow_call_threshold(layer);
        Self {
            metric_prefix: LayerMetricNames::default_prefix(layer).to_string(),
            slow_call_threshold_ms: u64::try_from(threshold.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn slow_call_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_call_threshold_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Install the Prometheus recorder.
    pub enabled: bool,

    /// Scrape endpoint bind address. No HTTP listener when unset.
    pub listen_address: Option<String>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_address: Some("0.0.0.0:9090".to_string()),
        }
    }
}
