//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, capacity > 0)
//! - Check bucket boundaries resolve both fast and multi-second calls
//! - Detect metric-name collisions between layers, including names that only
//!   collide once exported (`.` and other separators become `_`)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: CallwatchConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::CallwatchConfig;
use crate::instrument::context::Layer;
use crate::instrument::settings::LayerMetricNames;

/// First bucket boundary must sit below this.
pub const MAX_FIRST_BUCKET: Duration = Duration::from_millis(10);

/// Last bucket boundary must reach at least this.
pub const MIN_LAST_BUCKET: Duration = Duration::from_secs(1);

/// A single semantic problem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("layers.{layer}.slow_call_threshold_ms must be greater than zero")]
    ZeroThreshold { layer: Layer },

    #[error("layers.{layer}.metric_prefix must not be empty")]
    EmptyPrefix { layer: Layer },

    #[error("layers.data_access and layers.web_endpoint share metric_prefix '{prefix}'")]
    DuplicatePrefix { prefix: String },

    #[error("metric '{web_endpoint}' of layers.web_endpoint collides with '{data_access}' of layers.data_access")]
    MetricNameCollision { data_access: String, web_endpoint: String },

    #[error("timers.buckets_ms must not be empty")]
    NoBuckets,

    #[error("timers.buckets_ms must be strictly ascending (at index {index})")]
    UnsortedBuckets { index: usize },

    #[error("timers.buckets_ms must start below {max}ms, starts at {first_ms}ms", max = MAX_FIRST_BUCKET.as_millis())]
    BucketsStartTooHigh { first_ms: u64 },

    #[error("timers.buckets_ms must reach {min}ms, ends at {last_ms}ms", min = MIN_LAST_BUCKET.as_millis())]
    BucketsEndTooLow { last_ms: u64 },

    #[error("registry.max_series must be greater than zero")]
    ZeroCapacity,

    #[error("application must not be empty")]
    EmptyApplication,

    #[error("exporter.listen_address '{address}' is not a socket address")]
    InvalidListenAddress { address: String },

    #[error("observability.log_level '{level}' is not a valid filter")]
    InvalidLogLevel { level: String },
}

/// Check a parsed configuration. Collects every problem.
pub fn validate_config(config: &CallwatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.application.trim().is_empty() {
        errors.push(ValidationError::EmptyApplication);
    }

    for layer in Layer::ALL {
        let section = config.layers.get(layer);
        if section.slow_call_threshold_ms == 0 {
            errors.push(ValidationError::ZeroThreshold { layer });
        }
        if section.metric_prefix.trim().is_empty() {
            errors.push(ValidationError::EmptyPrefix { layer });
        }
    }

    let data_prefix = config.layers.data_access.metric_prefix.trim();
    let web_prefix = config.layers.web_endpoint.metric_prefix.trim();
    if !data_prefix.is_empty() && data_prefix == web_prefix {
        errors.push(ValidationError::DuplicatePrefix {
            prefix: data_prefix.to_string(),
        });
    } else if !data_prefix.is_empty() && !web_prefix.is_empty() {
        validate_metric_names(
            &LayerMetricNames::from_prefix(data_prefix),
            &LayerMetricNames::from_prefix(web_prefix),
            &mut errors,
        );
    }

    validate_buckets(&config.timers.buckets_ms, &mut errors);

    if config.registry.max_series == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }

    if let Some(address) = &config.exporter.listen_address {
        if address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidListenAddress {
                address: address.clone(),
            });
        }
    }

    if tracing_subscriber::EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::InvalidLogLevel {
            level: config.observability.log_level.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_metric_names(data: &LayerMetricNames, web: &LayerMetricNames, errors: &mut Vec<ValidationError>) {
    for web_name in web.all() {
        let exported = exported_name(web_name);
        if let Some(data_name) = data.all().into_iter().find(|name| exported_name(name) == exported) {
            errors.push(ValidationError::MetricNameCollision {
                data_access: data_name.to_string(),
                web_endpoint: web_name.to_string(),
            });
        }
    }
}

/// Name as the Prometheus exporter writes it.
fn exported_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == ':' { c } else { '_' })
        .collect()
}

fn validate_buckets(buckets_ms: &[u64], errors: &mut Vec<ValidationError>) {
    let (Some(first), Some(last)) = (buckets_ms.first(), buckets_ms.last()) else {
        errors.push(ValidationError::NoBuckets);
        return;
    };

    if let Some(index) = buckets_ms.windows(2).position(|pair| pair[0] >= pair[1]) {
        errors.push(ValidationError::UnsortedBuckets { index: index + 1 });
    }
    if Duration::from_millis(*first) >= MAX_FIRST_BUCKET {
        errors.push(ValidationError::BucketsStartTooHigh { first_ms: *first });
    }
    if Duration::from_millis(*last) < MIN_LAST_BUCKET {
        errors.push(ValidationError::BucketsEndTooLow { last_ms: *last });
    }
}
