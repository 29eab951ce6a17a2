//! Prometheus exposition.
//!
//! # Responsibilities
//! - Install the `metrics-exporter-prometheus` recorder behind the `metrics` facade
//! - Apply the process-wide common tag (`application`)
//! - Give every timer the configured bucket boundaries
//! - Optionally serve a scrape endpoint
//!
//! # Metrics
//! - `<prefix>_execution` (histogram, seconds): per class/method latency
//! - `<prefix>_calls` (counter): by outcome
//! - `<prefix>_errors` (counter): by error kind
//! - `<prefix>_slow_calls` (counter): by duration bucket
//!
//! # Design Decisions
//! - Installed once, before the first intercepted call
//! - Histograms not covered by the bucket list fall back to p50/p95/p99 summaries

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::config::schema::CallwatchConfig;
use crate::instrument::context::Layer;

/// Quantiles published for histograms without explicit buckets.
pub const QUANTILES: [f64; 3] = [0.5, 0.95, 0.99];

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("failed to build Prometheus recorder: {0}")]
    Build(#[from] BuildError),

    #[error("invalid listen address '{0}'")]
    ListenAddress(String),

    #[error("a global metrics recorder is already installed")]
    AlreadyInstalled,

    #[error("the Prometheus exporter is disabled (exporter.enabled = false)")]
    Disabled,
}

/// Builder carrying the common tag, timer buckets and quantiles.
pub fn prometheus_builder(config: &CallwatchConfig) -> Result<PrometheusBuilder, ExporterError> {
    let interceptor = config.to_interceptor_config();
    let buckets = bucket_seconds(&interceptor.buckets);

    let mut builder = PrometheusBuilder::new()
        .add_global_label("application", config.application.clone())
        .set_quantiles(&QUANTILES)?;
    for layer in Layer::ALL {
        let name = &interceptor.names.get(layer).execution;
        // The exporter matches on the sanitized name at render time.
        builder = builder
            .set_buckets_for_metric(Matcher::Full(name.clone()), &buckets)?
            .set_buckets_for_metric(Matcher::Full(name.replace('.', "_")), &buckets)?;
    }
    Ok(builder)
}

/// Install the recorder globally and return a handle for rendering.
///
/// With a listen address configured, the scrape endpoint is spawned on the
/// current Tokio runtime. Nothing is installed or bound when the exporter is
/// disabled.
pub fn install_prometheus(config: &CallwatchConfig) -> Result<PrometheusHandle, ExporterError> {
    if !config.exporter.enabled {
        return Err(ExporterError::Disabled);
    }
    let builder = prometheus_builder(config)?;

    let Some(address) = config.exporter.listen_address.as_deref() else {
        return Ok(builder.install_recorder()?);
    };
    let address: SocketAddr = address
        .parse()
        .map_err(|_| ExporterError::ListenAddress(address.to_string()))?;

    let (recorder, exporter) = builder.with_http_listener(address).build()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| ExporterError::AlreadyInstalled)?;

    tokio::spawn(async move {
        if let Err(error) = exporter.await {
            tracing::error!(error = ?error, "Prometheus exporter stopped");
        }
    });
    tracing::info!(address = %address, "Prometheus scrape endpoint listening");
    Ok(handle)
}

fn bucket_seconds(buckets: &[Duration]) -> Vec<f64> {
    buckets.iter().map(Duration::as_secs_f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{CallInterceptor, ErrorKind};
    use crate::registry::MetricsFacadeRegistry;
    use std::sync::Arc;

    #[test]
    fn test_builder_applies_buckets_and_common_tag() {
        let mut config = CallwatchConfig::default();
        config.exporter.listen_address = None;
        let recorder = prometheus_builder(&config).unwrap().build_recorder();
        let handle = recorder.handle();

        let interceptor = CallInterceptor::new(
            Arc::new(MetricsFacadeRegistry::new()),
            config.to_interceptor_config(),
        );
        metrics::with_local_recorder(&recorder, || {
            interceptor
                .intercept("OwnerRepository", "findById", Layer::DataAccess, || Ok::<_, ErrorKind>(()))
                .unwrap();
        });

        let rendered = handle.render();
        assert!(rendered.contains("application=\"petclinic\""), "{rendered}");
        assert!(rendered.contains("repository_execution_bucket"), "{rendered}");
        assert!(rendered.contains("le=\"0.05\""), "{rendered}");
        assert!(rendered.contains("class=\"OwnerRepository\""), "{rendered}");
    }

    #[test]
    fn test_disabled_exporter_installs_nothing() {
        let mut config = CallwatchConfig::default();
        config.exporter.enabled = false;

        assert!(matches!(install_prometheus(&config), Err(ExporterError::Disabled)));
    }

    #[test]
    fn test_bucket_seconds() {
        assert_eq!(
            bucket_seconds(&[Duration::from_millis(5), Duration::from_millis(2500)]),
            vec![0.005, 2.5]
        );
    }
}
