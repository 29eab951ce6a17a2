//! Duration recording into tagged timers.

use std::sync::Arc;
use std::time::Duration;

use crate::registry::{Labels, MetricDescriptor, MetricsRegistry, RegistryError};

/// Records call durations under `(metric name, labels)`.
#[derive(Clone)]
pub struct DurationRecorder {
    registry: Arc<dyn MetricsRegistry>,
    buckets: Arc<[Duration]>,
}

impl DurationRecorder {
    /// `buckets` are the fixed, ascending histogram boundaries of every timer.
    pub fn new(registry: Arc<dyn MetricsRegistry>, buckets: Arc<[Duration]>) -> Self {
        Self { registry, buckets }
    }

    pub fn buckets(&self) -> &[Duration] {
        &self.buckets
    }

    /// Push one sample.
    pub fn record(
        &self,
        descriptor: &MetricDescriptor,
        labels: &Labels,
        duration_nanos: u64,
    ) -> Result<(), RegistryError> {
        let timer = self
            .registry
            .register_or_fetch_timer(descriptor, labels, &self.buckets)?;
        timer.record(duration_nanos);
        Ok(())
    }
}
