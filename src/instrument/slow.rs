//! Slow-call detection.
//!
//! A call is slow when its elapsed time is strictly greater than the
//! threshold of its layer. Slow calls bump `<prefix>.slow.calls` tagged with
//! the duration bucket the call landed in.

use std::sync::Arc;
use std::time::Duration;

use crate::instrument::context::Layer;
use crate::instrument::counter::OutcomeCounter;
use crate::instrument::labels::{duration_bucket, CallLabels};
use crate::instrument::settings::{LayerDescriptors, LayerMap, ThresholdConfig};
use crate::registry::RegistryError;

#[derive(Clone)]
pub struct SlowCallDetector {
    thresholds: ThresholdConfig,
    counter: OutcomeCounter,
    descriptors: Arc<LayerMap<LayerDescriptors>>,
    buckets: Arc<[Duration]>,
}

impl SlowCallDetector {
    pub fn new(
        thresholds: ThresholdConfig,
        counter: OutcomeCounter,
        descriptors: Arc<LayerMap<LayerDescriptors>>,
        buckets: Arc<[Duration]>,
    ) -> Self {
        Self {
            thresholds,
            counter,
            descriptors,
            buckets,
        }
    }

    pub fn threshold(&self, layer: Layer) -> Duration {
        self.thresholds.slow_call_threshold(layer)
    }

    /// Strictly greater than the layer threshold.
    pub fn is_slow(&self, layer: Layer, elapsed: Duration) -> bool {
        elapsed > self.threshold(layer)
    }

    /// Count the call when it is slow. Returns whether it was.
    pub fn check_and_record(
        &self,
        layer: Layer,
        duration_nanos: u64,
        labels: &CallLabels,
    ) -> Result<bool, RegistryError> {
        let elapsed = Duration::from_nanos(duration_nanos);
        if !self.is_slow(layer, elapsed) {
            return Ok(false);
        }
        let bucket = duration_bucket(elapsed, &self.buckets);
        self.counter
            .increment(&self.descriptors.get(layer).slow_calls, &labels.slow_calls(&bucket))?;
        Ok(true)
    }
}
