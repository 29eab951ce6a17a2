//! Outcome counters.
//!
//! Counters only ever go up; there is no reset short of a process restart.

use std::sync::Arc;

use crate::registry::{Labels, MetricDescriptor, MetricsRegistry, RegistryError};

/// Increments tagged outcome counters.
#[derive(Clone)]
pub struct OutcomeCounter {
    registry: Arc<dyn MetricsRegistry>,
}

impl OutcomeCounter {
    pub fn new(registry: Arc<dyn MetricsRegistry>) -> Self {
        Self { registry }
    }

    /// Add one to the series `(descriptor, labels)`.
    pub fn increment(&self, descriptor: &MetricDescriptor, labels: &Labels) -> Result<(), RegistryError> {
        self.registry
            .register_or_fetch_counter(descriptor, labels)?
            .increment();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::labels::{CALLS_KEYS, ERRORS_KEYS};
    use crate::registry::{InMemoryRegistry, MetricKind};

    #[test]
    fn test_outcome_and_error_counters_are_separate() {
        let registry = Arc::new(InMemoryRegistry::new());
        let counter = OutcomeCounter::new(registry.clone());
        let calls = MetricDescriptor::new("repository.calls", MetricKind::Counter, CALLS_KEYS, "");
        let errors = MetricDescriptor::new("repository.errors", MetricKind::Counter, ERRORS_KEYS, "");
        let base = Labels::new().with("class", "PetRepository").with("method", "save");

        counter.increment(&calls, &base.clone().with("outcome", "success")).unwrap();
        counter.increment(&calls, &base.clone().with("outcome", "error")).unwrap();
        counter.increment(&errors, &base.clone().with("error_kind", "validation")).unwrap();

        assert_eq!(registry.counter_total("repository.calls"), 2);
        assert_eq!(registry.series_of("repository.calls"), 2);
        assert_eq!(
            registry.counter_value(
                "repository.errors",
                &[("class", "PetRepository"), ("method", "save"), ("error_kind", "validation")]
            ),
            Some(1)
        );
    }
}
