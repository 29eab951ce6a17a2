//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use callwatch::clock::ManualClock;
use callwatch::instrument::{CallInterceptor, InterceptorConfig};
use callwatch::registry::{
    CounterHandle, InMemoryRegistry, Labels, MetricDescriptor, MetricsRegistry, RegistryError,
    TimerHandle,
};

/// Interceptor over an in-memory registry, driven by a manual clock.
pub struct Fixture {
    pub registry: Arc<InMemoryRegistry>,
    pub clock: Arc<ManualClock>,
    pub interceptor: Arc<CallInterceptor>,
}

pub fn fixture() -> Fixture {
    fixture_with(InterceptorConfig::default())
}

pub fn fixture_with(config: InterceptorConfig) -> Fixture {
    let registry = Arc::new(InMemoryRegistry::new());
    let clock = Arc::new(ManualClock::new());
    let interceptor = Arc::new(CallInterceptor::new(registry.clone(), config).with_clock(clock.clone()));
    Fixture {
        registry,
        clock,
        interceptor,
    }
}

impl Fixture {
    /// Value of `<name>{class, method, extra}`; zero when the series does not exist.
    pub fn count(&self, name: &str, class: &str, method: &str, extra: Option<(&str, &str)>) -> u64 {
        let mut labels = vec![("class", class), ("method", method)];
        labels.extend(extra);
        self.registry.counter_value(name, &labels).unwrap_or(0)
    }
}

pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// A registry that refuses every registration.
#[derive(Default)]
pub struct FailingRegistry {
    pub attempts: AtomicU64,
}

impl FailingRegistry {
    fn refuse(&self, descriptor: &MetricDescriptor) -> RegistryError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        RegistryError::CapacityExceeded {
            name: descriptor.name().to_string(),
            limit: 0,
        }
    }
}

impl MetricsRegistry for FailingRegistry {
    fn register_or_fetch_counter(
        &self,
        descriptor: &MetricDescriptor,
        _labels: &Labels,
    ) -> Result<Arc<dyn CounterHandle>, RegistryError> {
        Err(self.refuse(descriptor))
    }

    fn register_or_fetch_timer(
        &self,
        descriptor: &MetricDescriptor,
        _labels: &Labels,
        _buckets: &[Duration],
    ) -> Result<Arc<dyn TimerHandle>, RegistryError> {
        Err(self.refuse(descriptor))
    }
}
