//! Concurrency tests: no lost updates, one series per (name, labels).

use std::sync::Arc;
use std::thread;

use callwatch::instrument::labels::CALLS_KEYS;
use callwatch::instrument::{ErrorKind, Layer};
use callwatch::registry::{InMemoryRegistry, Labels, MetricDescriptor, MetricKind, MetricsRegistry};

mod common;
use common::fixture;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_ten_thousand_concurrent_increments() {
    let registry = Arc::new(InMemoryRegistry::new());
    let descriptor = Arc::new(MetricDescriptor::new("repository.calls", MetricKind::Counter, CALLS_KEYS, ""));

    let mut tasks = Vec::new();
    for _ in 0..100 {
        let registry = registry.clone();
        let descriptor = descriptor.clone();
        tasks.push(tokio::spawn(async move {
            let labels = Labels::new()
                .with("class", "OwnerRepository")
                .with("method", "findById")
                .with("outcome", "success");
            for _ in 0..100 {
                registry
                    .register_or_fetch_counter(&descriptor, &labels)
                    .unwrap()
                    .increment();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(
        registry.counter_value(
            "repository.calls",
            &[("class", "OwnerRepository"), ("method", "findById"), ("outcome", "success")]
        ),
        Some(10_000)
    );
    assert_eq!(registry.series_of("repository.calls"), 1);
    assert_eq!(registry.series_count(), 1);
}

#[test]
fn test_racing_first_use_converges() {
    let registry = Arc::new(InMemoryRegistry::new());
    let descriptor = MetricDescriptor::new("endpoint.calls", MetricKind::Counter, CALLS_KEYS, "");
    let labels = Labels::new()
        .with("class", "PetController")
        .with("method", "initCreationForm")
        .with("outcome", "success");
    let barrier = std::sync::Barrier::new(16);

    thread::scope(|scope| {
        for _ in 0..16 {
            scope.spawn(|| {
                barrier.wait();
                registry
                    .register_or_fetch_counter(&descriptor, &labels)
                    .unwrap()
                    .increment();
            });
        }
    });

    assert_eq!(registry.series_count(), 1);
    assert_eq!(registry.counter_total("endpoint.calls"), 16);
}

#[test]
fn test_intercepted_calls_across_threads() {
    let f = fixture();
    let methods = ["findById", "findByLastName", "save", "findPetTypes"];

    thread::scope(|scope| {
        for t in 0..8 {
            let f = &f;
            let methods = &methods;
            scope.spawn(move || {
                for i in 0..1_250usize {
                    let method = methods[(t + i) % methods.len()];
                    let _ = f.interceptor.intercept("OwnerRepository", method, Layer::DataAccess, || {
                        if i % 10 == 0 {
                            Err(ErrorKind::NotFound)
                        } else {
                            Ok(i)
                        }
                    });
                }
            });
        }
    });

    let snapshot = f.registry.snapshot();
    let samples: u64 = snapshot
        .timers
        .iter()
        .filter(|t| t.name == "repository.execution")
        .map(|t| t.histogram.count)
        .sum();
    assert_eq!(samples, 10_000);
    assert_eq!(f.registry.counter_total("repository.calls"), 10_000);
    assert_eq!(f.registry.counter_total("repository.errors"), 1_000);
    assert_eq!(f.registry.series_of("repository.execution"), methods.len());
    assert_eq!(f.interceptor.instrumentation_failures(), 0);
}
