//! Pet-clinic style workload used by `callwatch simulate`.
//!
//! # Data Flow
//! ```text
//! run_simulation (N workers)
//!     → OwnerController (web_endpoint, InstrumentedComponent)
//!         → InstrumentedOwners (data_access, InstrumentedComponent)
//!             → OwnerStore (random latency, occasional failures)
//! ```
//!
//! Both tiers are wrapped by explicit decorators holding an
//! [`InstrumentedComponent`]; nothing is matched by name at runtime.

use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::instrument::{CallInterceptor, ClassifyError, ErrorKind, InstrumentedComponent, Layer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Owner {
    pub id: u32,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    #[error("owner {0} not found")]
    NotFound(u32),

    #[error("invalid owner: {0}")]
    Invalid(&'static str),

    #[error("owner storage unavailable")]
    Unavailable,
}

impl ClassifyError for RepositoryError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            RepositoryError::NotFound(_) => ErrorKind::NotFound,
            RepositoryError::Invalid(_) => ErrorKind::Validation,
            RepositoryError::Unavailable => ErrorKind::Persistence,
        }
    }
}

/// Latency model of the fake store.
#[derive(Debug, Clone, Copy)]
pub struct LatencyProfile {
    /// Typical latency range in milliseconds.
    pub typical_ms: (u64, u64),
    /// Share of calls that take `slow_ms` instead.
    pub slow_ratio: f64,
    pub slow_ms: (u64, u64),
    /// Share of calls failing with a storage error.
    pub failure_ratio: f64,
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            typical_ms: (1, 15),
            slow_ratio: 0.05,
            slow_ms: (60, 180),
            failure_ratio: 0.01,
        }
    }
}

impl LatencyProfile {
    /// Instant store, for tests.
    pub fn instant() -> Self {
        Self {
            typical_ms: (0, 0),
            slow_ratio: 0.0,
            slow_ms: (0, 0),
            failure_ratio: 0.0,
        }
    }

    fn draw(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let (low, high) = if rng.gen_bool(self.slow_ratio.clamp(0.0, 1.0)) {
            self.slow_ms
        } else {
            self.typical_ms
        };
        let fail = rng.gen_bool(self.failure_ratio.clamp(0.0, 1.0));
        (Duration::from_millis(rng.gen_range(low..=high.max(low))), fail)
    }
}

/// In-memory owner table.
#[derive(Debug)]
pub struct OwnerStore {
    owners: DashMap<u32, Owner>,
    next_id: AtomicU32,
    latency: LatencyProfile,
}

impl OwnerStore {
    pub fn new(latency: LatencyProfile) -> Self {
        Self {
            owners: DashMap::new(),
            next_id: AtomicU32::new(1),
            latency,
        }
    }

    /// Store seeded with `count` owners (ids `1..=count`).
    pub fn seeded(count: u32, latency: LatencyProfile) -> Self {
        let store = Self::new(latency);
        for i in 0..count {
            let id = store.next_id.fetch_add(1, Ordering::Relaxed);
            store.owners.insert(
                id,
                Owner {
                    id,
                    first_name: format!("Owner{}", i),
                    last_name: LAST_NAMES[i as usize % LAST_NAMES.len()].to_string(),
                    city: "Madison".to_string(),
                },
            );
        }
        store
    }

    async fn latency(&self) -> Result<(), RepositoryError> {
        let (delay, fail) = self.latency.draw();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(RepositoryError::Unavailable);
        }
        Ok(())
    }

    pub async fn find_by_id(&self, id: u32) -> Result<Owner, RepositoryError> {
        self.latency().await?;
        self.owners
            .get(&id)
            .map(|owner| owner.clone())
            .ok_or(RepositoryError::NotFound(id))
    }

    pub async fn find_by_last_name(&self, last_name: &str) -> Result<Vec<Owner>, RepositoryError> {
        self.latency().await?;
        let mut found: Vec<Owner> = self
            .owners
            .iter()
            .filter(|owner| owner.last_name.starts_with(last_name))
            .map(|owner| owner.clone())
            .collect();
        found.sort_by_key(|owner| owner.id);
        Ok(found)
    }

    pub async fn save(&self, mut owner: Owner) -> Result<u32, RepositoryError> {
        if owner.last_name.trim().is_empty() {
            return Err(RepositoryError::Invalid("last name is required"));
        }
        self.latency().await?;
        owner.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = owner.id;
        self.owners.insert(id, owner);
        Ok(id)
    }
}

const LAST_NAMES: [&str; 6] = ["Franklin", "Davis", "Rodriquez", "Black", "Escobito", "Schroeder"];

/// Data-access decorator.
#[derive(Clone)]
pub struct InstrumentedOwners {
    inner: Arc<OwnerStore>,
    calls: InstrumentedComponent,
}

impl InstrumentedOwners {
    pub fn new(inner: Arc<OwnerStore>, interceptor: &Arc<CallInterceptor>) -> Self {
        Self {
            inner,
            calls: interceptor.component("OwnerRepository", Layer::DataAccess),
        }
    }

    pub async fn find_by_id(&self, id: u32) -> Result<Owner, RepositoryError> {
        self.calls.call_async("findById", || self.inner.find_by_id(id)).await
    }

    pub async fn find_by_last_name(&self, last_name: &str) -> Result<Vec<Owner>, RepositoryError> {
        self.calls
            .call_async("findByLastName", || self.inner.find_by_last_name(last_name))
            .await
    }

    pub async fn save(&self, owner: Owner) -> Result<u32, RepositoryError> {
        self.calls.call_async("save", || self.inner.save(owner)).await
    }
}

/// Web-endpoint decorator over the owner repository.
#[derive(Clone)]
pub struct OwnerController {
    owners: InstrumentedOwners,
    calls: InstrumentedComponent,
}

impl OwnerController {
    pub fn new(owners: InstrumentedOwners, interceptor: &Arc<CallInterceptor>) -> Self {
        Self {
            owners,
            calls: interceptor.component("OwnerController", Layer::WebEndpoint),
        }
    }

    pub async fn show_owner(&self, id: u32) -> Result<Owner, RepositoryError> {
        self.calls.call_async("showOwner", || self.owners.find_by_id(id)).await
    }

    pub async fn find_owners(&self, last_name: &str) -> Result<Vec<Owner>, RepositoryError> {
        self.calls
            .call_async("processFindForm", || self.owners.find_by_last_name(last_name))
            .await
    }

    pub async fn create_owner(&self, owner: Owner) -> Result<u32, RepositoryError> {
        self.calls
            .call_async("processCreationForm", || self.owners.save(owner))
            .await
    }
}

/// Result of a simulation run.
#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SimulationSummary {
    pub requests: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Fire `calls` random requests at `controller` from `concurrency` workers.
pub async fn run_simulation(controller: OwnerController, calls: usize, concurrency: usize) -> SimulationSummary {
    let next = Arc::new(AtomicUsize::new(0));
    let succeeded = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));

    let mut workers = Vec::with_capacity(concurrency.max(1));
    for _ in 0..concurrency.max(1) {
        let controller = controller.clone();
        let next = next.clone();
        let succeeded = succeeded.clone();
        let failed = failed.clone();
        workers.push(tokio::spawn(async move {
            while next.fetch_add(1, Ordering::Relaxed) < calls {
                let ok = match Request::draw() {
                    Request::Show(id) => controller.show_owner(id).await.is_ok(),
                    Request::Find(name) => controller.find_owners(name).await.is_ok(),
                    Request::Create(owner) => controller.create_owner(owner).await.is_ok(),
                };
                let tally = if ok { &succeeded } else { &failed };
                tally.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for worker in workers {
        if let Err(error) = worker.await {
            tracing::error!(error = %error, "Simulation worker failed");
        }
    }

    let summary = SimulationSummary {
        requests: succeeded.load(Ordering::Relaxed) + failed.load(Ordering::Relaxed),
        succeeded: succeeded.load(Ordering::Relaxed),
        failed: failed.load(Ordering::Relaxed),
    };
    tracing::info!(
        requests = summary.requests,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Simulation finished"
    );
    summary
}

enum Request {
    Show(u32),
    Find(&'static str),
    Create(Owner),
}

impl Request {
    fn draw() -> Self {
        let mut rng = rand::thread_rng();
        match rng.gen_range(0..100) {
            0..=59 => Request::Show(rng.gen_range(1..=12)),
            60..=84 => Request::Find(LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())]),
            roll => Request::Create(Owner {
                id: 0,
                first_name: "George".to_string(),
                last_name: if roll >= 97 { String::new() } else { "Franklin".to_string() },
                city: "Madison".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InterceptorConfig;
    use crate::registry::InMemoryRegistry;

    fn controller(registry: Arc<InMemoryRegistry>) -> OwnerController {
        let interceptor = Arc::new(CallInterceptor::new(registry, InterceptorConfig::default()));
        let store = Arc::new(OwnerStore::seeded(10, LatencyProfile::instant()));
        OwnerController::new(InstrumentedOwners::new(store, &interceptor), &interceptor)
    }

    #[tokio::test]
    async fn test_not_found_counted_in_both_tiers() {
        let registry = Arc::new(InMemoryRegistry::new());
        let controller = controller(registry.clone());

        assert_eq!(controller.show_owner(99).await, Err(RepositoryError::NotFound(99)));
        assert_eq!(controller.show_owner(3).await.map(|o| o.id), Ok(3));

        assert_eq!(
            registry.counter_value(
                "repository.errors",
                &[("class", "OwnerRepository"), ("method", "findById"), ("error_kind", "not-found")]
            ),
            Some(1)
        );
        assert_eq!(
            registry.counter_value(
                "endpoint.errors",
                &[("class", "OwnerController"), ("method", "showOwner"), ("error_kind", "not-found")]
            ),
            Some(1)
        );
        assert_eq!(registry.counter_total("endpoint.calls"), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_classified() {
        let registry = Arc::new(InMemoryRegistry::new());
        let controller = controller(registry.clone());
        let owner = Owner {
            id: 0,
            first_name: "Jean".to_string(),
            last_name: " ".to_string(),
            city: "Monona".to_string(),
        };

        assert!(matches!(controller.create_owner(owner).await, Err(RepositoryError::Invalid(_))));
        assert_eq!(
            registry.counter_value(
                "repository.errors",
                &[("class", "OwnerRepository"), ("method", "save"), ("error_kind", "validation")]
            ),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_simulation_accounts_every_request() {
        let registry = Arc::new(InMemoryRegistry::new());
        let summary = run_simulation(controller(registry.clone()), 200, 8).await;

        assert_eq!(summary.requests, 200);
        assert_eq!(summary.succeeded + summary.failed, 200);
        assert_eq!(registry.counter_total("endpoint.calls"), 200);
        let endpoint_errors = registry.counter_total("endpoint.errors");
        assert_eq!(endpoint_errors, summary.failed);
    }
}
