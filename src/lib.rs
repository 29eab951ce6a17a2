//! Call instrumentation for layered services.
//!
//! Wraps data-access and web-endpoint calls, records their latency, outcome,
//! error kind and slow-call flag into an injected metrics registry, and hands
//! the original result back untouched.

pub mod clock;
pub mod config;
pub mod demo;
pub mod instrument;
pub mod middleware;
pub mod observability;
pub mod registry;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::CallwatchConfig;
pub use instrument::{
    CallInterceptor, ClassifyError, ErrorKind, InstrumentedComponent, InterceptorConfig, Layer, Outcome,
    PendingCall, ThresholdConfig,
};
pub use middleware::{InstrumentLayer, InstrumentService};
pub use registry::{InMemoryRegistry, MetricsFacadeRegistry, MetricsRegistry, RegistryError};
