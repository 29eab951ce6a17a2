//! Call instrumentation core.
//!
//! # Responsibilities
//! - Wrap calls crossing the data-access and web-endpoint boundaries
//! - Turn each finished call into a duration sample, outcome counts,
//!   an error-kind count and a slow-call flag
//! - Stay invisible to the wrapped code: same return value, same error
//!
//! # Data Flow
//! ```text
//!                ┌──────────────────────┐
//!  caller ──────▶│   CallInterceptor    │──────▶ wrapped call
//!                │  (context, clock)    │◀────── Result<T, E>
//!                └─────────┬────────────┘
//!                          │ CompletedCall
//!                          ▼
//!                   labels::compose
//!                          │ CallLabels
//!        ┌─────────────────┼───────────────────┐
//!        ▼                 ▼                   ▼
//!  DurationRecorder   OutcomeCounter    SlowCallDetector
//!        └─────────────────┴───────────────────┘
//!                          ▼
//!                Arc<dyn MetricsRegistry>
//! ```
//!
//! Modules:
//! - context.rs (CallContext, Layer, Outcome)
//! - classify.rs (closed ErrorKind and ClassifyError)
//! - labels.rs (label schema and composer)
//! - recorder.rs, counter.rs, slow.rs (recording components)
//! - settings.rs (resolved thresholds, names, buckets)
//! - interceptor.rs (orchestration, in-flight guard, component handles)

pub mod classify;
pub mod context;
pub mod counter;
pub mod interceptor;
pub mod labels;
pub mod recorder;
pub mod settings;
pub mod slow;

pub use classify::{ClassifyError, ErrorKind};
pub use context::{CallContext, CompletedCall, Layer, Outcome};
pub use counter::OutcomeCounter;
pub use interceptor::{CallInterceptor, InstrumentedComponent, PendingCall};
pub use labels::{compose, CallLabels};
pub use recorder::DurationRecorder;
pub use settings::{InterceptorConfig, LayerDescriptors, LayerMap, LayerMetricNames, ThresholdConfig};
pub use slow::SlowCallDetector;
