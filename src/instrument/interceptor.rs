//! Call interceptor - wraps a call, times it, and records its metrics.
//!
//! # Responsibilities
//! - Read start and end of every call from one injected clock
//! - Invoke the wrapped call exactly once and hand back its `Result` untouched
//! - Record duration, outcome, error kind and slow-call flag, in that order
//! - Keep registry failures away from the caller
//!
//! # Data Flow
//! ```text
//! intercept(component, operation, layer, invoke)
//!     → InFlight guard (CallContext, start time)
//!     → invoke()                      ← business code
//!     → InFlight::finish(outcome)     ← or Drop: panic / cancellation
//!         → CallContext::complete → CompletedCall
//!         → labels::compose
//!         → DurationRecorder::record    (<prefix>.execution)
//!         → OutcomeCounter::increment   (<prefix>.calls, <prefix>.errors)
//!         → SlowCallDetector::check_and_record (<prefix>.slow.calls)
//!     → original Result returned
//! ```
//!
//! # Design Decisions
//! - The guard owns the context; an outcome is assigned on exactly one path
//! - A guard dropped while panicking records `unknown`, otherwise `cancelled`
//! - `start_call` hands out an owned guard for callers that cannot wrap the
//!   call in a closure (tower services split invocation from completion)
//! - Registry errors are logged and tallied, never returned
//! - No locks of its own; all synchronization lives in the registry

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::instrument::classify::{ClassifyError, ErrorKind};
use crate::instrument::context::{CallContext, CompletedCall, Layer, Outcome};
use crate::instrument::counter::OutcomeCounter;
use crate::instrument::labels::compose;
use crate::instrument::recorder::DurationRecorder;
use crate::instrument::settings::{InterceptorConfig, LayerDescriptors, LayerMap, ThresholdConfig};
use crate::instrument::slow::SlowCallDetector;
use crate::registry::{MetricsRegistry, RegistryError};

/// Orchestrates the recording components around one call.
pub struct CallInterceptor {
    clock: Arc<dyn Clock>,
    recorder: DurationRecorder,
    counter: OutcomeCounter,
    slow: SlowCallDetector,
    descriptors: Arc<LayerMap<LayerDescriptors>>,
    failures: AtomicU64,
}

impl CallInterceptor {
    pub fn new(registry: Arc<dyn MetricsRegistry>, config: InterceptorConfig) -> Self {
        let descriptors = Arc::new(config.names.map(|_, names| LayerDescriptors::new(names)));
        let counter = OutcomeCounter::new(registry.clone());
        Self {
            clock: Arc::new(MonotonicClock::new()),
            recorder: DurationRecorder::new(registry, config.buckets.clone()),
            slow: SlowCallDetector::new(
                config.thresholds,
                counter.clone(),
                descriptors.clone(),
                config.buckets,
            ),
            counter,
            descriptors,
            failures: AtomicU64::new(0),
        }
    }

    /// Replace the clock. Tests pass a shared `ManualClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn thresholds(&self) -> ThresholdConfig {
        let da = self.slow.threshold(Layer::DataAccess);
        let web = self.slow.threshold(Layer::WebEndpoint);
        ThresholdConfig::new(da, web)
    }

    pub fn descriptors(&self, layer: Layer) -> &LayerDescriptors {
        self.descriptors.get(layer)
    }

    /// Registry failures swallowed so far.
    pub fn instrumentation_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Run `invoke` once and record it. The returned value is exactly what
    /// `invoke` returned.
    pub fn intercept<T, E, F>(&self, component: &str, operation: &str, layer: Layer, invoke: F) -> Result<T, E>
    where
        E: ClassifyError,
        F: FnOnce() -> Result<T, E>,
    {
        let in_flight = self.begin(component, operation, layer);
        let result = invoke();
        in_flight.finish(outcome_of(&result));
        result
    }

    /// Async variant of [`intercept`](Self::intercept).
    ///
    /// Dropping the returned future before it completes records the call as
    /// `cancelled`.
    pub async fn intercept_async<T, E, F, Fut>(
        &self,
        component: &str,
        operation: &str,
        layer: Layer,
        invoke: F,
    ) -> Result<T, E>
    where
        E: ClassifyError,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let in_flight = self.begin(component, operation, layer);
        let result = invoke().await;
        in_flight.finish(outcome_of(&result));
        result
    }

    /// Handle bound to one component, for decorators.
    pub fn component(self: &Arc<Self>, name: impl Into<Arc<str>>, layer: Layer) -> InstrumentedComponent {
        InstrumentedComponent {
            interceptor: self.clone(),
            name: name.into(),
            layer,
        }
    }

    /// Open a call whose start time is taken now and whose outcome is
    /// reported later through [`PendingCall::finish`].
    ///
    /// Dropping the handle unfinished records `cancelled` (or `unknown`
    /// while panicking), like an abandoned [`intercept_async`](Self::intercept_async).
    pub fn start_call(
        self: &Arc<Self>,
        component: impl Into<Arc<str>>,
        operation: impl Into<String>,
        layer: Layer,
    ) -> PendingCall {
        PendingCall {
            interceptor: self.clone(),
            component: component.into(),
            operation: operation.into(),
            layer,
            started_at: self.clock.now(),
            finished: false,
        }
    }

    fn begin<'a>(&'a self, component: &'a str, operation: &'a str, layer: Layer) -> InFlight<'a> {
        InFlight {
            interceptor: self,
            context: Some(CallContext::start(component, operation, layer, self.clock.now())),
        }
    }

    fn complete(&self, context: CallContext<'_>, outcome: Outcome) {
        let call = context.complete(outcome, self.clock.now());
        let labels = compose(&call);
        let layer = call.layer();
        let descriptors = self.descriptors.get(layer);
        let nanos = call.elapsed_nanos();

        self.isolate(&call, self.recorder.record(&descriptors.execution, &labels.duration(), nanos));
        self.isolate(&call, self.counter.increment(&descriptors.calls, &labels.calls()));
        if let Some(error_labels) = labels.errors() {
            self.isolate(&call, self.counter.increment(&descriptors.errors, &error_labels));
        }
        let slow = match self.slow.check_and_record(layer, nanos, &labels) {
            Ok(slow) => slow,
            Err(error) => {
                self.isolate(&call, Err(error));
                false
            }
        };

        tracing::trace!(
            class = %call.component(),
            method = %call.operation(),
            layer = %layer,
            outcome = %outcome.label(),
            elapsed_us = u64::try_from(call.elapsed().as_micros()).unwrap_or(u64::MAX),
            slow,
            "call recorded"
        );
    }

    fn isolate(&self, call: &CompletedCall<'_>, result: Result<(), RegistryError>) {
        if let Err(error) = result {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                class = %call.component(),
                method = %call.operation(),
                layer = %call.layer(),
                error = %error,
                "Instrumentation failure ignored"
            );
        }
    }
}

fn outcome_of<T, E: ClassifyError>(result: &Result<T, E>) -> Outcome {
    match result {
        Ok(_) => Outcome::Success,
        Err(error) => Outcome::Error(error.error_kind()),
    }
}

/// Owns the context of a running call until it is finished or dropped.
struct InFlight<'a> {
    interceptor: &'a CallInterceptor,
    context: Option<CallContext<'a>>,
}

impl InFlight<'_> {
    fn finish(mut self, outcome: Outcome) {
        if let Some(context) = self.context.take() {
            self.interceptor.complete(context, outcome);
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.interceptor.complete(context, Outcome::Error(abandoned()));
        }
    }
}

fn abandoned() -> ErrorKind {
    if std::thread::panicking() {
        ErrorKind::Unknown
    } else {
        ErrorKind::Cancelled
    }
}

/// An owned, started call. Records exactly once: on `finish` or on drop.
#[must_use = "dropping a PendingCall records it as cancelled"]
pub struct PendingCall {
    interceptor: Arc<CallInterceptor>,
    component: Arc<str>,
    operation: String,
    layer: Layer,
    started_at: Duration,
    finished: bool,
}

impl PendingCall {
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Record the call with the outcome of `result`.
    pub fn finish<T, E: ClassifyError>(mut self, result: &Result<T, E>) {
        self.finished = true;
        self.record(outcome_of(result));
    }

    fn record(&self, outcome: Outcome) {
        let context = CallContext::start(&self.component, &self.operation, self.layer, self.started_at);
        self.interceptor.complete(context, outcome);
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.finished {
            self.record(Outcome::Error(abandoned()));
        }
    }
}

/// A component name and layer bound to a shared interceptor.
///
/// ```rust,ignore
/// struct InstrumentedOwners<R> {
///     inner: R,
///     calls: InstrumentedComponent,
/// }
///
/// impl<R: OwnerRepository> InstrumentedOwners<R> {
///     fn find_by_id(&self, id: u32) -> Result<Owner, RepositoryError> {
///         self.calls.call("findById", || self.inner.find_by_id(id))
///     }
/// }
/// ```
#[derive(Clone)]
pub struct InstrumentedComponent {
    interceptor: Arc<CallInterceptor>,
    name: Arc<str>,
    layer: Layer,
}

impl InstrumentedComponent {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn interceptor(&self) -> &Arc<CallInterceptor> {
        &self.interceptor
    }

    pub fn call<T, E, F>(&self, operation: &str, invoke: F) -> Result<T, E>
    where
        E: ClassifyError,
        F: FnOnce() -> Result<T, E>,
    {
        self.interceptor.intercept(&self.name, operation, self.layer, invoke)
    }

    pub async fn call_async<T, E, F, Fut>(&self, operation: &str, invoke: F) -> Result<T, E>
    where
        E: ClassifyError,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.interceptor
            .intercept_async(&self.name, operation, self.layer, invoke)
            .await
    }
}
