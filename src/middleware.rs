//! Tower middleware for the web-endpoint tier.
//!
//! # Responsibilities
//! - Intercept every request a wrapped `tower::Service` handles
//! - Name the operation from the request via a caller-supplied function
//!   (a handler name or route template; raw paths make unbounded label sets)
//! - Pass responses and errors through unchanged
//!
//! # Composition
//! ```text
//! ServiceBuilder::new()
//!     .layer(InstrumentLayer::new(interceptor, "OwnerController", |req: &Req| req.handler().to_string()))
//!     .service(handler)
//! ```
//!
//! # Design Decisions
//! - Calls are recorded at `Layer::WebEndpoint`
//! - Timing starts in `call`, before the inner service is invoked
//! - Dropping the response future, polled or not, records a cancelled call

use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::instrument::context::Layer as CallLayer;
use crate::instrument::{CallInterceptor, ClassifyError};

/// Wraps services in [`InstrumentService`].
#[derive(Clone)]
pub struct InstrumentLayer<F> {
    interceptor: Arc<CallInterceptor>,
    component: Arc<str>,
    operation: F,
}

impl<F> InstrumentLayer<F> {
    pub fn new(interceptor: Arc<CallInterceptor>, component: impl Into<Arc<str>>, operation: F) -> Self {
        Self {
            interceptor,
            component: component.into(),
            operation,
        }
    }
}

impl<S, F: Clone> Layer<S> for InstrumentLayer<F> {
    type Service = InstrumentService<S, F>;

    fn layer(&self, inner: S) -> Self::Service {
        InstrumentService {
            inner,
            interceptor: self.interceptor.clone(),
            component: self.component.clone(),
            operation: self.operation.clone(),
        }
    }
}

/// A service whose calls go through a [`CallInterceptor`].
#[derive(Clone)]
pub struct InstrumentService<S, F> {
    inner: S,
    interceptor: Arc<CallInterceptor>,
    component: Arc<str>,
    operation: F,
}

impl<S, F, Req> Service<Req> for InstrumentService<S, F>
where
    S: Service<Req>,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: ClassifyError + Send + 'static,
    F: Fn(&Req) -> String,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Req) -> Self::Future {
        let operation = (self.operation)(&request);
        let pending = self
            .interceptor
            .start_call(self.component.clone(), operation, CallLayer::WebEndpoint);
        let response = self.inner.call(request);

        Box::pin(async move {
            let result = response.await;
            pending.finish(&result);
            result
        })
    }
}
