//! Per-call state owned by one interception.
//!
//! # Lifecycle
//! ```text
//! CallContext::start (start time fixed)
//!     → wrapped call runs
//!     → CallContext::complete(outcome, end) consumes the context
//!     → CompletedCall (outcome + elapsed, read-only)
//! ```
//!
//! # Design Decisions
//! - `complete` takes `self`, so an outcome can only ever be assigned once
//! - The error kind lives inside `Outcome::Error`; a successful call cannot carry one
//! - Elapsed time saturates at zero; with a single monotonic clock it never has to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::instrument::classify::ErrorKind;

/// The tier an intercepted call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    DataAccess,
    WebEndpoint,
}

impl Layer {
    pub const ALL: [Layer; 2] = [Layer::DataAccess, Layer::WebEndpoint];

    pub fn as_str(self) -> &'static str {
        match self {
            Layer::DataAccess => "data_access",
            Layer::WebEndpoint => "web_endpoint",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Error(ErrorKind),
}

impl Outcome {
    /// Value of the `outcome` label.
    pub fn label(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error(_) => "error",
        }
    }

    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            Outcome::Success => None,
            Outcome::Error(kind) => Some(kind),
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// A call in flight.
#[derive(Debug)]
pub struct CallContext<'a> {
    component: &'a str,
    operation: &'a str,
    layer: Layer,
    started_at: Duration,
}

impl<'a> CallContext<'a> {
    /// Open a context; `started_at` is a reading of the interceptor's clock.
    pub fn start(component: &'a str, operation: &'a str, layer: Layer, started_at: Duration) -> Self {
        Self {
            component,
            operation,
            layer,
            started_at,
        }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// Close the context with its one and only outcome.
    pub fn complete(self, outcome: Outcome, ended_at: Duration) -> CompletedCall<'a> {
        CompletedCall {
            component: self.component,
            operation: self.operation,
            layer: self.layer,
            outcome,
            elapsed: ended_at.saturating_sub(self.started_at),
        }
    }
}

/// A finished call, ready to be turned into metric updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedCall<'a> {
    component: &'a str,
    operation: &'a str,
    layer: Layer,
    outcome: Outcome,
    elapsed: Duration,
}

impl<'a> CompletedCall<'a> {
    pub fn component(&self) -> &'a str {
        self.component
    }

    pub fn operation(&self) -> &'a str {
        self.operation
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.elapsed.as_nanos()).unwrap_or(u64::MAX)
    }
}
