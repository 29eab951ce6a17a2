//! Canonical label schema for intercepted calls.
//!
//! # Schema
//! ```text
//! duration   class, method
//! calls      class, method, outcome
//! errors     class, method, error_kind
//! slow calls class, method, duration_bucket
//! ```
//!
//! # Design Decisions
//! - Key sets are constants shared with the metric descriptors, so a label
//!   set and the descriptor it is recorded under can not drift apart
//! - Success and failure paths build from the same base labels
//! - `duration_bucket` values come from the configured bucket boundaries

use std::time::Duration;

use crate::instrument::context::{CompletedCall, Outcome};
use crate::registry::Labels;

pub const CLASS: &str = "class";
pub const METHOD: &str = "method";
pub const OUTCOME: &str = "outcome";
pub const ERROR_KIND: &str = "error_kind";
pub const DURATION_BUCKET: &str = "duration_bucket";

pub const DURATION_KEYS: &[&str] = &[CLASS, METHOD];
pub const CALLS_KEYS: &[&str] = &[CLASS, METHOD, OUTCOME];
pub const ERRORS_KEYS: &[&str] = &[CLASS, METHOD, ERROR_KIND];
pub const SLOW_CALLS_KEYS: &[&str] = &[CLASS, METHOD, DURATION_BUCKET];

/// Value used when a component or operation name is empty.
pub const UNKNOWN: &str = "unknown";

/// Label sets for every metric one call updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallLabels {
    base: Labels,
    outcome: Outcome,
}

/// Build the label sets of a finished call.
pub fn compose(call: &CompletedCall<'_>) -> CallLabels {
    CallLabels {
        base: Labels::new()
            .with(CLASS, non_empty(call.component()))
            .with(METHOD, non_empty(call.operation())),
        outcome: call.outcome(),
    }
}

fn non_empty(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN
    } else {
        trimmed
    }
}

impl CallLabels {
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Labels of the duration sample.
    pub fn duration(&self) -> Labels {
        self.base.clone()
    }

    /// Labels of the overall calls counter.
    pub fn calls(&self) -> Labels {
        self.base.clone().with(OUTCOME, self.outcome.label())
    }

    /// Labels of the by-kind errors counter; `None` for successful calls.
    pub fn errors(&self) -> Option<Labels> {
        self.outcome
            .error_kind()
            .map(|kind| self.base.clone().with(ERROR_KIND, kind.as_str()))
    }

    /// Labels of the slow-calls counter for the given bucket label.
    pub fn slow_calls(&self, duration_bucket: &str) -> Labels {
        self.base.clone().with(DURATION_BUCKET, duration_bucket)
    }
}

/// Label value naming the smallest bucket boundary at or above `elapsed`.
///
/// `bounds` must be ascending. Values past the last boundary map to `+Inf`.
pub fn duration_bucket(elapsed: Duration, bounds: &[Duration]) -> String {
    let idx = bounds.partition_point(|bound| *bound < elapsed);
    match bounds.get(idx) {
        Some(bound) => format_bound(*bound),
        None => "+Inf".to_string(),
    }
}

fn format_bound(bound: Duration) -> String {
    let micros = bound.as_micros();
    if micros < 1_000 {
        format!("{}us", micros)
    } else if micros < 1_000_000 {
        let ms = bound.as_secs_f64() * 1_000.0;
        format!("{}ms", trim_float(ms))
    } else {
        format!("{}s", trim_float(bound.as_secs_f64()))
    }
}

fn trim_float(value: f64) -> String {
    let rendered = format!("{:.3}", value);
    rendered.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::classify::ErrorKind;
    use crate::instrument::context::{CallContext, Layer};

    fn finished(outcome: Outcome) -> CallLabels {
        let ctx = CallContext::start("OwnerRepository", "findById", Layer::DataAccess, Duration::ZERO);
        compose(&ctx.complete(outcome, Duration::from_millis(5)))
    }

    #[test]
    fn test_keys_match_descriptor_constants() {
        let ok = finished(Outcome::Success);
        let failed = finished(Outcome::Error(ErrorKind::NotFound));

        for labels in [&ok, &failed] {
            assert!(labels.duration().matches_keys(DURATION_KEYS));
            assert!(labels.calls().matches_keys(CALLS_KEYS));
            assert!(labels.slow_calls("50ms").matches_keys(SLOW_CALLS_KEYS));
        }
        assert_eq!(ok.errors(), None);
        assert!(failed.errors().unwrap().matches_keys(ERRORS_KEYS));
    }

    #[test]
    fn test_values() {
        let failed = finished(Outcome::Error(ErrorKind::NotFound));
        assert_eq!(failed.calls().get(OUTCOME), Some("error"));
        assert_eq!(failed.errors().unwrap().get(ERROR_KIND), Some("not-found"));
        assert_eq!(failed.duration().to_string(), "{class=OwnerRepository,method=findById}");
        assert_eq!(finished(Outcome::Success).calls().get(OUTCOME), Some("success"));
    }

    #[test]
    fn test_empty_names_become_unknown() {
        let ctx = CallContext::start("", "  ", Layer::WebEndpoint, Duration::ZERO);
        let labels = compose(&ctx.complete(Outcome::Success, Duration::ZERO));
        assert_eq!(labels.duration().get(CLASS), Some(UNKNOWN));
        assert_eq!(labels.duration().get(METHOD), Some(UNKNOWN));
    }

    #[test]
    fn test_duration_bucket_labels() {
        let bounds = [
            Duration::from_micros(500),
            Duration::from_millis(50),
            Duration::from_millis(250),
            Duration::from_secs(1),
            Duration::from_millis(2500),
        ];
        let ms = Duration::from_millis;
        assert_eq!(duration_bucket(Duration::from_micros(10), &bounds), "500us");
        assert_eq!(duration_bucket(ms(50), &bounds), "50ms");
        assert_eq!(duration_bucket(ms(120), &bounds), "250ms");
        assert_eq!(duration_bucket(ms(900), &bounds), "1s");
        assert_eq!(duration_bucket(ms(2000), &bounds), "2.5s");
        assert_eq!(duration_bucket(ms(9000), &bounds), "+Inf");
    }
}
