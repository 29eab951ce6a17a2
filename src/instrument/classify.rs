//! Closed error classification used for labelling.
//!
//! Error types, variant names and messages never become label values; every
//! failure is folded into one of a handful of kinds so the `error_kind` label
//! stays bounded.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::io;

/// Category of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Persistence,
    Cancelled,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::Validation,
        ErrorKind::NotFound,
        ErrorKind::Persistence,
        ErrorKind::Cancelled,
        ErrorKind::Unknown,
    ];

    /// Value of the `error_kind` label.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not-found",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an error onto an [`ErrorKind`].
///
/// Implemented by the error types of instrumented components:
///
/// ```rust,ignore
/// impl ClassifyError for RepositoryError {
///     fn error_kind(&self) -> ErrorKind {
///         match self {
///             RepositoryError::Missing(_) => ErrorKind::NotFound,
///             RepositoryError::Db(_) => ErrorKind::Persistence,
///         }
///     }
/// }
/// ```
pub trait ClassifyError {
    fn error_kind(&self) -> ErrorKind;
}

impl ClassifyError for ErrorKind {
    fn error_kind(&self) -> ErrorKind {
        *self
    }
}

impl ClassifyError for Infallible {
    fn error_kind(&self) -> ErrorKind {
        match *self {}
    }
}

impl ClassifyError for io::Error {
    fn error_kind(&self) -> ErrorKind {
        match self.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::Validation,
            io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => ErrorKind::Cancelled,
            _ => ErrorKind::Persistence,
        }
    }
}

impl ClassifyError for tokio::time::error::Elapsed {
    fn error_kind(&self) -> ErrorKind {
        ErrorKind::Cancelled
    }
}

impl<E: ClassifyError + ?Sized> ClassifyError for Box<E> {
    fn error_kind(&self) -> ErrorKind {
        (**self).error_kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_values_are_closed() {
        let labels: Vec<&str> = ErrorKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(labels, vec!["validation", "not-found", "persistence", "cancelled", "unknown"]);
    }

    #[test]
    fn test_io_error_classification() {
        let cases = [
            (io::ErrorKind::NotFound, ErrorKind::NotFound),
            (io::ErrorKind::InvalidInput, ErrorKind::Validation),
            (io::ErrorKind::InvalidData, ErrorKind::Validation),
            (io::ErrorKind::TimedOut, ErrorKind::Cancelled),
            (io::ErrorKind::PermissionDenied, ErrorKind::Persistence),
            (io::ErrorKind::ConnectionReset, ErrorKind::Persistence),
        ];
        for (io_kind, expected) in cases {
            let err = io::Error::new(io_kind, "boom: free-form message");
            assert_eq!(err.error_kind(), expected, "{io_kind:?}");
        }
    }

    #[tokio::test]
    async fn test_elapsed_is_cancelled() {
        let err = tokio::time::timeout(std::time::Duration::from_millis(1), std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(err.error_kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_boxed_error_delegates() {
        let boxed: Box<ErrorKind> = Box::new(ErrorKind::Validation);
        assert_eq!(boxed.error_kind(), ErrorKind::Validation);
    }
}
