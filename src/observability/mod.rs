//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! instrument::CallInterceptor
//!     → MetricsFacadeRegistry (metrics facade)
//!     → exporter.rs (Prometheus recorder, common tag, buckets)
//!     → scrape endpoint / rendered text
//!
//! All modules:
//!     → logging.rs (structured log events via tracing)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Metrics are cheap (atomic increments)
//! - Process/runtime metrics are left to whatever binder shares the recorder

pub mod exporter;
pub mod logging;

pub use exporter::{install_prometheus, prometheus_builder, ExporterError};
pub use logging::{init_logging, LoggingError};
