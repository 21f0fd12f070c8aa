//! Prometheus metrics and structured logging for sigdesk.
//!
//! - Prometheus counters/gauges for the socket, ingestion and gate
//! - Structured logging with tracing (pretty in development, JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
