//! Error types for telemetry setup.
//!
//! Request-path operations never fail; these errors only surface while
//! wiring the stack together at startup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to install log subscriber: {0}")]
    LoggingInit(#[from] tracing_subscriber::util::TryInitError),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(String),
}
