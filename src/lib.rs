//! Correlation-context propagation for tunnel services.
//!
//! Every logical flow (an inbound request and everything it spawns) carries a
//! [`ContextHandle`] with the tunnel identifiers: request, client, tunnel,
//! instance and session. Middleware fills it, log records and spans are
//! enriched from it, and outgoing HTTP calls carry it as `X-Tunnel-*` headers.

pub mod config;
pub mod correlation;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod telemetry;

pub use config::schema::TelemetryConfig;
pub use correlation::{ContextHandle, CorrelationContext, CorrelationField};
pub use error::TelemetryError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use telemetry::TunnelTelemetry;
