//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Correlation context (current flow)
//!     → logging.rs (enrich every log record, JSON lines)
//!     → tracing.rs (request span tags, dotted tunnel.* attributes)
//!     → metrics.rs (request id sources, propagated headers)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Correlation ids flow through logs and spans without call-site plumbing
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
pub mod tracing;
