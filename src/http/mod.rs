//! HTTP middleware and server.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → flow.rs (fresh flow for the request)
//!     → [TraceLayer request span]
//!     → request_id.rs (X-Tunnel-Request-Id in, echo out)
//!     → instance.rs (stamp instance identity)
//!     → handler
//!     → propagation.rs (X-Tunnel-* headers on outgoing calls)
//!     → upstream
//! ```

pub mod flow;
pub mod instance;
pub mod propagation;
pub mod request_id;
pub mod server;

pub use flow::{FlowScopeLayer, FlowScopeService};
pub use instance::{resolve_instance_id, InstanceIdentityLayer, InstanceIdentityService};
pub use propagation::{inject_headers, CorrelationPropagation, CorrelationPropagationLayer, CorrelationRequestExt};
pub use request_id::{TunnelRequestIdLayer, TunnelRequestIdService};
pub use server::HttpServer;
