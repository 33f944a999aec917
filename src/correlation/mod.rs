//! Correlation context subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → store.rs   (flow-scoped slot, lazy ContextHandle)
//!     → context.rs (set_* writes the field, then mirrors it)
//!     → span.rs    (ActiveSpan::attach_tag on the flow's span)
//!
//! Readers of the same handle:
//!     → http::propagation     (outbound headers)
//!     → observability::logging (log record properties)
//! ```
//!
//! # Design Decisions
//! - One context object per flow, shared by reference with spawned children
//! - Field names for headers, log properties and span tags live in one table (fields.rs)
//! - Reads never fail: unset fields are `None`

pub mod context;
pub mod fields;
pub mod span;
pub mod store;

pub use context::{ContextHandle, CorrelationContext};
pub use fields::CorrelationField;
pub use span::{span_tags, ActiveSpan, SpanTags, TagRecorder};
pub use store::{ContextAccessor, FlowContextAccessor, SharedAccessor};
