//! Request spans that can carry correlation tags.
//!
//! # Responsibilities
//! - Create the per-request span for `tower_http`'s `TraceLayer`
//! - Pre-declare every correlation tag so mirroring from the context lands
//! - Stamp the dotted `tunnel.*` attributes once inbound handling is done
//!
//! # Design Decisions
//! - `tracing` spans cannot grow new fields after creation, so custom tags
//!   only reach spans that declared the key. Fixed tags are always declared

use axum::http::Request;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::field::Empty;
use tracing::Span;

use crate::correlation::context::CorrelationContext;
use crate::correlation::span::ActiveSpan;

/// `TraceLayer` span factory declaring the correlation fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationMakeSpan;

impl CorrelationMakeSpan {
    pub fn new() -> Self {
        Self
    }
}

impl<B> MakeSpan<B> for CorrelationMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            version = ?request.version(),
            tunnelRequestId = Empty,
            tunnelClientId = Empty,
            tunnelId = Empty,
            tunnelProxyId = Empty,
            tunnelSessionId = Empty,
            tunnel.request_id = Empty,
            tunnel.client_id = Empty,
            tunnel.id = Empty,
            tunnel.proxy_id = Empty,
            tunnel.session_id = Empty,
        )
    }
}

pub type CorrelationTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, CorrelationMakeSpan>;

/// HTTP trace layer whose request span accepts correlation tags.
pub fn correlation_trace_layer() -> CorrelationTraceLayer {
    TraceLayer::new_for_http().make_span_with(CorrelationMakeSpan::new())
}

/// Attach the dotted `tunnel.*` attribute for every set identifier.
pub fn stamp_span_attributes(span: &dyn ActiveSpan, context: &CorrelationContext) {
    for (field, value) in context.present_fields() {
        span.attach_tag(field.span_attribute(), value);
    }
}
