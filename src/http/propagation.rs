//! Outbound correlation propagation.
//!
//! # Responsibilities
//! - Copy the flow's correlation identifiers onto outgoing request headers
//! - Leave headers the caller already set untouched
//! - Wrap each outgoing call in an `outgoing_call` span
//!
//! # Design Decisions
//! - The context is read when the request is handed to the stage, i.e. in
//!   the caller's flow, never later from the transport's task
//! - Unset or empty fields produce no header at all
//! - Custom tags are not propagated; they are for logs and spans only

use axum::http::{HeaderMap, HeaderValue, Request};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::instrument::Instrumented;
use tracing::Instrument;

use crate::correlation::context::CorrelationContext;
use crate::correlation::store::{self, FlowContextAccessor, SharedAccessor};
use crate::observability::metrics;

/// Add a header for every set, non-empty identifier in `context`.
///
/// Headers already present in `headers` win. Returns the number of headers added.
pub fn inject_headers(context: &CorrelationContext, headers: &mut HeaderMap) -> usize {
    let mut added = 0;
    for (field, value) in context.present_fields() {
        let name = field.header();
        if headers.contains_key(&name) {
            continue;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
                added += 1;
            }
            Err(_) => {
                tracing::debug!(
                    header = field.header_name(),
                    "Skipping correlation value that is not a valid header value"
                );
            }
        }
    }
    added
}

/// Layer for outbound HTTP clients (e.g. the hyper-util legacy client).
#[derive(Clone)]
pub struct CorrelationPropagationLayer {
    accessor: SharedAccessor,
}

impl CorrelationPropagationLayer {
    pub fn new() -> Self {
        Self::with_accessor(FlowContextAccessor::shared())
    }

    pub fn with_accessor(accessor: SharedAccessor) -> Self {
        Self { accessor }
    }
}

impl Default for CorrelationPropagationLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for CorrelationPropagationLayer {
    type Service = CorrelationPropagation<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationPropagation {
            inner,
            accessor: self.accessor.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CorrelationPropagation<S> {
    inner: S,
    accessor: SharedAccessor,
}

impl<S> CorrelationPropagation<S> {
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S, B> Service<Request<B>> for CorrelationPropagation<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Instrumented<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        let context = self.accessor.current().snapshot();
        let added = inject_headers(&context, request.headers_mut());
        metrics::record_headers_propagated(added);

        let span = tracing::debug_span!(
            "outgoing_call",
            tunnel.outgoing_call = true,
            method = %request.method(),
            uri = %request.uri(),
            propagated = added,
        );
        self.inner.call(request).instrument(span)
    }
}

/// Correlation headers for `reqwest` callers.
pub trait CorrelationRequestExt {
    /// Add the calling flow's correlation headers, keeping headers already set.
    fn with_correlation(self) -> Self;
}

impl CorrelationRequestExt for reqwest::Request {
    fn with_correlation(mut self) -> Self {
        let context = store::current().snapshot();
        let added = inject_headers(&context, self.headers_mut());
        metrics::record_headers_propagated(added);
        self
    }
}
