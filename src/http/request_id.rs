//! Ingress request identifier middleware.
//!
//! # Responsibilities
//! - Join the request's flow, or open a fresh one (see [`FlowScopeLayer`])
//! - Take `X-Tunnel-Request-Id` from the request, or generate a UUID v4
//! - Store it through `set_request_id` (which also tags the request span)
//! - Echo it on the response, overwriting any value set downstream
//!
//! # Design Decisions
//! - Added as early as possible: everything after it can rely on the request id
//! - A header that is empty or not valid UTF-8 counts as missing
//!
//! [`FlowScopeLayer`]: crate::http::flow::FlowScopeLayer

use axum::http::{HeaderMap, HeaderValue, Request, Response};
use futures_util::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

use crate::correlation::fields::{CorrelationField, X_TUNNEL_REQUEST_ID};
use crate::correlation::store::{self, FlowContextAccessor, SharedAccessor};
use crate::observability::metrics::{self, RequestIdSource};
use crate::observability::tracing::stamp_span_attributes;

/// Layer that assigns the per-request correlation identifier.
#[derive(Clone)]
pub struct TunnelRequestIdLayer {
    accessor: SharedAccessor,
}

impl TunnelRequestIdLayer {
    pub fn new() -> Self {
        Self::with_accessor(FlowContextAccessor::shared())
    }

    pub fn with_accessor(accessor: SharedAccessor) -> Self {
        Self { accessor }
    }
}

impl Default for TunnelRequestIdLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for TunnelRequestIdLayer {
    type Service = TunnelRequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TunnelRequestIdService {
            inner,
            accessor: self.accessor.clone(),
        }
    }
}

#[derive(Clone)]
pub struct TunnelRequestIdService<S> {
    inner: S,
    accessor: SharedAccessor,
}

/// Request id carried by `headers`, or a freshly generated one.
pub fn extract_or_generate(headers: &HeaderMap) -> (String, RequestIdSource) {
    headers
        .get(&X_TUNNEL_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| (value.to_string(), RequestIdSource::Header))
        .unwrap_or_else(|| (Uuid::new_v4().to_string(), RequestIdSource::Generated))
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TunnelRequestIdService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // The ready service goes into the future; keep a fresh clone for the next call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let accessor = self.accessor.clone();

        Box::pin(store::ensure_request_flow(async move {
            let (request_id, source) = extract_or_generate(request.headers());
            let context = accessor.current();
            context.set_request_id(request_id.clone());
            metrics::record_request_id(source);

            tracing::debug!(
                request_id = %request_id,
                source = source.as_str(),
                "Assigned {}",
                CorrelationField::RequestId.header_name()
            );

            let mut response = inner.call(request).await?;

            match HeaderValue::from_str(&request_id) {
                Ok(value) => {
                    response.headers_mut().insert(X_TUNNEL_REQUEST_ID, value);
                }
                Err(_) => tracing::warn!(request_id = %request_id, "Request id is not a valid header value"),
            }

            let snapshot = context.snapshot();
            store::with_active_span(|span| {
                if let Some(span) = span {
                    stamp_span_attributes(span, &snapshot);
                }
            });

            Ok(response)
        }))
    }
}
