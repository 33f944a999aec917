//! Per-request flow scope.
//!
//! Mounted outermost, so every record written while serving the request
//! (including the trace layer's own) reads the request's context.

use axum::http::Request;
use futures_util::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::correlation::store;

/// Layer that runs each request in a fresh request flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowScopeLayer;

impl FlowScopeLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for FlowScopeLayer {
    type Service = FlowScopeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FlowScopeService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct FlowScopeService<S> {
    inner: S,
}

impl<S, ReqBody> Service<Request<ReqBody>> for FlowScopeService<S>
where
    S: Service<Request<ReqBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        // `call` itself runs inside the scope so work done there is attributed too.
        Box::pin(store::request_scope(async move { inner.call(request).await }))
    }
}
