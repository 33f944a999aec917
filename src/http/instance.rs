//! Instance identity middleware.
//!
//! Stamps the identity of this process (hostname or pod name) into every
//! flow, so logs and spans show which edge instance handled a request.
//! Mount it inside the request id layer.

use axum::http::Request;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

use crate::correlation::store::{self, FlowContextAccessor, SharedAccessor};

/// Set by container runtimes and Kubernetes to the pod name.
pub const HOSTNAME_VAR: &str = "HOSTNAME";
/// Set by Windows to the computer name.
pub const COMPUTERNAME_VAR: &str = "COMPUTERNAME";

/// Resolve this process's instance identity from the environment.
///
/// First present value wins: `HOSTNAME`, then `COMPUTERNAME`, then the OS hostname.
pub fn resolve_instance_id() -> String {
    resolve_instance_id_with(|name| std::env::var(name).ok())
}

/// [`resolve_instance_id`] with a custom variable lookup.
pub fn resolve_instance_id_with(lookup: impl Fn(&str) -> Option<String>) -> String {
    lookup(HOSTNAME_VAR)
        .or_else(|| lookup(COMPUTERNAME_VAR))
        .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned())
}

/// Layer that writes the instance id into each request's context.
#[derive(Clone)]
pub struct InstanceIdentityLayer {
    instance_id: Arc<str>,
    accessor: SharedAccessor,
}

impl InstanceIdentityLayer {
    /// Resolves the instance id once, now.
    pub fn new() -> Self {
        Self::with_instance_id(resolve_instance_id())
    }

    pub fn with_instance_id(instance_id: impl Into<String>) -> Self {
        let instance_id: String = instance_id.into();
        tracing::info!(instance_id = %instance_id, "Instance identity resolved");
        Self {
            instance_id: instance_id.into(),
            accessor: FlowContextAccessor::shared(),
        }
    }

    pub fn with_accessor(mut self, accessor: SharedAccessor) -> Self {
        self.accessor = accessor;
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl Default for InstanceIdentityLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for InstanceIdentityLayer {
    type Service = InstanceIdentityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InstanceIdentityService {
            inner,
            instance_id: self.instance_id.clone(),
            accessor: self.accessor.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InstanceIdentityService<S> {
    inner: S,
    instance_id: Arc<str>,
    accessor: SharedAccessor,
}

impl<S, ReqBody> Service<Request<ReqBody>> for InstanceIdentityService<S>
where
    S: Service<Request<ReqBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = futures_util::future::BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let instance_id = self.instance_id.clone();
        let accessor = self.accessor.clone();

        Box::pin(store::ensure_request_flow(async move {
            accessor.current().set_instance_id(&*instance_id);
            inner.call(request).await
        }))
    }
}
