//! HTTP server for the `tunnel-edge` binary.
//!
//! # Responsibilities
//! - Create the Axum router with the inbound correlation stack
//! - `/context`: report (and optionally enrich) the request's correlation context
//! - `/forward/{*path}`: forward to the configured upstream through the propagation stage
//! - Serve until the shutdown broadcast fires

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::timeout::TimeoutLayer;

use crate::config::schema::TelemetryConfig;
use crate::correlation::store;
use crate::http::propagation::CorrelationPropagation;
use crate::lifecycle::shutdown;
use crate::telemetry::TunnelTelemetry;

/// Outbound client with correlation headers attached to every call.
pub type UpstreamClient = CorrelationPropagation<Client<HttpConnector, Body>>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Option<Upstream>,
}

#[derive(Clone)]
pub struct Upstream {
    pub address: String,
    pub client: UpstreamClient,
}

/// HTTP server for the edge.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &TelemetryConfig, telemetry: &TunnelTelemetry) -> Self {
        let upstream = config.upstream.address.as_ref().map(|address| {
            let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
            Upstream {
                address: address.clone(),
                client: tower::Layer::layer(&telemetry.propagation_layer(), client),
            }
        });

        let router = Self::build_router(config, telemetry, AppState { upstream });
        Self { router }
    }

    #[allow(deprecated)]
    fn build_router(config: &TelemetryConfig, telemetry: &TunnelTelemetry, state: AppState) -> Router {
        let router = Router::new()
            .route("/context", get(context_handler))
            .route("/forward/{*path}", any(forward_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.listener.request_timeout_secs,
            )));
        telemetry.apply(router)
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Optional values a caller can attach to its own context.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextQuery {
    pub tunnel_id: Option<String>,
    pub client_id: Option<String>,
    pub session_id: Option<String>,
}

async fn context_handler(Query(query): Query<ContextQuery>) -> impl IntoResponse {
    let context = store::current();

    match (&query.tunnel_id, &query.client_id) {
        (Some(tunnel_id), Some(client_id)) => {
            context.set_all(tunnel_id, client_id, None, query.session_id.as_deref());
        }
        _ => {
            if let Some(tunnel_id) = query.tunnel_id {
                context.set_tunnel_id(tunnel_id);
            }
            if let Some(client_id) = query.client_id {
                context.set_client_id(client_id);
            }
            if let Some(session_id) = query.session_id {
                context.set_session_id(session_id);
            }
        }
    }

    tracing::info!("Context requested");
    Json(context.snapshot())
}

/// Request headers minus hop-specific and inbound correlation headers.
fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| *name != header::HOST && !name.as_str().starts_with("x-tunnel-"))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn upstream_uri(address: &str, path: &str, query: Option<&str>) -> Result<Uri, axum::http::Error> {
    let uri = match query {
        Some(query) => format!("http://{}/{}?{}", address, path, query),
        None => format!("http://{}/{}", address, path),
    };
    Ok(uri.parse::<Uri>()?)
}

async fn forward_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    request: Request<Body>,
) -> Response {
    let Some(upstream) = state.upstream else {
        tracing::warn!("Forwarding requested but no upstream is configured");
        return (StatusCode::SERVICE_UNAVAILABLE, "No upstream configured").into_response();
    };

    let (parts, body) = request.into_parts();
    let uri = match upstream_uri(&upstream.address, &path, parts.uri.query()) {
        Ok(uri) => uri,
        Err(err) => {
            tracing::warn!(error = %err, path = %path, "Invalid upstream URI");
            return (StatusCode::BAD_REQUEST, "Invalid forward path").into_response();
        }
    };

    let mut outbound = Request::new(body);
    *outbound.method_mut() = parts.method;
    *outbound.uri_mut() = uri;
    *outbound.headers_mut() = forwardable_headers(&parts.headers);

    tracing::debug!(uri = %outbound.uri(), "Forwarding request");

    match upstream.client.oneshot(outbound).await {
        Ok(response) => {
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(err) => {
            tracing::error!(error = %err, upstream = %upstream.address, "Upstream error");
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
