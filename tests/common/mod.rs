//! Shared utilities for integration tests.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use tunnel_telemetry::config::TelemetryConfig;
use tunnel_telemetry::{HttpServer, Shutdown, TunnelTelemetry};

/// `x-tunnel-*` headers of `request`, as a JSON object.
fn tunnel_headers_json(request: &Request<Incoming>) -> String {
    let headers: BTreeMap<String, String> = request
        .headers()
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-tunnel-"))
        .map(|(name, value)| {
            (
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    serde_json::to_string(&headers).unwrap()
}

/// Start a mock backend that answers every request with the correlation
/// headers it received, as JSON.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let service = service_fn(|request: Request<Incoming>| async move {
                    let body = tunnel_headers_json(&request);
                    Ok::<_, Infallible>(
                        Response::builder()
                            .header("content-type", "application/json")
                            .body(body)
                            .unwrap(),
                    )
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(socket), service)
                    .await;
            });
        }
    });

    addr
}

/// A running `tunnel-edge` server.
pub struct EdgeHandle {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl EdgeHandle {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the edge on an ephemeral port, forwarding to `upstream` if given.
pub async fn start_edge(upstream: Option<SocketAddr>, instance_id: &str) -> EdgeHandle {
    let mut config = TelemetryConfig::default();
    config.environment = "Test".into();
    config.instance_id = Some(instance_id.to_string());
    config.upstream.address = upstream.map(|addr| addr.to_string());

    let telemetry = TunnelTelemetry::from_config(&config).unwrap();
    let server = HttpServer::new(&config, &telemetry);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(server.run(listener, rx));

    EdgeHandle { addr, shutdown }
}
