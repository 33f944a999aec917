//! Log records written while handling a request carry its correlation ids.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::Router;
use serde_json::Value;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tracing_subscriber::layer::SubscriberExt;

use tunnel_telemetry::config::TelemetryConfig;
use tunnel_telemetry::correlation::store;
use tunnel_telemetry::TunnelTelemetry;

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuffer {
    fn records(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

async fn handler() -> &'static str {
    store::current().set_tunnel_id("tunnel-123");
    tracing::info!("Handling tunnel request");

    store::spawn(async {
        tracing::info!("Background work");
    })
    .await
    .unwrap();

    "ok"
}

#[tokio::test]
async fn test_request_logs_are_enriched() {
    let mut config = TelemetryConfig::default();
    config.service_name = "edge-logs".into();
    config.environment = "Test".into();
    config.instance_id = Some("edge-7".into());
    let telemetry = TunnelTelemetry::from_config(&config).unwrap();

    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::registry()
        .with(telemetry.log_layer().with_writer(move || writer.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = telemetry.apply(Router::new().route("/", get(handler)));
    let request = Request::builder()
        .uri("/")
        .header("X-Tunnel-Request-Id", "req-77")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let records = buffer.records();
    let handling = records
        .iter()
        .find(|r| r["message"] == "Handling tunnel request")
        .expect("handler log missing");
    assert_eq!(handling["tunnelRequestId"], "req-77");
    assert_eq!(handling["tunnelProxyId"], "edge-7");
    assert_eq!(handling["tunnelId"], "tunnel-123");
    assert_eq!(handling["service.name"], "edge-logs");
    assert_eq!(handling["deployment.environment"], "Test");

    let background = records
        .iter()
        .find(|r| r["message"] == "Background work")
        .expect("background log missing");
    assert_eq!(background["tunnelRequestId"], "req-77");
    assert_eq!(background["tunnelId"], "tunnel-123");
}

async fn failing_handler() -> StatusCode {
    tracing::warn!("Tunnel handshake rejected");
    StatusCode::INTERNAL_SERVER_ERROR
}

#[tokio::test]
async fn test_trace_layer_records_are_enriched() {
    let mut config = TelemetryConfig::default();
    config.environment = "Test".into();
    config.instance_id = Some("edge-8".into());
    let telemetry = TunnelTelemetry::from_config(&config).unwrap();

    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::registry()
        .with(telemetry.log_layer().with_writer(move || writer.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = telemetry.apply(Router::new().route("/", get(failing_handler)));
    let request = Request::builder()
        .uri("/")
        .header("X-Tunnel-Request-Id", "req-500")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let records = buffer.records();
    for message in ["response failed", "finished processing request"] {
        let record = records
            .iter()
            .find(|r| r["message"] == message)
            .unwrap_or_else(|| panic!("no '{message}' record"));
        assert_eq!(record["tunnelRequestId"], "req-500");
        assert_eq!(record["tunnelProxyId"], "edge-8");
    }
}

#[tokio::test]
async fn test_unrelated_task_logs_are_not_enriched() {
    let telemetry = TunnelTelemetry::new("edge-logs").unwrap();

    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::registry()
        .with(telemetry.log_layer().with_writer(move || writer.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    tokio::spawn(async { store::current().set_tunnel_id("task-a-secret") })
        .await
        .unwrap();
    tokio::spawn(async { tracing::info!("Unrelated task") })
        .await
        .unwrap();

    let records = buffer.records();
    let record = records
        .iter()
        .find(|r| r["message"] == "Unrelated task")
        .expect("task log missing");
    assert!(record.get("tunnelId").is_none());
}
