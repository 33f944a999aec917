//! Correlation tags reach real `tracing` spans.

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tracing::field::{Field, Visit};
use tracing::span::{Id, Record};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

use tunnel_telemetry::config::TelemetryConfig;
use tunnel_telemetry::correlation::{span_tags, store};
use tunnel_telemetry::TunnelTelemetry;

/// (span name, field, value) for every `Span::record` call.
#[derive(Clone, Default)]
struct RecordedFields(Arc<Mutex<Vec<(String, String, String)>>>);

impl RecordedFields {
    fn contains(&self, span: &str, field: &str, value: &str) -> bool {
        self.0
            .lock()
            .unwrap()
            .iter()
            .any(|(s, f, v)| s == span && f == field && v == value)
    }

    fn any_field(&self, field: &str) -> bool {
        self.0.lock().unwrap().iter().any(|(_, f, _)| f == field)
    }
}

struct FieldVisitor(Vec<(String, String)>);

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.push((field.name().to_string(), format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.push((field.name().to_string(), value.to_string()));
    }
}

impl<S> Layer<S> for RecordedFields
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let name = ctx.span(id).map(|span| span.name()).unwrap_or("unknown");
        let mut visitor = FieldVisitor(Vec::new());
        values.record(&mut visitor);

        let mut recorded = self.0.lock().unwrap();
        for (field, value) in visitor.0 {
            recorded.push((name.to_string(), field, value));
        }
    }
}

async fn handshake_handler() -> Json<Value> {
    let context = store::current();
    context.set_tunnel_id("tunnel-abc");
    context.add_custom_tag("tier", "gold");
    let request_tags = span_tags(&tracing::Span::current());

    let handshake = tracing::info_span!("handshake");
    {
        let _entered = handshake.enter();
        context.set_tunnel_id("tunnel-xyz");
        context.add_custom_tag("region", "eu-west");
    }
    let handshake_tags = span_tags(&handshake);

    Json(json!({
        "request": request_tags.0,
        "handshake": handshake_tags.0,
    }))
}

#[tokio::test]
async fn test_mirrored_tags_reach_active_span() {
    let mut config = TelemetryConfig::default();
    config.environment = "Test".into();
    config.instance_id = Some("edge-3".into());
    let telemetry = TunnelTelemetry::from_config(&config).unwrap();

    let recorded = RecordedFields::default();
    let subscriber = tracing_subscriber::registry().with(recorded.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = telemetry.apply(Router::new().route("/", get(handshake_handler)));
    let request = Request::builder()
        .uri("/")
        .header("X-Tunnel-Request-Id", "req-9")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let tags: Value = serde_json::from_slice(&body).unwrap();

    // Declared fields on the request span are recorded.
    assert!(recorded.contains("request", "tunnelRequestId", "req-9"));
    assert!(recorded.contains("request", "tunnelProxyId", "edge-3"));
    assert!(recorded.contains("request", "tunnelId", "tunnel-abc"));
    // Undeclared keys never reach on_record.
    assert!(!recorded.any_field("tier"));

    // Every tag, declared or not, is carried by the span it was attached to.
    assert_eq!(tags["request"]["tunnelRequestId"], "req-9");
    assert_eq!(tags["request"]["tunnelId"], "tunnel-abc");
    assert_eq!(tags["request"]["tier"], "gold");
    assert_eq!(tags["handshake"]["tunnelId"], "tunnel-xyz");
    assert_eq!(tags["handshake"]["region"], "eu-west");
    assert!(tags["handshake"].get("tier").is_none());
}
