//! End-to-end correlation through the edge server.

mod common;

use serde_json::Value;
use std::collections::HashSet;
use tunnel_telemetry::correlation::store;
use tunnel_telemetry::http::CorrelationRequestExt;

#[tokio::test]
async fn test_forward_propagates_request_and_instance_ids() {
    let backend = common::start_echo_backend().await;
    let edge = common::start_edge(Some(backend), "edge-test-1").await;

    let client = reqwest::Client::new();
    let response = client
        .get(edge.url("/forward/echo"))
        .header("X-Tunnel-Request-Id", "abc")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-tunnel-request-id"], "abc");

    let received: Value = response.json().await.unwrap();
    assert_eq!(received["x-tunnel-request-id"], "abc");
    assert_eq!(received["x-tunnel-proxy-id"], "edge-test-1");
    assert!(received.get("x-tunnel-client-id").is_none());
    assert!(received.get("x-tunnel-session-id").is_none());

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_inbound_correlation_headers_are_not_relayed() {
    let backend = common::start_echo_backend().await;
    let edge = common::start_edge(Some(backend), "edge-test-2").await;

    let received: Value = reqwest::Client::new()
        .get(edge.url("/forward/echo"))
        .header("X-Tunnel-Id", "spoofed")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(received.get("x-tunnel-id").is_none());
    assert_eq!(received["x-tunnel-proxy-id"], "edge-test-2");

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_generated_request_id_matches_context() {
    let edge = common::start_edge(None, "edge-test-3").await;

    let response = reqwest::get(edge.url("/context")).await.unwrap();
    let header = response.headers()["x-tunnel-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    let context: Value = response.json().await.unwrap();

    assert!(uuid::Uuid::parse_str(&header).is_ok());
    assert_eq!(context["requestId"], header.as_str());
    assert_eq!(context["instanceId"], "edge-test-3");

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_context_endpoint_sets_tunnel_fields() {
    let edge = common::start_edge(None, "edge-test-4").await;

    let context: Value = reqwest::get(edge.url("/context?tunnelId=t-1&clientId=c-1&sessionId=s-1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(context["tunnelId"], "t-1");
    assert_eq!(context["clientId"], "c-1");
    assert_eq!(context["sessionId"], "s-1");
    assert_eq!(context["instanceId"], "edge-test-4");

    edge.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_stay_isolated() {
    let edge = common::start_edge(None, "edge-test-5").await;
    let client = reqwest::Client::new();

    let mut tasks = Vec::new();
    for i in 0..24 {
        let client = client.clone();
        let url = edge.url(&format!("/context?tunnelId=tunnel-{i}&clientId=client-{i}"));
        tasks.push(tokio::spawn(async move {
            let context: Value = client
                .get(url)
                .header("X-Tunnel-Request-Id", format!("req-{i}"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            (i, context)
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        let (i, context) = task.await.unwrap();
        assert_eq!(context["requestId"], format!("req-{i}"));
        assert_eq!(context["tunnelId"], format!("tunnel-{i}"));
        assert_eq!(context["clientId"], format!("client-{i}"));
        assert!(seen.insert(i));
    }

    edge.shutdown.trigger();
}

#[tokio::test]
async fn test_reqwest_caller_propagates_flow_context() {
    let backend = common::start_echo_backend().await;
    let client = reqwest::Client::new();

    let received: Value = store::scope(async {
        let context = store::current();
        context.set_all("tunnel-123", "client-9", None, Some("session-7"));

        let request = client
            .get(format!("http://{backend}/echo"))
            .header("X-Tunnel-Session-Id", "explicit")
            .build()
            .unwrap()
            .with_correlation();
        client.execute(request).await.unwrap().json().await.unwrap()
    })
    .await;

    assert_eq!(received["x-tunnel-id"], "tunnel-123");
    assert_eq!(received["x-tunnel-client-id"], "client-9");
    assert_eq!(received["x-tunnel-session-id"], "explicit");
    assert!(received.get("x-tunnel-request-id").is_none());
    assert!(received.get("x-tunnel-proxy-id").is_none());
}
