//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tunnel_request_ids_total` (counter): request ids assigned, by `source` (header, generated)
//! - `tunnel_outbound_headers_total` (counter): correlation headers attached to outgoing calls
//! - `tunnel_outbound_calls_total` (counter): outgoing calls that passed the propagation stage
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so library users pay nothing
//! - Prometheus exporter is opt-in through configuration

use metrics::counter;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Where a request id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIdSource {
    Header,
    Generated,
}

impl RequestIdSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            RequestIdSource::Header => "header",
            RequestIdSource::Generated => "generated",
        }
    }
}

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request_id(source: RequestIdSource) {
    counter!("tunnel_request_ids_total", "source" => source.as_str()).increment(1);
}

pub fn record_headers_propagated(count: usize) {
    counter!("tunnel_outbound_calls_total").increment(1);
    counter!("tunnel_outbound_headers_total").increment(count as u64);
}
