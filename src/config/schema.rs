//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Environment variable naming the deployment environment.
pub const ENVIRONMENT_VAR: &str = "TUNNEL_ENVIRONMENT";

/// Environment used when `TUNNEL_ENVIRONMENT` is unset.
pub const DEFAULT_ENVIRONMENT: &str = "Production";

/// Root configuration for the telemetry stack and the edge binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Logical service name, reported as `service.name` on every log line.
    pub service_name: String,

    /// Deployment environment (`deployment.environment`).
    pub environment: String,

    /// Fixed instance id. Resolved from the host environment when unset.
    pub instance_id: Option<String>,

    pub logging: LoggingConfig,

    pub listener: ListenerConfig,

    pub upstream: UpstreamConfig,

    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "tunnel-edge".to_string(),
            environment: default_environment(),
            instance_id: None,
            logging: LoggingConfig::default(),
            listener: ListenerConfig::default(),
            upstream: UpstreamConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_environment() -> String {
    std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| DEFAULT_ENVIRONMENT.to_string())
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One enriched JSON object per line.
    #[default]
    Json,
    /// Human-readable output for local development.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "tunnel_telemetry=info,tower_http=info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Total time allowed per request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Upstream the edge forwards `/forward/*` requests to.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000"). Forwarding is disabled when unset.
    pub address: Option<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus endpoint.
    pub enabled: bool,

    /// Metrics endpoint bind address.
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:9090".to_string(),
        }
    }
}
