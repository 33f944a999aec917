//! One-stop registration of the correlation stack.
//!
//! ```text
//! inbound:   FlowScopeLayer → TraceLayer → TunnelRequestIdLayer → InstanceIdentityLayer → handler
//! outbound:  handler → CorrelationPropagationLayer → HTTP client
//! logs:      every event → CorrelationEnricher
//! ```

use axum::Router;
use std::fmt;

use crate::config::schema::TelemetryConfig;
use crate::correlation::store::{FlowContextAccessor, SharedAccessor};
use crate::error::TelemetryError;
use crate::http::flow::FlowScopeLayer;
use crate::http::instance::InstanceIdentityLayer;
use crate::http::propagation::CorrelationPropagationLayer;
use crate::http::request_id::TunnelRequestIdLayer;
use crate::observability::logging::{CorrelationEnricher, CorrelationLogLayer};
use crate::observability::tracing::{correlation_trace_layer, CorrelationTraceLayer};

/// Correlation telemetry for one service.
#[derive(Clone)]
pub struct TunnelTelemetry {
    service_name: String,
    environment: String,
    instance: InstanceIdentityLayer,
    accessor: SharedAccessor,
}

impl TunnelTelemetry {
    /// Telemetry for `service_name`, resolving the instance id from the host.
    pub fn new(service_name: impl Into<String>) -> Result<Self, TelemetryError> {
        let service_name = service_name.into();
        if service_name.trim().is_empty() {
            return Err(TelemetryError::InvalidArgument(
                "service name must not be empty".to_string(),
            ));
        }

        Ok(Self {
            service_name,
            environment: TelemetryConfig::default().environment,
            instance: InstanceIdentityLayer::new(),
            accessor: FlowContextAccessor::shared(),
        })
    }

    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let mut telemetry = Self::new(config.service_name.as_str())?;
        telemetry.environment = config.environment.clone();
        if let Some(instance_id) = &config.instance_id {
            telemetry.instance = InstanceIdentityLayer::with_instance_id(instance_id.as_str());
        }
        Ok(telemetry)
    }

    /// Replace the context source for every layer built afterwards.
    pub fn with_accessor(mut self, accessor: SharedAccessor) -> Self {
        self.instance = self.instance.with_accessor(accessor.clone());
        self.accessor = accessor;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn instance_id(&self) -> &str {
        self.instance.instance_id()
    }

    pub fn accessor(&self) -> SharedAccessor {
        self.accessor.clone()
    }

    pub fn flow_layer(&self) -> FlowScopeLayer {
        FlowScopeLayer::new()
    }

    pub fn request_id_layer(&self) -> TunnelRequestIdLayer {
        TunnelRequestIdLayer::with_accessor(self.accessor.clone())
    }

    pub fn instance_layer(&self) -> InstanceIdentityLayer {
        self.instance.clone()
    }

    pub fn propagation_layer(&self) -> CorrelationPropagationLayer {
        CorrelationPropagationLayer::with_accessor(self.accessor.clone())
    }

    pub fn trace_layer(&self) -> CorrelationTraceLayer {
        correlation_trace_layer()
    }

    pub fn enricher(&self) -> CorrelationEnricher {
        CorrelationEnricher::new(self.accessor.clone())
    }

    /// JSON log layer stamped with this service's resource attributes.
    pub fn log_layer(&self) -> CorrelationLogLayer {
        CorrelationLogLayer::new(self.enricher())
            .with_resource("service.name", self.service_name.as_str())
            .with_resource("deployment.environment", self.environment.as_str())
    }

    /// Mount the inbound stack on `router`.
    ///
    /// The flow scope wraps everything, so the trace layer's own records are
    /// enriched. Request id then instance identity run inside the trace layer
    /// so their tags land on the request span.
    pub fn apply<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router
            .layer(self.instance_layer())
            .layer(self.request_id_layer())
            .layer(self.trace_layer())
            .layer(self.flow_layer())
    }
}

impl fmt::Debug for TunnelTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelTelemetry")
            .field("service_name", &self.service_name)
            .field("environment", &self.environment)
            .field("instance_id", &self.instance_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::fields::X_TUNNEL_REQUEST_ID;
    use crate::correlation::store;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    #[test]
    fn test_rejects_blank_service_name() {
        assert!(matches!(
            TunnelTelemetry::new(""),
            Err(TelemetryError::InvalidArgument(_))
        ));
        assert!(matches!(
            TunnelTelemetry::new("  \t"),
            Err(TelemetryError::InvalidArgument(_))
        ));
        assert!(TunnelTelemetry::new("edge").is_ok());
    }

    #[test]
    fn test_from_config_uses_overrides() {
        let mut config = TelemetryConfig::default();
        config.service_name = "edge-eu".into();
        config.environment = "Staging".into();
        config.instance_id = Some("edge-eu-3".into());

        let telemetry = TunnelTelemetry::from_config(&config).unwrap();
        assert_eq!(telemetry.service_name(), "edge-eu");
        assert_eq!(telemetry.environment(), "Staging");
        assert_eq!(telemetry.instance_id(), "edge-eu-3");
    }

    #[tokio::test]
    async fn test_apply_mounts_ingress_and_instance() {
        let mut config = TelemetryConfig::default();
        config.instance_id = Some("edge-1".into());
        let telemetry = TunnelTelemetry::from_config(&config).unwrap();

        let app = telemetry.apply(Router::new().route(
            "/",
            get(|| async {
                let context = store::current();
                format!(
                    "{}|{}",
                    context.request_id().unwrap_or_default(),
                    context.instance_id().unwrap_or_default()
                )
            }),
        ));

        let request = Request::builder()
            .uri("/")
            .header(X_TUNNEL_REQUEST_ID, "req-42")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.headers().get(&X_TUNNEL_REQUEST_ID).unwrap(), "req-42");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"req-42|edge-1");
    }
}
