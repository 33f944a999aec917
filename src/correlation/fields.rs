//! The fixed set of correlation identifiers and their external names.
//!
//! Every identifier travels under three names: an HTTP header on the wire,
//! a structured property on log records, and a tag on the active span. The
//! log property and span tag are always the same string.
//!
//! | Field      | Header                | Log property / span tag |
//! |------------|-----------------------|-------------------------|
//! | request    | `X-Tunnel-Request-Id` | `tunnelRequestId`       |
//! | client     | `X-Tunnel-Client-Id`  | `tunnelClientId`        |
//! | tunnel     | `X-Tunnel-Id`         | `tunnelId`              |
//! | instance   | `X-Tunnel-Proxy-Id`   | `tunnelProxyId`         |
//! | session    | `X-Tunnel-Session-Id` | `tunnelSessionId`       |

use axum::http::HeaderName;
use std::fmt;

pub const X_TUNNEL_REQUEST_ID: HeaderName = HeaderName::from_static("x-tunnel-request-id");
pub const X_TUNNEL_CLIENT_ID: HeaderName = HeaderName::from_static("x-tunnel-client-id");
pub const X_TUNNEL_ID: HeaderName = HeaderName::from_static("x-tunnel-id");
pub const X_TUNNEL_PROXY_ID: HeaderName = HeaderName::from_static("x-tunnel-proxy-id");
pub const X_TUNNEL_SESSION_ID: HeaderName = HeaderName::from_static("x-tunnel-session-id");

/// One of the five correlation identifiers carried by a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationField {
    /// Per-request identifier, set once by the ingress middleware.
    RequestId,
    /// Calling principal (hardware thumbprint / license).
    ClientId,
    /// Logical tunnel, stable across reconnects.
    TunnelId,
    /// Process instance handling the flow (hostname or pod name).
    InstanceId,
    /// Transport-level connection.
    SessionId,
}

impl CorrelationField {
    /// All fields, in propagation and enrichment order.
    pub const ALL: [CorrelationField; 5] = [
        CorrelationField::RequestId,
        CorrelationField::ClientId,
        CorrelationField::TunnelId,
        CorrelationField::InstanceId,
        CorrelationField::SessionId,
    ];

    /// Canonical header spelling, as documented for peers.
    pub const fn header_name(self) -> &'static str {
        match self {
            CorrelationField::RequestId => "X-Tunnel-Request-Id",
            CorrelationField::ClientId => "X-Tunnel-Client-Id",
            CorrelationField::TunnelId => "X-Tunnel-Id",
            CorrelationField::InstanceId => "X-Tunnel-Proxy-Id",
            CorrelationField::SessionId => "X-Tunnel-Session-Id",
        }
    }

    /// Header name usable with `HeaderMap`.
    pub const fn header(self) -> HeaderName {
        match self {
            CorrelationField::RequestId => X_TUNNEL_REQUEST_ID,
            CorrelationField::ClientId => X_TUNNEL_CLIENT_ID,
            CorrelationField::TunnelId => X_TUNNEL_ID,
            CorrelationField::InstanceId => X_TUNNEL_PROXY_ID,
            CorrelationField::SessionId => X_TUNNEL_SESSION_ID,
        }
    }

    /// Structured log property name.
    pub const fn log_property(self) -> &'static str {
        match self {
            CorrelationField::RequestId => "tunnelRequestId",
            CorrelationField::ClientId => "tunnelClientId",
            CorrelationField::TunnelId => "tunnelId",
            CorrelationField::InstanceId => "tunnelProxyId",
            CorrelationField::SessionId => "tunnelSessionId",
        }
    }

    /// Tag written onto the active span when the field is set.
    pub const fn span_tag(self) -> &'static str {
        self.log_property()
    }

    /// Dotted attribute stamped on the request span once inbound handling finishes.
    pub const fn span_attribute(self) -> &'static str {
        match self {
            CorrelationField::RequestId => "tunnel.request_id",
            CorrelationField::ClientId => "tunnel.client_id",
            CorrelationField::TunnelId => "tunnel.id",
            CorrelationField::InstanceId => "tunnel.proxy_id",
            CorrelationField::SessionId => "tunnel.session_id",
        }
    }
}

impl fmt::Display for CorrelationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.log_property())
    }
}
