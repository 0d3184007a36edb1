//! Telemetry metric name constants.
//!
//! Centralised metric names for the server. Consumers install their own
//! `metrics` recorder (e.g. prometheus, statsd); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `grafeas_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `route`: dispatch target, "rpc" or "gateway"
//! - `stage`: where a connection failed, "handshake" or "protocol"
//! - `code`: gRPC status code name returned to the gateway

/// Total requests routed by the protocol dispatcher.
///
/// Labels: `route` ("rpc" | "gateway").
pub const REQUESTS_DISPATCHED_TOTAL: &str = "grafeas_requests_dispatched_total";

/// Total connections accepted by the listener.
pub const CONNECTIONS_ACCEPTED_TOTAL: &str = "grafeas_connections_accepted_total";

/// Total connections that ended with an error.
///
/// Labels: `stage` ("handshake" | "protocol").
pub const CONNECTION_ERRORS_TOTAL: &str = "grafeas_connection_errors_total";

/// Total gateway calls answered with a non-OK gRPC status.
///
/// Labels: `code`.
pub const GATEWAY_UPSTREAM_ERRORS_TOTAL: &str = "grafeas_gateway_upstream_errors_total";
