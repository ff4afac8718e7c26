//! Metrics definitions for the session coordinator
//!
//! All metrics follow Prometheus naming conventions:
//! - `sc_` prefix for Session Coordinator
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Every label value is a `&'static str` taken from a closed enum:
//! - `from`, `to`, `transport`: 3 values (`primary_socket`, `http_poll`, `direct_fallback`)
//! - `direction`: 2 values (send, poll)
//! - `state`: 6 values (bounded by `ConnectionState`)
//! - `error_type`: 9 values (bounded by `ScError`)
//!
//! # Gauges
//!
//! Several sessions may share one process, so gauges are only moved by
//! increments and decrements, never `set`. Each value is the sum over all
//! live sessions.

use metrics::{counter, gauge};

// ============================================================================
// Transport Metrics
// ============================================================================

/// Record a transport failover.
///
/// Metric: `sc_transport_failover_total`
/// Labels: `from`, `to`
pub fn record_failover(from: &'static str, to: &'static str) {
    counter!("sc_transport_failover_total", "from" => from, "to" => to).increment(1);
}

/// A session started using `transport`.
///
/// Metric: `sc_transport_active`
/// Labels: `transport`
///
/// Reads as the number of sessions on each transport.
pub fn transport_activated(transport: &'static str) {
    gauge!("sc_transport_active", "transport" => transport).increment(1.0);
}

/// A session stopped using `transport`.
pub fn transport_deactivated(transport: &'static str) {
    gauge!("sc_transport_active", "transport" => transport).decrement(1.0);
}

/// Record a failed signaling delivery (send or poll).
///
/// Metric: `sc_signaling_delivery_errors_total`
/// Labels: `transport`, `direction`
pub fn record_delivery_error(transport: &'static str, direction: &'static str) {
    counter!(
        "sc_signaling_delivery_errors_total",
        "transport" => transport,
        "direction" => direction
    )
    .increment(1);
}

/// Record a send accepted but not transmitted (Direct Fallback).
///
/// Metric: `sc_signals_suppressed_total`
pub fn record_signal_suppressed() {
    counter!("sc_signals_suppressed_total").increment(1);
}

// ============================================================================
// Peer Connection Metrics
// ============================================================================

/// A peer connection was created.
///
/// Metric: `sc_connections_active`
pub fn connection_opened() {
    gauge!("sc_connections_active").increment(1.0);
}

/// A peer connection was closed and forgotten.
pub fn connection_closed() {
    gauge!("sc_connections_active").decrement(1.0);
}

/// Record a peer connection entering `state`.
///
/// Metric: `sc_connection_state_total`
/// Labels: `state`
pub fn record_connection_state(state: &'static str) {
    counter!("sc_connection_state_total", "state" => state).increment(1);
}

/// Record a failed offer/answer exchange.
///
/// Metric: `sc_negotiation_failures_total`
pub fn record_negotiation_failure() {
    counter!("sc_negotiation_failures_total").increment(1);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record an error surfaced by the coordinator.
///
/// Metric: `sc_errors_total`
/// Labels: `error_type` (from `ScError::error_type_label`)
pub fn record_error(error_type: &'static str) {
    counter!("sc_errors_total", "error_type" => error_type).increment(1);
}
