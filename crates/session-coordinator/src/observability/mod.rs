//! Observability for the session coordinator
//!
//! # Privacy by Default
//!
//! Actor loops use `#[instrument(skip_all)]` with explicit safe fields
//! (session id, peer id). The session authorization token is never a field.
//! SDP and ICE candidate contents are never logged.
//!
//! # Metrics
//!
//! The library records through the `metrics` facade only. The embedding
//! application decides whether and how to export them.
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `sc_transport_failover_total` | Counter | `from`, `to` | Transport failovers |
//! | `sc_transport_active` | Gauge | `transport` | Sessions on each transport |
//! | `sc_signaling_delivery_errors_total` | Counter | `transport`, `direction` | Failed sends/polls |
//! | `sc_signals_suppressed_total` | Counter | none | Sends dropped in Direct Fallback |
//! | `sc_connections_active` | Gauge | none | Live peer connections |
//! | `sc_connection_state_total` | Counter | `state` | Peer connection state transitions |
//! | `sc_negotiation_failures_total` | Counter | none | Failed offer/answer exchanges |
//! | `sc_errors_total` | Counter | `error_type` | Errors surfaced by the coordinator |

pub mod metrics;

pub use metrics::{
    connection_closed, connection_opened, record_connection_state, record_delivery_error,
    record_error, record_failover, record_negotiation_failure, record_signal_suppressed,
    transport_activated, transport_deactivated,
};
