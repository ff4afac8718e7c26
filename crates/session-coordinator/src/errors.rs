//! Session coordinator error types.
//!
//! Only media failures and API misuse reach the caller of the public API.
//! Per-peer failures stay contained in the peer actor, and transport failures
//! drive failover inside the router; both are logged and counted but never
//! returned from a coordinator method.

use crate::transport::TransportError;
use common::types::ParticipantId;
use signal_protocol::CodecError;
use thiserror::Error;

/// Session coordinator error type.
#[derive(Debug, Error)]
pub enum ScError {
    /// Camera/microphone unavailable or permission denied.
    #[error("Media access failed: {0}")]
    MediaAccess(String),

    /// Screen capture denied or unavailable.
    #[error("Screen capture failed: {0}")]
    ScreenCapture(String),

    /// Signaling transport could not be used.
    #[error("Signaling transport error: {0}")]
    SignalingTransport(String),

    /// Offer/answer/candidate processing failed for one peer.
    #[error("Negotiation with {peer_id} failed: {reason}")]
    Negotiation {
        peer_id: ParticipantId,
        reason: String,
    },

    /// A signaling message could not be delivered.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// A signaling message could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Operation not valid in the current session phase.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The session has been left or torn down.
    #[error("Session ended")]
    SessionEnded,

    /// Internal error with context.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for ScError {
    /// Classify a signaling backend failure.
    ///
    /// Encoding problems keep their codec error; everything else means the
    /// message did not get through.
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Codec(e) => ScError::Codec(e),
            other @ (TransportError::Connect(_)
            | TransportError::Http(_)
            | TransportError::Status(_)
            | TransportError::Closed) => ScError::Delivery(other.to_string()),
        }
    }
}

impl ScError {
    /// Bounded label for the `sc_errors_total` metric.
    #[must_use]
    pub fn error_type_label(&self) -> &'static str {
        match self {
            ScError::MediaAccess(_) => "media_access",
            ScError::ScreenCapture(_) => "screen_capture",
            ScError::SignalingTransport(_) => "signaling_transport",
            ScError::Negotiation { .. } => "negotiation",
            ScError::Delivery(_) => "delivery",
            ScError::Codec(_) => "codec",
            ScError::InvalidState(_) => "invalid_state",
            ScError::SessionEnded => "session_ended",
            ScError::Internal(_) => "internal",
        }
    }

    /// Whether the session cannot proceed after this error.
    ///
    /// Without local media there is nothing to send, so only media access
    /// failures are fatal. Everything else is contained or retried by the
    /// component that raised it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScError::MediaAccess(_))
    }

    /// Message suitable for the presentation layer.
    ///
    /// Internal details are logged, not surfaced.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ScError::MediaAccess(_) => {
                "Camera or microphone is unavailable or permission was denied".to_string()
            }
            ScError::ScreenCapture(_) => "Screen sharing was denied or is unavailable".to_string(),
            ScError::Negotiation { peer_id, .. } => {
                format!("Could not establish a connection with {peer_id}")
            }
            ScError::InvalidState(msg) => msg.clone(),
            ScError::SessionEnded => "The session has ended".to_string(),
            ScError::SignalingTransport(_)
            | ScError::Delivery(_)
            | ScError::Codec(_)
            | ScError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_only_media_access_is_fatal() {
        assert!(ScError::MediaAccess("denied".to_string()).is_fatal());
        assert!(!ScError::ScreenCapture("denied".to_string()).is_fatal());
        assert!(!ScError::SignalingTransport("down".to_string()).is_fatal());
        assert!(!ScError::Negotiation {
            peer_id: ParticipantId::from("bob"),
            reason: "bad sdp".to_string(),
        }
        .is_fatal());
        assert!(!ScError::SessionEnded.is_fatal());
    }

    #[test]
    fn test_error_type_labels_are_bounded() {
        let errors = vec![
            ScError::MediaAccess(String::new()),
            ScError::ScreenCapture(String::new()),
            ScError::SignalingTransport(String::new()),
            ScError::Negotiation {
                peer_id: ParticipantId::from("p"),
                reason: String::new(),
            },
            ScError::Delivery(String::new()),
            ScError::Codec(signal_protocol::decode_message("nope").unwrap_err()),
            ScError::InvalidState(String::new()),
            ScError::SessionEnded,
            ScError::Internal(String::new()),
        ];

        let labels: std::collections::HashSet<_> =
            errors.iter().map(ScError::error_type_label).collect();
        assert_eq!(labels.len(), errors.len());
    }

    #[test]
    fn test_client_message_hides_internal_detail() {
        let err = ScError::Internal("mailbox closed at actor.rs".to_string());
        assert!(!err.client_message().contains("actor.rs"));

        let err = ScError::SignalingTransport("dns lookup for 10.1.2.3 failed".to_string());
        assert!(!err.client_message().contains("10.1.2.3"));
    }

    #[test]
    fn test_transport_errors_map_to_delivery_or_codec() {
        let err = ScError::from(TransportError::Status(503));
        assert!(matches!(&err, ScError::Delivery(msg) if msg.contains("503")));
        assert_eq!(err.error_type_label(), "delivery");

        let err = ScError::from(TransportError::Http("connection reset".to_string()));
        assert!(matches!(err, ScError::Delivery(_)));

        let codec = signal_protocol::decode_message("{").unwrap_err();
        let err = ScError::from(TransportError::Codec(codec));
        assert!(matches!(err, ScError::Codec(_)));
        assert_eq!(err.error_type_label(), "codec");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = ScError::Negotiation {
            peer_id: ParticipantId::from("bob"),
            reason: "remote description rejected".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Negotiation with bob failed: remote description rejected"
        );
    }
}
