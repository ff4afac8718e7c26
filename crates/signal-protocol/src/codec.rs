//! JSON wire codec for signaling messages.
//!
//! Wire shape:
//!
//! ```text
//! { "type": "join" | "leave" | "offer" | "answer" | "ice_candidate",
//!   "sender": "<participant-id>",
//!   "target": "<participant-id>" | null,
//!   "timestamp": <ms since epoch>,          (omitted when unset)
//!   "payload": { ... } }
//! ```
//!
//! [`WireMessage`] mirrors that shape one-to-one and is what transports
//! (de)serialize in bulk, e.g. the array returned by a poll. Conversion into a
//! typed [`SignalMessage`] validates the payload against the kind and rejects
//! negotiation messages without a target.

use crate::message::{
    IceCandidate, ParticipantAnnouncement, SessionDescription, SignalBody, SignalKind,
    SignalMessage,
};
use common::types::ParticipantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Input is not valid JSON or does not match the envelope shape
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Offer, answer or ICE candidate without a target
    #[error("Missing target for {0} message")]
    MissingTarget(SignalKind),

    /// Payload does not match the message type
    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Message kind whose payload failed to parse
        kind: SignalKind,
        /// Parser diagnostic
        reason: String,
    },
}

/// Raw wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub sender: ParticipantId,
    #[serde(default)]
    pub target: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub payload: Value,
}

impl From<&SignalMessage> for WireMessage {
    fn from(msg: &SignalMessage) -> Self {
        let payload = match &msg.body {
            SignalBody::Join(announcement) => serde_json::json!({
                "display_name": announcement.display_name,
            }),
            SignalBody::Leave => Value::Null,
            SignalBody::Offer(desc) | SignalBody::Answer(desc) => serde_json::json!({
                "sdp": desc.sdp,
            }),
            SignalBody::IceCandidate(candidate) => serde_json::json!({
                "candidate": candidate.candidate,
                "sdp_mid": candidate.sdp_mid,
                "sdp_m_line_index": candidate.sdp_m_line_index,
            }),
        };

        Self {
            kind: msg.kind(),
            sender: msg.sender.clone(),
            target: msg.target.clone(),
            timestamp: msg.timestamp,
            payload,
        }
    }
}

impl TryFrom<WireMessage> for SignalMessage {
    type Error = CodecError;

    fn try_from(wire: WireMessage) -> Result<Self, Self::Error> {
        if wire.kind.requires_target() && wire.target.is_none() {
            return Err(CodecError::MissingTarget(wire.kind));
        }

        let kind = wire.kind;
        let body = match kind {
            SignalKind::Join => {
                SignalBody::Join(parse_payload::<ParticipantAnnouncement>(kind, wire.payload)?)
            }
            // Leave carries no required payload; whatever is there is ignored.
            SignalKind::Leave => SignalBody::Leave,
            SignalKind::Offer => {
                SignalBody::Offer(parse_payload::<SessionDescription>(kind, wire.payload)?)
            }
            SignalKind::Answer => {
                SignalBody::Answer(parse_payload::<SessionDescription>(kind, wire.payload)?)
            }
            SignalKind::IceCandidate => {
                SignalBody::IceCandidate(parse_payload::<IceCandidate>(kind, wire.payload)?)
            }
        };

        Ok(Self {
            sender: wire.sender,
            target: wire.target,
            timestamp: wire.timestamp,
            body,
        })
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    kind: SignalKind,
    payload: Value,
) -> Result<T, CodecError> {
    serde_json::from_value(payload).map_err(|e| CodecError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

/// Encode a signaling message to its JSON text form
///
/// # Errors
///
/// Returns an error if serialization fails
pub fn encode_message(msg: &SignalMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&WireMessage::from(msg))?)
}

/// Decode a signaling message from JSON text
///
/// # Errors
///
/// Returns an error if the text is not a valid envelope, the payload does not
/// match the type, or a negotiation message has no target
pub fn decode_message(text: &str) -> Result<SignalMessage, CodecError> {
    let wire: WireMessage = serde_json::from_str(text)?;
    SignalMessage::try_from(wire)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    #[test]
    fn test_encode_join_shape() {
        let msg = SignalMessage::join(pid("alice"), "Alice");
        let json: Value = serde_json::from_str(&encode_message(&msg).unwrap()).unwrap();

        assert_eq!(json["type"], "join");
        assert_eq!(json["sender"], "alice");
        assert!(json["target"].is_null());
        assert!(json.get("timestamp").is_none());
        assert_eq!(json["payload"]["display_name"], "Alice");
    }

    #[test]
    fn test_decode_ice_candidate_with_server_timestamp() {
        let text = r#"{
            "type": "ice_candidate",
            "sender": "bob",
            "target": "alice",
            "timestamp": 1700000000123,
            "payload": {"candidate": "candidate:1 1 udp 2122 10.0.0.1 5000 typ host",
                        "sdp_mid": "0", "sdp_m_line_index": 0}
        }"#;

        let msg = decode_message(text).unwrap();
        assert_eq!(msg.sender, pid("bob"));
        assert_eq!(msg.target, Some(pid("alice")));
        assert_eq!(msg.timestamp, Some(1_700_000_000_123));
        match msg.body {
            SignalBody::IceCandidate(c) => {
                assert_eq!(c.sdp_mid.as_deref(), Some("0"));
                assert_eq!(c.sdp_m_line_index, Some(0));
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn test_decode_offer_without_target_is_rejected() {
        let text = r#"{"type": "offer", "sender": "bob", "payload": {"sdp": "v=0"}}"#;
        assert!(matches!(
            decode_message(text),
            Err(CodecError::MissingTarget(SignalKind::Offer))
        ));
    }

    #[test]
    fn test_decode_answer_with_wrong_payload_is_rejected() {
        let text =
            r#"{"type": "answer", "sender": "bob", "target": "alice", "payload": {"x": 1}}"#;
        assert!(matches!(
            decode_message(text),
            Err(CodecError::InvalidPayload {
                kind: SignalKind::Answer,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_leave_tolerates_missing_or_null_payload() {
        let a = decode_message(r#"{"type": "leave", "sender": "bob"}"#).unwrap();
        let b = decode_message(r#"{"type": "leave", "sender": "bob", "payload": null}"#).unwrap();
        let c = decode_message(
            r#"{"type": "leave", "sender": "bob", "payload": {"display_name": "Bob"}}"#,
        )
        .unwrap();

        for msg in [a, b, c] {
            assert_eq!(msg.body, SignalBody::Leave);
            assert!(msg.is_broadcast());
        }
    }

    #[test]
    fn test_decode_unknown_type_is_rejected() {
        let text = r#"{"type": "renegotiate", "sender": "bob", "payload": {}}"#;
        assert!(matches!(
            decode_message(text),
            Err(CodecError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_wire_batch_decodes_individually() {
        let text = r#"[
            {"type": "join", "sender": "a", "target": null, "timestamp": 1, "payload": {"display_name": "A"}},
            {"type": "offer", "sender": "b", "payload": {"sdp": "v=0"}}
        ]"#;
        let batch: Vec<WireMessage> = serde_json::from_str(text).unwrap();
        let mut results = batch.into_iter().map(SignalMessage::try_from);

        assert!(results.next().unwrap().is_ok());
        assert!(results.next().unwrap().is_err());
        assert!(results.next().is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_decode_never_panics_on_arbitrary_text(text in ".{0,128}") {
            let _ = decode_message(&text);
        }

        #[test]
        fn prop_offer_survives_encoding(sender in "[a-z0-9-]{1,16}", target in "[a-z0-9-]{1,16}", sdp in ".{0,64}") {
            let msg = SignalMessage::offer(pid(&sender), pid(&target), sdp);
            let decoded = decode_message(&encode_message(&msg).unwrap()).unwrap();
            prop_assert_eq!(decoded, msg);
        }
    }
}
