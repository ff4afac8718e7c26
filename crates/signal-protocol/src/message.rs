//! Signaling message types.

use common::types::ParticipantId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of signaling message, as written in the wire `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Participant announces itself
    Join,
    /// Participant departs
    Leave,
    /// Session description offer
    Offer,
    /// Session description answer
    Answer,
    /// Trickled ICE candidate
    IceCandidate,
}

impl SignalKind {
    /// Wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Leave => "leave",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice_candidate",
        }
    }

    /// Negotiation messages are point-to-point and must name a target.
    #[must_use]
    pub const fn requires_target(self) -> bool {
        matches!(self, Self::Offer | Self::Answer | Self::IceCandidate)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a join message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantAnnouncement {
    /// Human readable name shown to other participants
    pub display_name: String,
}

/// An SDP blob, opaque to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Raw SDP text
    pub sdp: String,
}

/// A trickled ICE candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default)]
    pub sdp_mid: Option<String>,
    /// Index of the m-line the candidate belongs to
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

/// Typed body of a signaling message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalBody {
    Join(ParticipantAnnouncement),
    Leave,
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
}

impl SignalBody {
    /// Kind tag for this body.
    #[must_use]
    pub const fn kind(&self) -> SignalKind {
        match self {
            Self::Join(_) => SignalKind::Join,
            Self::Leave => SignalKind::Leave,
            Self::Offer(_) => SignalKind::Offer,
            Self::Answer(_) => SignalKind::Answer,
            Self::IceCandidate(_) => SignalKind::IceCandidate,
        }
    }
}

/// A signaling message exchanged between participants of a session.
///
/// `target` is `None` for broadcasts (a join announcing a newcomer, a leave).
/// `timestamp` is stamped by the signaling server in milliseconds since the
/// Unix epoch; locally built messages leave it unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMessage {
    pub sender: ParticipantId,
    pub target: Option<ParticipantId>,
    pub timestamp: Option<i64>,
    pub body: SignalBody,
}

impl SignalMessage {
    /// Broadcast join announcing `sender` to the session.
    #[must_use]
    pub fn join(sender: ParticipantId, display_name: impl Into<String>) -> Self {
        Self {
            sender,
            target: None,
            timestamp: None,
            body: SignalBody::Join(ParticipantAnnouncement {
                display_name: display_name.into(),
            }),
        }
    }

    /// Join addressed to a single participant, used to answer a newcomer.
    #[must_use]
    pub fn join_to(
        sender: ParticipantId,
        target: ParticipantId,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            target: Some(target),
            ..Self::join(sender, display_name)
        }
    }

    /// Broadcast leave.
    #[must_use]
    pub fn leave(sender: ParticipantId) -> Self {
        Self {
            sender,
            target: None,
            timestamp: None,
            body: SignalBody::Leave,
        }
    }

    #[must_use]
    pub fn offer(sender: ParticipantId, target: ParticipantId, sdp: impl Into<String>) -> Self {
        Self::directed(
            sender,
            target,
            SignalBody::Offer(SessionDescription { sdp: sdp.into() }),
        )
    }

    #[must_use]
    pub fn answer(sender: ParticipantId, target: ParticipantId, sdp: impl Into<String>) -> Self {
        Self::directed(
            sender,
            target,
            SignalBody::Answer(SessionDescription { sdp: sdp.into() }),
        )
    }

    #[must_use]
    pub fn ice_candidate(
        sender: ParticipantId,
        target: ParticipantId,
        candidate: IceCandidate,
    ) -> Self {
        Self::directed(sender, target, SignalBody::IceCandidate(candidate))
    }

    fn directed(sender: ParticipantId, target: ParticipantId, body: SignalBody) -> Self {
        Self {
            sender,
            target: Some(target),
            timestamp: None,
            body,
        }
    }

    /// Kind tag of the body.
    #[must_use]
    pub const fn kind(&self) -> SignalKind {
        self.body.kind()
    }

    /// True if the message is not addressed to a specific participant.
    #[must_use]
    pub const fn is_broadcast(&self) -> bool {
        self.target.is_none()
    }

    /// True if a participant with id `local` should process this message:
    /// it was sent by someone else and is either broadcast or targeted at
    /// `local`.
    #[must_use]
    pub fn is_relevant_to(&self, local: &ParticipantId) -> bool {
        if &self.sender == local {
            return false;
        }
        self.target.as_ref().map_or(true, |t| t == local)
    }
}
