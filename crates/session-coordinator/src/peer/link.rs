//! Peer link seam.
//!
//! A [`PeerLink`] is the ICE/DTLS/RTP engine behind one connection. The
//! coordinator only drives its negotiation surface; everything media-plane is
//! the link's business. Links report asynchronous happenings (trickled
//! candidates, connectivity changes, remote media) on the event channel
//! returned by [`PeerLinkFactory::create`].

use crate::media::{MediaStream, MediaTrack};
use async_trait::async_trait;
use common::types::ParticipantId;
use signal_protocol::IceCandidate;
use thiserror::Error;
use tokio::sync::mpsc;

/// Opaque handle to an outbound track slot on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(pub u64);

/// Connectivity reported by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    Failed,
}

/// Asynchronous event raised by a link.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A local ICE candidate to trickle to the remote side.
    LocalCandidate(IceCandidate),
    /// Connectivity changed.
    StateChanged(LinkState),
    /// The remote side started sending a stream.
    RemoteStream(MediaStream),
    /// Unrecoverable link error.
    Error(String),
}

/// Link operation failure.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {reason}")]
pub struct LinkError {
    pub operation: &'static str,
    pub reason: String,
}

impl LinkError {
    #[must_use]
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// Negotiation surface of one peer link.
#[async_trait]
pub trait PeerLink: Send {
    async fn add_track(&mut self, track: MediaTrack) -> Result<SenderId, LinkError>;

    async fn replace_track(&mut self, sender: SenderId, track: MediaTrack) -> Result<(), LinkError>;

    /// Create an offer and apply it as the local description. Returns the SDP.
    async fn create_offer(&mut self) -> Result<String, LinkError>;

    /// Apply a remote offer.
    async fn apply_offer(&mut self, sdp: &str) -> Result<(), LinkError>;

    /// Create an answer to the applied remote offer and apply it locally.
    async fn create_answer(&mut self) -> Result<String, LinkError>;

    /// Apply a remote answer to our outstanding offer.
    async fn apply_answer(&mut self, sdp: &str) -> Result<(), LinkError>;

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), LinkError>;

    /// Tear the link down. Idempotent.
    async fn close(&mut self);
}

/// Creates links, one per remote participant.
#[async_trait]
pub trait PeerLinkFactory: Send + Sync {
    /// Create a fresh link to `peer_id` and the channel it reports events on.
    async fn create(
        &self,
        peer_id: &ParticipantId,
    ) -> Result<(Box<dyn PeerLink>, mpsc::UnboundedReceiver<LinkEvent>), LinkError>;
}
