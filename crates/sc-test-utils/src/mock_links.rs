//! Mock peer links.
//!
//! [`MockPeerLinkFactory`] hands out links that record every operation and
//! whose event channels tests can drive with [`MockPeerLinkFactory::emit`].
//! Links are tracked per peer in creation order, so a restarted connection
//! shows up as a second link to the same peer.

use async_trait::async_trait;
use common::types::ParticipantId;
use session_coordinator::media::{MediaTrack, TrackKind};
use session_coordinator::peer::{LinkError, LinkEvent, PeerLink, PeerLinkFactory, SenderId};
use signal_protocol::IceCandidate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// One recorded link operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp {
    AddTrack { kind: TrackKind, track_id: String },
    ReplaceTrack { kind: TrackKind, track_id: String },
    CreateOffer,
    ApplyOffer(String),
    CreateAnswer,
    ApplyAnswer(String),
    AddIceCandidate(String),
    Close,
}

#[derive(Debug)]
struct LinkRecord {
    ops: Vec<LinkOp>,
    /// Current track per sender slot.
    senders: HashMap<u64, MediaTrack>,
    events: mpsc::UnboundedSender<LinkEvent>,
    closed: bool,
}

type Links = Arc<Mutex<HashMap<ParticipantId, Vec<LinkRecord>>>>;

/// Mock link factory.
#[derive(Debug, Clone, Default)]
pub struct MockPeerLinkFactory {
    links: Links,
    fail_create: bool,
    fail_offer: bool,
    create_count: Arc<AtomicUsize>,
}

impl MockPeerLinkFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `create` fails.
    #[must_use]
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Every `create_offer` fails.
    #[must_use]
    pub fn failing_offer(mut self) -> Self {
        self.fail_offer = true;
        self
    }

    /// Total links created across all peers.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    /// Links created for `peer`.
    #[must_use]
    pub fn link_count(&self, peer: &str) -> usize {
        self.links
            .lock()
            .unwrap()
            .get(&ParticipantId::from(peer))
            .map_or(0, Vec::len)
    }

    /// Links to `peer` that have not been closed.
    #[must_use]
    pub fn open_link_count(&self, peer: &str) -> usize {
        self.links
            .lock()
            .unwrap()
            .get(&ParticipantId::from(peer))
            .map_or(0, |links| links.iter().filter(|l| !l.closed).count())
    }

    /// Operations on the latest link to `peer`.
    #[must_use]
    pub fn ops(&self, peer: &str) -> Vec<LinkOp> {
        self.with_latest(peer, |link| link.ops.clone())
            .unwrap_or_default()
    }

    /// Whether the latest link to `peer` is closed.
    #[must_use]
    pub fn is_closed(&self, peer: &str) -> bool {
        self.with_latest(peer, |link| link.closed).unwrap_or(false)
    }

    /// Track id currently sent for `kind` on the latest link to `peer`.
    #[must_use]
    pub fn sending(&self, peer: &str, kind: TrackKind) -> Option<String> {
        self.with_latest(peer, |link| {
            link.senders
                .values()
                .find(|t| t.kind() == kind)
                .map(|t| t.id().to_string())
        })
        .flatten()
    }

    /// Raise `event` on the latest link to `peer`.
    pub fn emit(&self, peer: &str, event: LinkEvent) {
        self.with_latest(peer, |link| {
            let _ = link.events.send(event);
        });
    }

    /// Every peer that has had a link, ordered by id.
    #[must_use]
    pub fn peers(&self) -> Vec<ParticipantId> {
        let mut peers: Vec<_> = self.links.lock().unwrap().keys().cloned().collect();
        peers.sort();
        peers
    }

    fn with_latest<T>(&self, peer: &str, f: impl FnOnce(&LinkRecord) -> T) -> Option<T> {
        let links = self.links.lock().unwrap();
        links.get(&ParticipantId::from(peer)).and_then(|l| l.last()).map(f)
    }
}

#[async_trait]
impl PeerLinkFactory for MockPeerLinkFactory {
    async fn create(
        &self,
        peer_id: &ParticipantId,
    ) -> Result<(Box<dyn PeerLink>, mpsc::UnboundedReceiver<LinkEvent>), LinkError> {
        self.create_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_create {
            return Err(LinkError::new("create", "mock create failure"));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut links = self.links.lock().unwrap();
        let records = links.entry(peer_id.clone()).or_default();
        records.push(LinkRecord {
            ops: Vec::new(),
            senders: HashMap::new(),
            events: events_tx,
            closed: false,
        });

        let link = MockPeerLink {
            peer_id: peer_id.clone(),
            index: records.len() - 1,
            links: Arc::clone(&self.links),
            fail_offer: self.fail_offer,
            next_sender: 0,
        };
        Ok((Box::new(link), events_rx))
    }
}

/// A link handed out by [`MockPeerLinkFactory`].
#[derive(Debug)]
pub struct MockPeerLink {
    peer_id: ParticipantId,
    index: usize,
    links: Links,
    fail_offer: bool,
    next_sender: u64,
}

impl MockPeerLink {
    fn record<T>(&self, f: impl FnOnce(&mut LinkRecord) -> T) -> T {
        let mut links = self.links.lock().unwrap();
        let record = links
            .get_mut(&self.peer_id)
            .and_then(|l| l.get_mut(self.index))
            .expect("link record exists for every created link");
        f(record)
    }
}

#[async_trait]
impl PeerLink for MockPeerLink {
    async fn add_track(&mut self, track: MediaTrack) -> Result<SenderId, LinkError> {
        self.next_sender += 1;
        let sender = self.next_sender;
        self.record(|link| {
            link.ops.push(LinkOp::AddTrack {
                kind: track.kind(),
                track_id: track.id().to_string(),
            });
            link.senders.insert(sender, track);
        });
        Ok(SenderId(sender))
    }

    async fn replace_track(&mut self, sender: SenderId, track: MediaTrack) -> Result<(), LinkError> {
        self.record(|link| {
            if !link.senders.contains_key(&sender.0) {
                return Err(LinkError::new("replace_track", "unknown sender"));
            }
            link.ops.push(LinkOp::ReplaceTrack {
                kind: track.kind(),
                track_id: track.id().to_string(),
            });
            link.senders.insert(sender.0, track);
            Ok(())
        })
    }

    async fn create_offer(&mut self) -> Result<String, LinkError> {
        if self.fail_offer {
            return Err(LinkError::new("create_offer", "mock offer failure"));
        }
        self.record(|link| link.ops.push(LinkOp::CreateOffer));
        Ok(format!("mock-offer-{}-{}", self.peer_id, self.index))
    }

    async fn apply_offer(&mut self, sdp: &str) -> Result<(), LinkError> {
        self.record(|link| link.ops.push(LinkOp::ApplyOffer(sdp.to_string())));
        Ok(())
    }

    async fn create_answer(&mut self) -> Result<String, LinkError> {
        self.record(|link| link.ops.push(LinkOp::CreateAnswer));
        Ok(format!("mock-answer-{}-{}", self.peer_id, self.index))
    }

    async fn apply_answer(&mut self, sdp: &str) -> Result<(), LinkError> {
        self.record(|link| link.ops.push(LinkOp::ApplyAnswer(sdp.to_string())));
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), LinkError> {
        self.record(|link| link.ops.push(LinkOp::AddIceCandidate(candidate.candidate)));
        Ok(())
    }

    async fn close(&mut self) {
        self.record(|link| {
            if !link.closed {
                link.ops.push(LinkOp::Close);
                link.closed = true;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_links_record_ops_per_peer() {
        let factory = MockPeerLinkFactory::new();
        let bob = ParticipantId::from("bob");

        let (mut link, _events) = factory.create(&bob).await.unwrap();
        let track = MediaTrack::new(TrackKind::Audio, "mic");
        link.add_track(track.clone()).await.unwrap();
        link.create_offer().await.unwrap();
        link.close().await;
        link.close().await;

        assert_eq!(factory.link_count("bob"), 1);
        assert_eq!(factory.open_link_count("bob"), 0);
        assert_eq!(
            factory.ops("bob"),
            vec![
                LinkOp::AddTrack {
                    kind: TrackKind::Audio,
                    track_id: track.id().to_string(),
                },
                LinkOp::CreateOffer,
                LinkOp::Close,
            ]
        );
        assert_eq!(
            factory.sending("bob", TrackKind::Audio),
            Some(track.id().to_string())
        );
    }

    #[tokio::test]
    async fn test_emit_reaches_latest_link() {
        let factory = MockPeerLinkFactory::new();
        let (_link, mut events) = factory.create(&ParticipantId::from("bob")).await.unwrap();

        factory.emit("bob", LinkEvent::Error("boom".to_string()));
        assert!(matches!(events.recv().await, Some(LinkEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_failing_create() {
        let factory = MockPeerLinkFactory::new().failing_create();
        assert!(factory.create(&ParticipantId::from("bob")).await.is_err());
        assert_eq!(factory.create_count(), 1);
    }
}
