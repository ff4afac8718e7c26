//! `PeerActor` - one actor per remote participant.
//!
//! Each `PeerActor`:
//! - Owns exactly one [`PeerLink`] to its remote participant
//! - Processes that peer's negotiation messages strictly in arrival order
//! - Attaches the session's outbound tracks, and re-binds them on change
//! - Emits its own state changes and remote streams to the session
//!
//! Different peers negotiate concurrently because each runs on its own task.
//!
//! # Lifecycle
//!
//! 1. Spawned by the `PeerManagerActor` (initiator on roster-add, responder on
//!    an inbound offer)
//! 2. Creates its link, attaches tracks, and (as initiator) sends the offer
//! 3. Runs until cancelled by the manager (peer left, replaced, or session
//!    ended); closes its link and reports `Closed` on the way out
//!
//! Every await on the link is raced against the actor's cancellation token;
//! a result that arrives after cancellation is dropped.

use super::link::{LinkError, LinkEvent, LinkState, PeerLink, PeerLinkFactory, SenderId};
use super::state::{ConnectionState, NegotiationRole};
use crate::errors::ScError;
use crate::events::{EventSink, SessionEvent};
use crate::media::{MediaTrack, TrackKind};
use crate::observability::metrics;

use common::types::ParticipantId;
use signal_protocol::{IceCandidate, SignalMessage};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the peer mailbox.
const PEER_CHANNEL_BUFFER: usize = 64;

/// Track kinds in the order they are attached to a new link.
const TRACK_ORDER: [TrackKind; 2] = [TrackKind::Audio, TrackKind::Video];

/// Messages handled by a `PeerActor`.
#[derive(Debug)]
pub enum PeerMessage {
    /// Remote offer.
    Offer { sdp: String },
    /// Remote answer to our offer.
    Answer { sdp: String },
    /// Remote ICE candidate.
    Candidate(IceCandidate),
    /// Bind `track` as the outbound track of its kind.
    SetTrack(MediaTrack),
}

/// State change reported back to the manager.
#[derive(Debug, Clone)]
pub struct PeerUpdate {
    pub peer_id: ParticipantId,
    /// Distinguishes a replaced actor from its successor for the same peer.
    pub generation: u64,
    pub state: ConnectionState,
}

/// Everything a peer actor needs from its surroundings.
#[derive(Clone)]
pub struct PeerContext {
    pub local_id: ParticipantId,
    pub factory: Arc<dyn PeerLinkFactory>,
    pub events: EventSink,
    /// Outbound signaling, drained by the session into the router.
    pub outbound: mpsc::UnboundedSender<SignalMessage>,
    pub updates: mpsc::UnboundedSender<PeerUpdate>,
}

/// Handle to a `PeerActor`.
#[derive(Clone, Debug)]
pub struct PeerActorHandle {
    sender: mpsc::Sender<PeerMessage>,
    cancel_token: CancellationToken,
    peer_id: ParticipantId,
    generation: u64,
}

impl PeerActorHandle {
    #[must_use]
    pub fn peer_id(&self) -> &ParticipantId {
        &self.peer_id
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a message for the actor.
    pub async fn send(&self, message: PeerMessage) -> Result<(), ScError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }

    /// Cancel the peer actor. It closes its link and reports `Closed` on
    /// the way out.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Why a negotiation step stopped.
enum Abort {
    Cancelled,
    Failed(LinkError),
}

impl From<LinkError> for Abort {
    fn from(e: LinkError) -> Self {
        Abort::Failed(e)
    }
}

/// Await `fut` unless `token` is cancelled first.
async fn race<F: Future>(token: &CancellationToken, fut: F) -> Result<F::Output, Abort> {
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Abort::Cancelled),
        out = fut => Ok(out),
    }
}

async fn next_link_event(
    events: Option<&mut mpsc::UnboundedReceiver<LinkEvent>>,
) -> Option<LinkEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn no_link() -> Abort {
    Abort::Failed(LinkError::new("link", "no link established"))
}

/// The `PeerActor` implementation.
pub struct PeerActor {
    peer_id: ParticipantId,
    generation: u64,
    role: NegotiationRole,
    state: ConnectionState,
    ctx: PeerContext,
    link: Option<Box<dyn PeerLink>>,
    link_events: Option<mpsc::UnboundedReceiver<LinkEvent>>,
    /// Outbound tracks the session wants sent, by kind.
    tracks: HashMap<TrackKind, MediaTrack>,
    /// Senders on the current link, by kind.
    senders: HashMap<TrackKind, SenderId>,
    /// We have an offer outstanding.
    awaiting_answer: bool,
    receiver: mpsc::Receiver<PeerMessage>,
    cancel_token: CancellationToken,
}

impl PeerActor {
    /// Spawn a new peer actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        peer_id: ParticipantId,
        generation: u64,
        role: NegotiationRole,
        tracks: HashMap<TrackKind, MediaTrack>,
        ctx: PeerContext,
        cancel_token: CancellationToken,
    ) -> (PeerActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(PEER_CHANNEL_BUFFER);

        let actor = Self {
            peer_id: peer_id.clone(),
            generation,
            role,
            state: ConnectionState::New,
            ctx,
            link: None,
            link_events: None,
            tracks,
            senders: HashMap::new(),
            awaiting_answer: false,
            receiver,
            cancel_token: cancel_token.clone(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = PeerActorHandle {
            sender,
            cancel_token,
            peer_id,
            generation,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "sc.peer.connection",
        fields(peer_id = %self.peer_id, generation = self.generation)
    )]
    async fn run(mut self) {
        debug!(
            target: "sc.peer.connection",
            peer_id = %self.peer_id,
            role = ?self.role,
            "PeerActor started"
        );

        let mut exit = self.establish().await;

        while !exit {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sc.peer.connection",
                        peer_id = %self.peer_id,
                        "PeerActor received cancellation signal"
                    );
                    exit = true;
                }

                msg = self.receiver.recv() => {
                    exit = match msg {
                        Some(message) => self.handle_message(message).await,
                        None => true,
                    };
                }

                event = next_link_event(self.link_events.as_mut()) => {
                    match event {
                        Some(event) => {
                            let result = self.handle_link_event(event);
                            exit = self.settle(result);
                        }
                        // Link dropped its event channel; keep serving the mailbox.
                        None => self.link_events = None,
                    }
                }
            }
        }

        self.shutdown_link().await;

        debug!(
            target: "sc.peer.connection",
            peer_id = %self.peer_id,
            state = %self.state,
            "PeerActor stopped"
        );
    }

    /// Create the link and, as initiator, send the first offer.
    ///
    /// Returns true if the actor should exit.
    async fn establish(&mut self) -> bool {
        let mut result = self.open_link().await;
        if result.is_ok() && self.role == NegotiationRole::Initiator {
            result = self.send_offer().await;
        }
        self.settle(result)
    }

    /// Handle a mailbox message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: PeerMessage) -> bool {
        let result = match message {
            PeerMessage::Offer { sdp } => self.handle_offer(&sdp).await,
            PeerMessage::Answer { sdp } => self.handle_answer(&sdp).await,
            PeerMessage::Candidate(candidate) => self.handle_candidate(candidate).await,
            PeerMessage::SetTrack(track) => self.handle_set_track(track).await,
        };

        self.settle(result)
    }

    /// Fold a step outcome into actor state. Returns true if the actor should exit.
    fn settle(&mut self, result: Result<(), Abort>) -> bool {
        match result {
            Ok(()) => false,
            Err(Abort::Cancelled) => true,
            Err(Abort::Failed(e)) => {
                self.fail(&e.to_string());
                false
            }
        }
    }

    async fn open_link(&mut self) -> Result<(), Abort> {
        let factory = Arc::clone(&self.ctx.factory);
        let (link, events) = race(&self.cancel_token, factory.create(&self.peer_id)).await??;

        self.link = Some(link);
        self.link_events = Some(events);
        self.senders.clear();

        let link = self.link.as_mut().ok_or_else(no_link)?;
        for kind in TRACK_ORDER {
            if let Some(track) = self.tracks.get(&kind) {
                let sender = race(&self.cancel_token, link.add_track(track.clone())).await??;
                self.senders.insert(kind, sender);
            }
        }

        Ok(())
    }

    async fn send_offer(&mut self) -> Result<(), Abort> {
        let link = self.link.as_mut().ok_or_else(no_link)?;
        let sdp = race(&self.cancel_token, link.create_offer()).await??;

        self.awaiting_answer = true;
        if self.state == ConnectionState::New {
            self.set_state(ConnectionState::Connecting);
        }
        self.send_signal(SignalMessage::offer(
            self.ctx.local_id.clone(),
            self.peer_id.clone(),
            sdp,
        ));

        debug!(target: "sc.peer.connection", peer_id = %self.peer_id, "Offer sent");
        Ok(())
    }

    async fn handle_offer(&mut self, sdp: &str) -> Result<(), Abort> {
        if !self.state.is_usable() {
            debug!(
                target: "sc.peer.connection",
                peer_id = %self.peer_id,
                state = %self.state,
                "Ignoring offer on unusable connection"
            );
            return Ok(());
        }

        if self.awaiting_answer {
            // Both sides offered at once. The smaller id yields and answers.
            if self.ctx.local_id < self.peer_id {
                info!(
                    target: "sc.peer.connection",
                    peer_id = %self.peer_id,
                    "Offer collision, yielding and restarting as responder"
                );
                self.restart_as_responder().await?;
            } else {
                debug!(
                    target: "sc.peer.connection",
                    peer_id = %self.peer_id,
                    "Offer collision, keeping our offer"
                );
                return Ok(());
            }
        }

        let link = self.link.as_mut().ok_or_else(no_link)?;
        race(&self.cancel_token, link.apply_offer(sdp)).await??;
        let answer = race(&self.cancel_token, link.create_answer()).await??;

        if self.state == ConnectionState::New {
            self.set_state(ConnectionState::Connecting);
        }
        self.send_signal(SignalMessage::answer(
            self.ctx.local_id.clone(),
            self.peer_id.clone(),
            answer,
        ));

        debug!(target: "sc.peer.connection", peer_id = %self.peer_id, "Answer sent");
        Ok(())
    }

    async fn restart_as_responder(&mut self) -> Result<(), Abort> {
        if let Some(mut old) = self.link.take() {
            old.close().await;
        }
        self.link_events = None;
        self.awaiting_answer = false;
        self.role = NegotiationRole::Responder;
        self.open_link().await
    }

    async fn handle_answer(&mut self, sdp: &str) -> Result<(), Abort> {
        if !self.awaiting_answer {
            debug!(
                target: "sc.peer.connection",
                peer_id = %self.peer_id,
                role = ?self.role,
                "Ignoring answer without outstanding offer"
            );
            return Ok(());
        }

        let link = self.link.as_mut().ok_or_else(no_link)?;
        race(&self.cancel_token, link.apply_answer(sdp)).await??;
        self.awaiting_answer = false;

        debug!(target: "sc.peer.connection", peer_id = %self.peer_id, "Answer applied");
        Ok(())
    }

    async fn handle_candidate(&mut self, candidate: IceCandidate) -> Result<(), Abort> {
        let Some(link) = self.link.as_mut() else {
            debug!(
                target: "sc.peer.connection",
                peer_id = %self.peer_id,
                "Discarding candidate without link"
            );
            return Ok(());
        };

        // A bad candidate does not doom the connection; others may work.
        if let Err(e) = race(&self.cancel_token, link.add_ice_candidate(candidate)).await? {
            warn!(
                target: "sc.peer.connection",
                peer_id = %self.peer_id,
                error = %e,
                "Remote candidate rejected"
            );
        }
        Ok(())
    }

    async fn handle_set_track(&mut self, track: MediaTrack) -> Result<(), Abort> {
        let kind = track.kind();
        self.tracks.insert(kind, track.clone());

        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };

        if let Some(sender) = self.senders.get(&kind).copied() {
            race(&self.cancel_token, link.replace_track(sender, track)).await??;
            debug!(
                target: "sc.peer.connection",
                peer_id = %self.peer_id,
                kind = %kind,
                "Outbound track replaced"
            );
            return Ok(());
        }

        let sender = race(&self.cancel_token, link.add_track(track)).await??;
        self.senders.insert(kind, sender);
        debug!(
            target: "sc.peer.connection",
            peer_id = %self.peer_id,
            kind = %kind,
            "Outbound track added"
        );

        // A new m-line needs a fresh offer once the first exchange is done.
        if self.state.is_usable() && self.state != ConnectionState::New && !self.awaiting_answer {
            self.send_offer().await?;
        }
        Ok(())
    }

    fn handle_link_event(&mut self, event: LinkEvent) -> Result<(), Abort> {
        match event {
            LinkEvent::LocalCandidate(candidate) => {
                self.send_signal(SignalMessage::ice_candidate(
                    self.ctx.local_id.clone(),
                    self.peer_id.clone(),
                    candidate,
                ));
            }
            LinkEvent::StateChanged(LinkState::Connected) => {
                self.set_state(ConnectionState::Connected);
            }
            LinkEvent::StateChanged(LinkState::Disconnected) => {
                self.set_state(ConnectionState::Disconnected);
            }
            LinkEvent::StateChanged(LinkState::Failed) => {
                return Err(Abort::Failed(LinkError::new("link", "connectivity failed")));
            }
            LinkEvent::RemoteStream(stream) => {
                if self.state.is_usable() {
                    self.ctx.events.emit(SessionEvent::RemoteStreamAdded {
                        peer_id: self.peer_id.clone(),
                        stream,
                    });
                }
            }
            LinkEvent::Error(reason) => {
                return Err(Abort::Failed(LinkError::new("link", reason)));
            }
        }
        Ok(())
    }

    fn fail(&mut self, reason: &str) {
        if !self.state.is_usable() {
            return;
        }

        let err = ScError::Negotiation {
            peer_id: self.peer_id.clone(),
            reason: reason.to_string(),
        };
        warn!(
            target: "sc.peer.connection",
            peer_id = %self.peer_id,
            error = %err,
            "Peer connection failed"
        );
        metrics::record_negotiation_failure();
        self.awaiting_answer = false;
        self.set_state(ConnectionState::Failed);
    }

    async fn shutdown_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close().await;
        }
        self.link_events = None;
        if !self.state.is_terminal() {
            self.set_state(ConnectionState::Closed);
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        match self.state.transition(next) {
            Ok(state) => {
                self.state = state;
                metrics::record_connection_state(state.as_str());
                self.ctx.events.emit(SessionEvent::ConnectionStateChanged {
                    peer_id: self.peer_id.clone(),
                    state,
                });
                let _ = self.ctx.updates.send(PeerUpdate {
                    peer_id: self.peer_id.clone(),
                    generation: self.generation,
                    state,
                });
            }
            Err(e) => {
                debug!(
                    target: "sc.peer.connection",
                    peer_id = %self.peer_id,
                    error = %e,
                    "Ignoring state change"
                );
            }
        }
    }

    fn send_signal(&self, message: SignalMessage) {
        if self.ctx.outbound.send(message).is_err() {
            debug!(
                target: "sc.peer.connection",
                peer_id = %self.peer_id,
                "Outbound signaling closed, dropping message"
            );
        }
    }
}
