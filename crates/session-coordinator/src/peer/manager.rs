//! `PeerManagerActor` - owns every peer connection of a session.
//!
//! The manager guarantees at most one live `PeerActor` per remote participant.
//! Starting a connection to a peer that already has one closes the old actor
//! first (the remote restarted its session). It also holds the session's
//! current outbound tracks, so new connections start with them and existing
//! connections are re-bound when one changes.

use super::connection::{PeerActor, PeerActorHandle, PeerContext, PeerMessage, PeerUpdate};
use super::link::PeerLinkFactory;
use super::state::{ConnectionState, NegotiationRole};
use crate::errors::ScError;
use crate::events::EventSink;
use crate::media::{MediaTrack, TrackKind};
use crate::observability::metrics;

use common::types::ParticipantId;
use signal_protocol::{SignalBody, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the manager mailbox.
const MANAGER_CHANNEL_BUFFER: usize = 256;

/// How long to wait for a cancelled peer actor to finish.
const PEER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages handled by the `PeerManagerActor`.
#[derive(Debug)]
pub enum ManagerMessage {
    /// Start (or restart) a connection to `peer_id` as initiator.
    Connect { peer_id: ParticipantId },
    /// Inbound offer, answer or ICE candidate.
    Signal(SignalMessage),
    /// Close and forget the connection to `peer_id`.
    Remove { peer_id: ParticipantId },
    /// Bind `track` as the outbound track of its kind on every connection.
    SetTrack(MediaTrack),
    /// Snapshot of connection states.
    GetStates {
        respond_to: oneshot::Sender<Vec<(ParticipantId, ConnectionState)>>,
    },
    /// Close every connection and stop. Replies once all have reported `Closed`.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Handle to the `PeerManagerActor`.
#[derive(Clone, Debug)]
pub struct PeerManagerHandle {
    sender: mpsc::Sender<ManagerMessage>,
    cancel_token: CancellationToken,
}

impl PeerManagerHandle {
    /// Start a connection to `peer_id` as initiator, replacing any existing one.
    pub async fn connect(&self, peer_id: ParticipantId) -> Result<(), ScError> {
        self.send(ManagerMessage::Connect { peer_id }).await
    }

    /// Route an inbound negotiation message to its peer.
    pub async fn deliver(&self, message: SignalMessage) -> Result<(), ScError> {
        self.send(ManagerMessage::Signal(message)).await
    }

    pub async fn remove(&self, peer_id: ParticipantId) -> Result<(), ScError> {
        self.send(ManagerMessage::Remove { peer_id }).await
    }

    pub async fn set_track(&self, track: MediaTrack) -> Result<(), ScError> {
        self.send(ManagerMessage::SetTrack(track)).await
    }

    /// Current state of every connection, ordered by peer id.
    pub async fn connection_states(&self) -> Result<Vec<(ParticipantId, ConnectionState)>, ScError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerMessage::GetStates { respond_to: tx }).await?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Close every connection and stop the manager.
    pub async fn shutdown(&self) -> Result<(), ScError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerMessage::Shutdown { respond_to: tx }).await?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the manager and every peer under it.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    async fn send(&self, message: ManagerMessage) -> Result<(), ScError> {
        self.sender
            .send(message)
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))
    }
}

/// Managed peer state.
struct ManagedPeer {
    handle: PeerActorHandle,
    task_handle: JoinHandle<()>,
    state: ConnectionState,
}

/// The `PeerManagerActor` implementation.
pub struct PeerManagerActor {
    local_id: ParticipantId,
    peers: HashMap<ParticipantId, ManagedPeer>,
    /// Current outbound tracks, by kind.
    tracks: HashMap<TrackKind, MediaTrack>,
    ctx: PeerContext,
    next_generation: u64,
    updates: mpsc::UnboundedReceiver<PeerUpdate>,
    receiver: mpsc::Receiver<ManagerMessage>,
    cancel_token: CancellationToken,
}

impl PeerManagerActor {
    /// Spawn the manager.
    ///
    /// Outbound negotiation messages produced by any peer are sent on
    /// `outbound`; state changes and remote streams go to `events`.
    pub fn spawn(
        local_id: ParticipantId,
        factory: Arc<dyn PeerLinkFactory>,
        events: EventSink,
        outbound: mpsc::UnboundedSender<SignalMessage>,
        cancel_token: CancellationToken,
    ) -> (PeerManagerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(MANAGER_CHANNEL_BUFFER);
        let (updates_tx, updates) = mpsc::unbounded_channel();

        let actor = Self {
            local_id: local_id.clone(),
            peers: HashMap::new(),
            tracks: HashMap::new(),
            ctx: PeerContext {
                local_id,
                factory,
                events,
                outbound,
                updates: updates_tx,
            },
            next_generation: 0,
            updates,
            receiver,
            cancel_token: cancel_token.clone(),
        };

        let task_handle = tokio::spawn(actor.run());

        (
            PeerManagerHandle {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    #[instrument(skip_all, name = "sc.peer", fields(local_id = %self.local_id))]
    async fn run(mut self) {
        debug!(target: "sc.peer", local_id = %self.local_id, "PeerManagerActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sc.peer",
                        local_id = %self.local_id,
                        "PeerManagerActor received cancellation signal"
                    );
                    self.close_all().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if self.handle_message(message).await {
                                break;
                            }
                        }
                        None => {
                            self.close_all().await;
                            break;
                        }
                    }
                }

                Some(update) = self.updates.recv() => {
                    self.handle_update(&update);
                }
            }
        }

        debug!(target: "sc.peer", local_id = %self.local_id, "PeerManagerActor stopped");
    }

    /// Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ManagerMessage) -> bool {
        match message {
            ManagerMessage::Connect { peer_id } => {
                if self.peers.contains_key(&peer_id) {
                    info!(
                        target: "sc.peer",
                        peer_id = %peer_id,
                        "Replacing existing connection"
                    );
                    self.close_peer(&peer_id).await;
                }
                self.spawn_peer(peer_id, NegotiationRole::Initiator);
            }
            ManagerMessage::Signal(message) => self.handle_signal(message).await,
            ManagerMessage::Remove { peer_id } => self.close_peer(&peer_id).await,
            ManagerMessage::SetTrack(track) => self.handle_set_track(track).await,
            ManagerMessage::GetStates { respond_to } => {
                let mut states: Vec<_> = self
                    .peers
                    .iter()
                    .map(|(id, managed)| (id.clone(), managed.state))
                    .collect();
                states.sort_by(|a, b| a.0.cmp(&b.0));
                let _ = respond_to.send(states);
            }
            ManagerMessage::Shutdown { respond_to } => {
                self.close_all().await;
                let _ = respond_to.send(());
                return true;
            }
        }
        false
    }

    async fn handle_signal(&mut self, message: SignalMessage) {
        let peer_id = message.sender.clone();
        let kind = message.kind();

        let peer_message = match message.body {
            SignalBody::Offer(desc) => {
                let usable = self
                    .peers
                    .get(&peer_id)
                    .is_some_and(|managed| managed.state.is_usable());
                if !usable {
                    if self.peers.contains_key(&peer_id) {
                        self.close_peer(&peer_id).await;
                    }
                    self.spawn_peer(peer_id.clone(), NegotiationRole::Responder);
                }
                PeerMessage::Offer { sdp: desc.sdp }
            }
            SignalBody::Answer(desc) => PeerMessage::Answer { sdp: desc.sdp },
            SignalBody::IceCandidate(candidate) => PeerMessage::Candidate(candidate),
            SignalBody::Join(_) | SignalBody::Leave => {
                debug!(
                    target: "sc.peer",
                    peer_id = %peer_id,
                    kind = %kind,
                    "Roster message is not routed to peers"
                );
                return;
            }
        };

        let Some(managed) = self.peers.get(&peer_id) else {
            debug!(
                target: "sc.peer",
                peer_id = %peer_id,
                "Discarding negotiation message for unknown peer"
            );
            return;
        };

        if let Err(e) = managed.handle.send(peer_message).await {
            warn!(
                target: "sc.peer",
                peer_id = %peer_id,
                error = %e,
                "Failed to deliver negotiation message to peer"
            );
        }
    }

    async fn handle_set_track(&mut self, track: MediaTrack) {
        self.tracks.insert(track.kind(), track.clone());

        for (peer_id, managed) in &self.peers {
            if let Err(e) = managed
                .handle
                .send(PeerMessage::SetTrack(track.clone()))
                .await
            {
                warn!(
                    target: "sc.peer",
                    peer_id = %peer_id,
                    error = %e,
                    "Failed to re-bind track on peer"
                );
            }
        }
    }

    fn handle_update(&mut self, update: &PeerUpdate) {
        if let Some(managed) = self.peers.get_mut(&update.peer_id) {
            // Late updates from a replaced actor are ignored.
            if managed.handle.generation() == update.generation {
                managed.state = update.state;
            }
        }
    }

    fn spawn_peer(&mut self, peer_id: ParticipantId, role: NegotiationRole) {
        self.next_generation += 1;
        let (handle, task_handle) = PeerActor::spawn(
            peer_id.clone(),
            self.next_generation,
            role,
            self.tracks.clone(),
            self.ctx.clone(),
            self.cancel_token.child_token(),
        );

        info!(
            target: "sc.peer",
            peer_id = %peer_id,
            role = ?role,
            "Peer connection created"
        );

        self.peers.insert(
            peer_id,
            ManagedPeer {
                handle,
                task_handle,
                state: ConnectionState::New,
            },
        );
        metrics::connection_opened();
    }

    async fn close_peer(&mut self, peer_id: &ParticipantId) {
        let Some(managed) = self.peers.remove(peer_id) else {
            debug!(target: "sc.peer", peer_id = %peer_id, "No connection to close");
            return;
        };

        managed.handle.cancel();
        await_peer(peer_id, managed.task_handle).await;
        metrics::connection_closed();

        info!(target: "sc.peer", peer_id = %peer_id, "Peer connection closed");
    }

    async fn close_all(&mut self) {
        info!(
            target: "sc.peer",
            local_id = %self.local_id,
            connections = self.peers.len(),
            "Closing all peer connections"
        );

        for managed in self.peers.values() {
            managed.handle.cancel();
        }
        for (peer_id, managed) in self.peers.drain() {
            await_peer(&peer_id, managed.task_handle).await;
            metrics::connection_closed();
        }
    }
}

async fn await_peer(peer_id: &ParticipantId, task_handle: JoinHandle<()>) {
    match tokio::time::timeout(PEER_SHUTDOWN_TIMEOUT, task_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(
                target: "sc.peer",
                peer_id = %peer_id,
                error = ?e,
                "Peer task panicked during shutdown"
            );
        }
        Err(_) => {
            warn!(
                target: "sc.peer",
                peer_id = %peer_id,
                "Peer shutdown timed out"
            );
        }
    }
}
