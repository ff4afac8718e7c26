//! `SessionActor` - owns one session.
//!
//! Holds the session identity, local media and roster, and wires the
//! router's inbound messages to the peer manager and the manager's outbound
//! negotiation messages back to the router.

use super::roster::{Participant, Roster};
use super::{Collaborators, ParticipantInfo, SessionPhase, SessionSnapshot};
use crate::config::Config;
use crate::errors::ScError;
use crate::events::{EventSink, SessionEvent};
use crate::media::{LocalMedia, MediaStream, MediaTrack, TrackKind};
use crate::observability::metrics;
use crate::peer::{ConnectionState, PeerManagerActor, PeerManagerHandle};
use crate::transport::{RouterOutput, TransportRouterActor, TransportRouterHandle};

use common::secret::SecretString;
use common::types::{ParticipantId, SessionId};
use signal_protocol::{SignalBody, SignalMessage};
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 64;

/// How long to wait for a child actor task to finish on leave.
const CHILD_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages handled by the `SessionActor`.
#[derive(Debug)]
pub(crate) enum SessionMessage {
    Initialize {
        session_id: SessionId,
        local: ParticipantInfo,
        token: SecretString,
        respond_to: oneshot::Sender<Result<LocalMedia, ScError>>,
    },
    Join {
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },
    Leave {
        respond_to: oneshot::Sender<()>,
    },
    StartScreenShare {
        respond_to: oneshot::Sender<Result<MediaStream, ScError>>,
    },
    StopScreenShare {
        respond_to: oneshot::Sender<Result<(), ScError>>,
    },
    Toggle {
        kind: TrackKind,
        respond_to: oneshot::Sender<Result<bool, ScError>>,
    },
    GetParticipants {
        respond_to: oneshot::Sender<Vec<Participant>>,
    },
    GetState {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}

/// Why an abandonable await did not complete.
enum Interrupted<E> {
    Cancelled,
    Failed(E),
}

async fn recv_or_pending<T>(receiver: Option<&mut mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// The `SessionActor` implementation.
pub(crate) struct SessionActor {
    config: Config,
    collaborators: Collaborators,
    events: EventSink,
    phase: SessionPhase,
    session_id: Option<SessionId>,
    local: Option<ParticipantInfo>,
    media: Option<LocalMedia>,
    roster: Roster,
    /// Synthetic self-view peer shown while Direct Fallback is active.
    fallback_peer: Option<ParticipantId>,
    manager: Option<PeerManagerHandle>,
    manager_task: Option<JoinHandle<()>>,
    router: Option<TransportRouterHandle>,
    router_task: Option<JoinHandle<()>>,
    router_output: Option<mpsc::UnboundedReceiver<RouterOutput>>,
    /// Negotiation messages produced by peers, bound for the router.
    outbound: Option<mpsc::UnboundedReceiver<SignalMessage>>,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    /// Cancelled at the start of leave to abandon in-flight device requests.
    inflight: CancellationToken,
}

impl SessionActor {
    /// Spawn the actor. Returns the mailbox sender and the task join handle.
    pub(crate) fn spawn(
        config: Config,
        collaborators: Collaborators,
        events: EventSink,
        cancel_token: CancellationToken,
        inflight: CancellationToken,
    ) -> (mpsc::Sender<SessionMessage>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);

        let actor = Self {
            config,
            collaborators,
            events,
            phase: SessionPhase::Created,
            session_id: None,
            local: None,
            media: None,
            roster: Roster::new(),
            fallback_peer: None,
            manager: None,
            manager_task: None,
            router: None,
            router_task: None,
            router_output: None,
            outbound: None,
            receiver,
            cancel_token,
            inflight,
        };

        (sender, tokio::spawn(actor.run()))
    }

    #[instrument(skip_all, name = "sc.session")]
    async fn run(mut self) {
        debug!(target: "sc.session", "SessionActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "sc.session", "SessionActor received cancellation signal");
                    self.teardown().await;
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
                            self.teardown().await;
                            break;
                        }
                    }
                }

                output = recv_or_pending(self.router_output.as_mut()) => {
                    match output {
                        Some(output) => self.handle_router_output(output).await,
                        None => self.router_output = None,
                    }
                }

                outbound = recv_or_pending(self.outbound.as_mut()) => {
                    match outbound {
                        Some(message) => self.send_signal(message).await,
                        None => self.outbound = None,
                    }
                }
            }
        }

        debug!(
            target: "sc.session",
            session_id = ?self.session_id.as_ref().map(SessionId::as_str),
            "SessionActor stopped"
        );
    }

    /// Returns true if the actor should exit.
    async fn handle_message(&mut self, message: SessionMessage) -> bool {
        match message {
            SessionMessage::Initialize {
                session_id,
                local,
                token,
                respond_to,
            } => {
                let result = self.initialize(session_id, local, token).await;
                let _ = respond_to.send(result);
            }
            SessionMessage::Join { respond_to } => {
                let result = self.join().await;
                let _ = respond_to.send(result);
            }
            SessionMessage::Leave { respond_to } => {
                self.teardown().await;
                let _ = respond_to.send(());
                return true;
            }
            SessionMessage::StartScreenShare { respond_to } => {
                let result = self.start_screen_share().await;
                let _ = respond_to.send(result);
            }
            SessionMessage::StopScreenShare { respond_to } => {
                let result = self.stop_screen_share().await;
                let _ = respond_to.send(result);
            }
            SessionMessage::Toggle { kind, respond_to } => {
                let _ = respond_to.send(self.toggle(kind));
            }
            SessionMessage::GetParticipants { respond_to } => {
                let _ = respond_to.send(self.roster.snapshot());
            }
            SessionMessage::GetState { respond_to } => {
                let snapshot = self.snapshot().await;
                let _ = respond_to.send(snapshot);
            }
        }
        false
    }

    /// Await `future` unless the session is being left first.
    async fn abandonable<T, E>(
        &self,
        future: impl Future<Output = Result<T, E>>,
    ) -> Result<T, Interrupted<E>> {
        tokio::select! {
            biased;
            () = self.inflight.cancelled() => Err(Interrupted::Cancelled),
            result = future => result.map_err(Interrupted::Failed),
        }
    }

    async fn initialize(
        &mut self,
        session_id: SessionId,
        local: ParticipantInfo,
        token: SecretString,
    ) -> Result<LocalMedia, ScError> {
        if self.phase != SessionPhase::Created {
            return Err(ScError::InvalidState(
                "session is already initialized".to_string(),
            ));
        }

        info!(
            target: "sc.session",
            session_id = %session_id,
            participant_id = %local.id,
            "Initializing session"
        );

        let devices = self.collaborators.media.clone();
        let camera = match self.abandonable(devices.acquire_user_media()).await {
            Ok(stream) => stream,
            Err(Interrupted::Cancelled) => return Err(ScError::SessionEnded),
            Err(Interrupted::Failed(e)) => {
                let err = ScError::MediaAccess(e.to_string());
                self.report_error(&err);
                return Err(err);
            }
        };

        if let Some(audio) = camera.track(TrackKind::Audio) {
            audio.set_enabled(!self.config.start_audio_muted);
        }
        if let Some(video) = camera.track(TrackKind::Video) {
            video.set_enabled(!self.config.start_video_muted);
        }

        let media = LocalMedia::new(camera.clone());
        self.events.emit(SessionEvent::LocalStream(camera));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (manager, manager_task) = PeerManagerActor::spawn(
            local.id.clone(),
            self.collaborators.links.clone(),
            self.events.clone(),
            outbound_tx,
            self.cancel_token.child_token(),
        );
        for track in media.outbound_tracks().into_values() {
            if let Err(e) = manager.set_track(track).await {
                warn!(target: "sc.session", error = %e, "Failed to bind local track");
            }
        }

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (router, router_task) = TransportRouterActor::spawn(
            session_id.clone(),
            token,
            self.collaborators.signaling.clone(),
            self.config.clone(),
            output_tx,
            self.cancel_token.child_token(),
        );

        self.session_id = Some(session_id);
        self.local = Some(local);
        self.media = Some(media.clone());
        self.manager = Some(manager);
        self.manager_task = Some(manager_task);
        self.router = Some(router);
        self.router_task = Some(router_task);
        self.router_output = Some(output_rx);
        self.outbound = Some(outbound_rx);
        self.phase = SessionPhase::Initialized;

        Ok(media)
    }

    async fn join(&mut self) -> Result<(), ScError> {
        match self.phase {
            SessionPhase::Created => {
                return Err(ScError::InvalidState(
                    "initialize must be called before join".to_string(),
                ))
            }
            SessionPhase::Joined => {
                debug!(target: "sc.session", "Already joined");
                return Ok(());
            }
            SessionPhase::Left => return Err(ScError::SessionEnded),
            SessionPhase::Initialized => {}
        }

        let Some(local) = &self.local else {
            return Err(ScError::Internal("initialized without identity".to_string()));
        };
        let join = SignalMessage::join(local.id.clone(), local.display_name.clone());

        self.phase = SessionPhase::Joined;
        self.send_signal(join).await;

        info!(
            target: "sc.session",
            participant_id = %local.id,
            "Joined session"
        );
        Ok(())
    }

    async fn start_screen_share(&mut self) -> Result<MediaStream, ScError> {
        self.require_active()?;
        if let Some(screen) = self.media.as_ref().and_then(|m| m.screen.clone()) {
            return Ok(screen);
        }

        let devices = self.collaborators.media.clone();
        let screen = match self.abandonable(devices.acquire_display_media()).await {
            Ok(stream) => stream,
            Err(Interrupted::Cancelled) => return Err(ScError::SessionEnded),
            Err(Interrupted::Failed(e)) => {
                let err = ScError::ScreenCapture(e.to_string());
                self.report_error(&err);
                return Err(err);
            }
        };

        let Some(video) = screen.track(TrackKind::Video).cloned() else {
            screen.stop_all();
            let err = ScError::ScreenCapture("display stream has no video track".to_string());
            self.report_error(&err);
            return Err(err);
        };

        if let Some(media) = self.media.as_mut() {
            media.screen = Some(screen.clone());
        }
        self.rebind(video).await;

        info!(target: "sc.session", stream_id = %screen.id(), "Screen share started");
        Ok(screen)
    }

    async fn stop_screen_share(&mut self) -> Result<(), ScError> {
        self.require_active()?;
        let Some(media) = self.media.as_mut() else {
            return Ok(());
        };
        let Some(screen) = media.screen.take() else {
            debug!(target: "sc.session", "Not screen sharing");
            return Ok(());
        };

        screen.stop_all();
        if let Some(camera_video) = media.camera.track(TrackKind::Video).cloned() {
            self.rebind(camera_video).await;
        }

        info!(target: "sc.session", stream_id = %screen.id(), "Screen share stopped");
        Ok(())
    }

    fn toggle(&self, kind: TrackKind) -> Result<bool, ScError> {
        self.require_active()?;
        let track = self
            .media
            .as_ref()
            .and_then(|m| m.camera.track(kind))
            .ok_or_else(|| ScError::InvalidState(format!("no local {kind} track")))?;

        let enabled = !track.is_enabled();
        track.set_enabled(enabled);

        debug!(target: "sc.session", kind = %kind, enabled, "Toggled local track");
        Ok(enabled)
    }

    async fn snapshot(&self) -> SessionSnapshot {
        let active_transport = match &self.router {
            Some(router) => router.active_transport().await.ok(),
            None => None,
        };
        let mut connections = match &self.manager {
            Some(manager) => manager.connection_states().await.unwrap_or_default(),
            None => Vec::new(),
        };
        if let Some(peer_id) = &self.fallback_peer {
            connections.push((peer_id.clone(), ConnectionState::Connected));
            connections.sort_by(|a, b| a.0.cmp(&b.0));
        }

        SessionSnapshot {
            phase: self.phase,
            session_id: self.session_id.clone(),
            active_transport,
            connections,
            screen_sharing: self.media.as_ref().is_some_and(|m| m.screen.is_some()),
        }
    }

    fn require_active(&self) -> Result<(), ScError> {
        match self.phase {
            SessionPhase::Created => Err(ScError::InvalidState(
                "session is not initialized".to_string(),
            )),
            SessionPhase::Initialized | SessionPhase::Joined => Ok(()),
            SessionPhase::Left => Err(ScError::SessionEnded),
        }
    }

    /// Make `track` the outbound track of its kind on every connection.
    async fn rebind(&self, track: MediaTrack) {
        if let Some(manager) = &self.manager {
            if let Err(e) = manager.set_track(track).await {
                warn!(target: "sc.session", error = %e, "Failed to re-bind outbound track");
            }
        }
    }

    async fn send_signal(&self, message: SignalMessage) {
        let Some(router) = &self.router else {
            return;
        };
        if let Err(e) = router.send(message).await {
            warn!(target: "sc.session", error = %e, "Failed to hand message to router");
        }
    }

    async fn handle_router_output(&mut self, output: RouterOutput) {
        match output {
            RouterOutput::Connected(kind) => {
                info!(target: "sc.session", transport = %kind, "Signaling connected");
            }
            RouterOutput::Message(message) => self.handle_signal(message).await,
            RouterOutput::FallbackActivated {
                participant_id,
                display_name,
            } => self.activate_fallback(participant_id, display_name),
        }
    }

    async fn handle_signal(&mut self, message: SignalMessage) {
        let Some(local) = self.local.clone() else {
            return;
        };
        if !message.is_relevant_to(&local.id) {
            debug!(
                target: "sc.session",
                sender = %message.sender,
                kind = %message.kind(),
                "Ignoring signal not meant for us"
            );
            return;
        }

        let sender = message.sender.clone();
        let broadcast = message.is_broadcast();
        match message.body {
            SignalBody::Join(announcement) => {
                self.add_participant(sender.clone(), &announcement.display_name);

                if broadcast && self.phase == SessionPhase::Joined {
                    let reply = SignalMessage::join_to(
                        local.id.clone(),
                        sender.clone(),
                        local.display_name.clone(),
                    );
                    self.send_signal(reply).await;
                    if let Some(manager) = &self.manager {
                        if let Err(e) = manager.connect(sender.clone()).await {
                            warn!(
                                target: "sc.session",
                                peer_id = %sender,
                                error = %e,
                                "Failed to start connection"
                            );
                        }
                    }
                }
            }
            SignalBody::Leave => {
                if self.roster.remove(&sender).is_some() {
                    info!(target: "sc.session", participant_id = %sender, "Participant left");
                    self.events.emit(SessionEvent::ParticipantLeft {
                        participant_id: sender.clone(),
                    });
                }
                if let Some(manager) = &self.manager {
                    if let Err(e) = manager.remove(sender.clone()).await {
                        warn!(
                            target: "sc.session",
                            peer_id = %sender,
                            error = %e,
                            "Failed to close connection"
                        );
                    }
                }
            }
            SignalBody::Offer(_) => {
                if !self.roster.contains(&sender) {
                    self.add_participant(sender.clone(), sender.as_str());
                }
                self.route_negotiation(message).await;
            }
            SignalBody::Answer(_) | SignalBody::IceCandidate(_) => {
                self.route_negotiation(message).await;
            }
        }
    }

    async fn route_negotiation(&self, message: SignalMessage) {
        let Some(manager) = &self.manager else {
            return;
        };
        let peer_id = message.sender.clone();
        if let Err(e) = manager.deliver(message).await {
            warn!(
                target: "sc.session",
                peer_id = %peer_id,
                error = %e,
                "Failed to route negotiation message"
            );
        }
    }

    fn add_participant(&mut self, id: ParticipantId, display_name: &str) {
        if self.roster.add(id.clone(), display_name) {
            info!(
                target: "sc.session",
                participant_id = %id,
                participants = self.roster.len(),
                "Participant joined"
            );
            self.events.emit(SessionEvent::ParticipantJoined {
                participant_id: id,
                display_name: display_name.to_string(),
            });
        }
    }

    fn activate_fallback(&mut self, participant_id: ParticipantId, display_name: String) {
        warn!(
            target: "sc.session",
            participant_id = %participant_id,
            "Direct fallback active, showing self view"
        );
        self.add_participant(participant_id.clone(), &display_name);
        self.fallback_peer = Some(participant_id.clone());
        self.events.emit(SessionEvent::ConnectionStateChanged {
            peer_id: participant_id.clone(),
            state: ConnectionState::Connected,
        });

        if let Some(media) = &self.media {
            self.events.emit(SessionEvent::RemoteStreamAdded {
                peer_id: participant_id,
                stream: media.camera.clone(),
            });
        }
    }

    fn report_error(&self, err: &ScError) {
        warn!(
            target: "sc.session",
            error = %err,
            error_type = err.error_type_label(),
            "Session operation failed"
        );
        metrics::record_error(err.error_type_label());
        self.events.emit(SessionEvent::Error {
            message: err.client_message(),
        });
    }

    /// Leave the session. Safe to call more than once.
    async fn teardown(&mut self) {
        if self.phase == SessionPhase::Left {
            return;
        }
        info!(
            target: "sc.session",
            session_id = ?self.session_id.as_ref().map(SessionId::as_str),
            "Leaving session"
        );
        self.inflight.cancel();

        if self.phase == SessionPhase::Joined {
            if let Some(local) = &self.local {
                self.send_signal(SignalMessage::leave(local.id.clone())).await;
            }
        }

        if let Some(manager) = self.manager.take() {
            if let Err(e) = manager.shutdown().await {
                debug!(target: "sc.session", error = %e, "Peer manager already stopped");
            }
        }
        await_child("peer_manager", self.manager_task.take()).await;

        if let Some(media) = self.media.take() {
            media.stop_all();
        }

        if let Some(router) = self.router.take() {
            router.shutdown().await;
        }
        await_child("transport_router", self.router_task.take()).await;

        if let Some(peer_id) = self.fallback_peer.take() {
            self.events.emit(SessionEvent::ConnectionStateChanged {
                peer_id,
                state: ConnectionState::Closed,
            });
        }

        self.router_output = None;
        self.outbound = None;
        self.roster.clear();
        self.events.close();
        self.phase = SessionPhase::Left;
        self.cancel_token.cancel();

        info!(target: "sc.session", "Session left");
    }
}

async fn await_child(name: &'static str, task_handle: Option<JoinHandle<()>>) {
    let Some(task_handle) = task_handle else {
        return;
    };
    match tokio::time::timeout(CHILD_SHUTDOWN_TIMEOUT, task_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(target: "sc.session", actor = name, error = ?e, "Actor task panicked");
        }
        Err(_) => {
            warn!(target: "sc.session", actor = name, "Actor shutdown timed out");
        }
    }
}
