//! Session coordinator - the public entry point.
//!
//! A [`SessionCoordinator`] is a handle to one `SessionActor`. Construct it
//! with the collaborators (signaling backend, capture devices, peer link
//! factory), keep the returned event receiver, then:
//!
//! ```text
//! initialize(session, me, token) -> LocalMedia
//! join_session()
//! ... toggle_audio / toggle_video / start_screen_share ...
//! leave_session()
//! ```
//!
//! Dropping the coordinator cancels the session without sending a leave.

mod actor;
pub mod roster;

pub use roster::{Participant, Roster};

use crate::config::Config;
use crate::errors::ScError;
use crate::events::{EventSink, SessionEvent};
use crate::media::{LocalMedia, MediaDevices, MediaStream, TrackKind};
use crate::peer::{ConnectionState, PeerLinkFactory};
use crate::transport::{SignalingBackend, TransportKind};
use actor::{SessionActor, SessionMessage};

use common::secret::SecretString;
use common::types::{ParticipantId, SessionId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// External collaborators a session depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub signaling: Arc<dyn SignalingBackend>,
    pub media: Arc<dyn MediaDevices>,
    pub links: Arc<dyn PeerLinkFactory>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// The local participant's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub display_name: String,
}

impl ParticipantInfo {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(id),
            display_name: display_name.into(),
        }
    }
}

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Constructed, no media yet.
    Created,
    /// Local media acquired and signaling connecting.
    Initialized,
    /// Join announced.
    Joined,
    /// Left or torn down. Terminal.
    Left,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session_id: Option<SessionId>,
    /// `None` before `initialize` and after leave.
    pub active_transport: Option<TransportKind>,
    /// Connection state per remote peer, ordered by peer id.
    pub connections: Vec<(ParticipantId, ConnectionState)>,
    pub screen_sharing: bool,
}

/// Handle to a running session.
#[derive(Debug)]
pub struct SessionCoordinator {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    inflight: CancellationToken,
}

impl SessionCoordinator {
    /// Spawn a session. Events are delivered on the returned receiver.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        config: Config,
        collaborators: Collaborators,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = EventSink::channel();
        let cancel_token = CancellationToken::new();
        let inflight = cancel_token.child_token();

        // The task is detached; it tears itself down once cancelled.
        let (sender, _task_handle) = SessionActor::spawn(
            config,
            collaborators,
            events,
            cancel_token.clone(),
            inflight.clone(),
        );

        (
            Self {
                sender,
                cancel_token,
                inflight,
            },
            receiver,
        )
    }

    /// Acquire local audio and video and start connecting signaling.
    ///
    /// # Errors
    ///
    /// - `MediaAccess` if the devices are unavailable or permission is denied
    /// - `InvalidState` if called twice
    /// - `SessionEnded` after leave
    pub async fn initialize(
        &self,
        session_id: impl Into<SessionId>,
        local: ParticipantInfo,
        token: SecretString,
    ) -> Result<LocalMedia, ScError> {
        let session_id = session_id.into();
        self.request(|respond_to| SessionMessage::Initialize {
            session_id,
            local,
            token,
            respond_to,
        })
        .await?
    }

    /// Announce the local participant. Idempotent while joined.
    ///
    /// # Errors
    ///
    /// `InvalidState` before `initialize`; `SessionEnded` after leave.
    pub async fn join_session(&self) -> Result<(), ScError> {
        self.request(|respond_to| SessionMessage::Join { respond_to })
            .await?
    }

    /// Leave the session: close every connection, stop every local track and
    /// stop signaling. No event is delivered after this returns.
    ///
    /// Always succeeds; calling it again is a no-op.
    pub async fn leave_session(&self) -> Result<(), ScError> {
        self.inflight.cancel();
        match self
            .request(|respond_to| SessionMessage::Leave { respond_to })
            .await
        {
            Ok(()) | Err(ScError::SessionEnded) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Start sharing the screen. The screen's video replaces the camera's on
    /// every connection.
    ///
    /// # Errors
    ///
    /// `ScreenCapture` if capture is denied; the session is left untouched.
    pub async fn start_screen_share(&self) -> Result<MediaStream, ScError> {
        self.request(|respond_to| SessionMessage::StartScreenShare { respond_to })
            .await?
    }

    /// Stop sharing the screen and restore the camera. No-op when not sharing.
    pub async fn stop_screen_share(&self) -> Result<(), ScError> {
        self.request(|respond_to| SessionMessage::StopScreenShare { respond_to })
            .await?
    }

    /// Flip the local microphone. Returns whether audio is now enabled.
    pub async fn toggle_audio(&self) -> Result<bool, ScError> {
        self.toggle(TrackKind::Audio).await
    }

    /// Flip the local camera. Returns whether video is now enabled.
    pub async fn toggle_video(&self) -> Result<bool, ScError> {
        self.toggle(TrackKind::Video).await
    }

    /// Remote participants currently in the roster.
    pub async fn participants(&self) -> Result<Vec<Participant>, ScError> {
        self.request(|respond_to| SessionMessage::GetParticipants { respond_to })
            .await
    }

    /// Current session state.
    pub async fn state(&self) -> Result<SessionSnapshot, ScError> {
        self.request(|respond_to| SessionMessage::GetState { respond_to })
            .await
    }

    async fn toggle(&self, kind: TrackKind) -> Result<bool, ScError> {
        self.request(|respond_to| SessionMessage::Toggle { kind, respond_to })
            .await?
    }

    /// Send a request and await the reply. A stopped actor means the session
    /// has ended.
    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> SessionMessage,
    ) -> Result<T, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| ScError::SessionEnded)?;

        rx.await.map_err(|_| ScError::SessionEnded)
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
