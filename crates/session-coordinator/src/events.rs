//! Events delivered to the presentation layer.
//!
//! These are the only integration points between the coordinator and any UI.
//! Events flow over an unbounded channel so no actor ever blocks on a slow
//! consumer.

use crate::media::MediaStream;
use crate::peer::ConnectionState;
use common::types::ParticipantId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Event emitted by a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Local camera/microphone stream is available.
    LocalStream(MediaStream),

    /// A participant entered the roster.
    ParticipantJoined {
        participant_id: ParticipantId,
        display_name: String,
    },

    /// A participant left the roster.
    ParticipantLeft { participant_id: ParticipantId },

    /// A peer connection changed state.
    ConnectionStateChanged {
        peer_id: ParticipantId,
        state: ConnectionState,
    },

    /// A remote stream arrived on a peer connection.
    RemoteStreamAdded {
        peer_id: ParticipantId,
        stream: MediaStream,
    },

    /// A user-visible error.
    Error { message: String },
}

/// Emitting side of the session event channel.
///
/// Cloned into every actor that produces events. Once closed, emits are
/// silently dropped, which is what guarantees no event is observed after
/// `leave_session` returns.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<SessionEvent>,
    closed: CancellationToken,
}

impl EventSink {
    /// Create a sink and the receiver handed to the presentation layer.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                closed: CancellationToken::new(),
            },
            receiver,
        )
    }

    pub fn emit(&self, event: SessionEvent) {
        if self.closed.is_cancelled() {
            return;
        }
        // Receiver dropped means nobody is listening; nothing to do.
        let _ = self.sender.send(event);
    }

    /// Stop emitting on this sink and all its clones.
    pub fn close(&self) {
        self.closed.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
