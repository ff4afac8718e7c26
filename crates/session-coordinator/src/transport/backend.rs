//! Signaling backend seam.
//!
//! The router talks to the signaling service only through
//! [`SignalingBackend`]. [`HttpSignalingBackend`](super::HttpSignalingBackend)
//! is the production implementation; tests substitute their own.

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::SessionId;
use signal_protocol::{CodecError, SignalMessage};
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport-level failure.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach or open the endpoint.
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Request failed in flight (timeout, reset, TLS).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status.
    #[error("Unexpected status: {0}")]
    Status(u16),

    /// Response body could not be decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The channel is closed.
    #[error("Channel closed")]
    Closed,
}

/// Event raised by an open socket channel.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// The socket is open and usable.
    Opened,
    /// An inbound signaling message.
    Message(SignalMessage),
    /// The socket failed.
    Error(String),
    /// The socket was closed by the remote end.
    Closed,
}

/// Bidirectional socket channel.
///
/// Dropping `outbound` asks the backend to close the socket.
#[derive(Debug)]
pub struct SocketChannel {
    pub outbound: mpsc::UnboundedSender<SignalMessage>,
    pub events: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Result of one poll.
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    /// Decoded messages, in server order.
    pub messages: Vec<SignalMessage>,
    /// Highest server timestamp in the response, including entries that
    /// could not be decoded. The next poll asks for messages after it.
    pub cursor: Option<i64>,
}

impl PollBatch {
    /// Batch whose cursor is the highest timestamp among `messages`.
    #[must_use]
    pub fn new(messages: Vec<SignalMessage>) -> Self {
        let cursor = messages.iter().filter_map(|m| m.timestamp).max();
        Self { messages, cursor }
    }

    /// Move the cursor forward to `timestamp` if it is newer.
    pub fn advance_cursor(&mut self, timestamp: i64) {
        self.cursor = Some(self.cursor.map_or(timestamp, |c| c.max(timestamp)));
    }
}

/// Signaling service operations.
#[async_trait]
pub trait SignalingBackend: Send + Sync {
    /// Start opening the primary socket for `session_id`.
    ///
    /// Returns immediately; the channel reports [`SocketEvent::Opened`] once
    /// the socket is usable. An `Err` means the socket cannot be attempted at
    /// all.
    async fn open_socket(
        &self,
        session_id: &SessionId,
        token: &SecretString,
    ) -> Result<SocketChannel, TransportError>;

    /// Fetch messages newer than `since` (server timestamp, ms since epoch).
    async fn poll(
        &self,
        session_id: &SessionId,
        token: &SecretString,
        since: Option<i64>,
    ) -> Result<PollBatch, TransportError>;

    /// Publish one message.
    async fn post(
        &self,
        session_id: &SessionId,
        token: &SecretString,
        message: &SignalMessage,
    ) -> Result<(), TransportError>;
}
