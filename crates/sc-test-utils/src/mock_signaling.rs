//! Mock signaling backend.
//!
//! Provides a [`SignalingBackend`] that can be configured to:
//! - Open the primary socket, never open it, or refuse it outright
//! - Fail a number of polls (or every poll)
//! - Fail every post, or never answer one
//! - Return entries the backend could not decode
//!
//! and that records everything the router sends, on either transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use sc_test_utils::{MockSignalingBackend, SocketBehavior};
//!
//! let backend = MockSignalingBackend::builder()
//!     .socket(SocketBehavior::NeverOpens)
//!     .failing_polls(3)
//!     .build();
//! ```

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::SessionId;
use session_coordinator::transport::{
    PollBatch, SignalingBackend, SocketChannel, SocketEvent, TransportError,
};
use signal_protocol::SignalMessage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// How `open_socket` behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketBehavior {
    /// Reports `Opened` immediately.
    #[default]
    Opens,
    /// Accepts the attempt but never reports `Opened`.
    NeverOpens,
    /// `open_socket` returns an error.
    Unavailable,
}

#[derive(Debug, Default)]
struct State {
    inbox: VecDeque<SignalMessage>,
    posted: Vec<SignalMessage>,
    socket_sent: Vec<SignalMessage>,
    socket_events: Option<mpsc::UnboundedSender<SocketEvent>>,
    polls_to_fail: u32,
    /// Timestamp of an undecodable entry in the next successful poll.
    skipped_timestamp: Option<i64>,
    last_since: Option<i64>,
}

/// Mock signaling backend for router and session tests.
#[derive(Debug, Clone)]
pub struct MockSignalingBackend {
    socket: SocketBehavior,
    fail_posts: bool,
    hang_posts: bool,
    state: Arc<Mutex<State>>,
    poll_count: Arc<AtomicUsize>,
    open_count: Arc<AtomicUsize>,
}

impl MockSignalingBackend {
    #[must_use]
    pub fn builder() -> MockSignalingBackendBuilder {
        MockSignalingBackendBuilder::default()
    }

    /// Socket opens immediately; polls and posts succeed.
    #[must_use]
    pub fn healthy() -> Self {
        Self::builder().build()
    }

    /// Socket never opens, so the router falls back to polling.
    #[must_use]
    pub fn poll_only() -> Self {
        Self::builder().socket(SocketBehavior::NeverOpens).build()
    }

    /// Deliver an inbound message from the server.
    ///
    /// Goes over the socket while one is attached, otherwise it is queued for
    /// the next poll.
    pub fn deliver(&self, message: SignalMessage) {
        let mut state = self.state.lock().unwrap();
        if let Some(events) = &state.socket_events {
            if events.send(SocketEvent::Message(message.clone())).is_ok() {
                return;
            }
        }
        state.inbox.push_back(message);
    }

    /// Raise a socket error on the attached socket.
    pub fn fail_socket(&self, reason: &str) {
        let state = self.state.lock().unwrap();
        if let Some(events) = &state.socket_events {
            let _ = events.send(SocketEvent::Error(reason.to_string()));
        }
    }

    /// Include an entry the backend could not decode, stamped `timestamp`,
    /// in the next successful poll. Only its timestamp reaches the router.
    pub fn deliver_unreadable(&self, timestamp: i64) {
        self.state.lock().unwrap().skipped_timestamp = Some(timestamp);
    }

    /// Make the next `count` polls fail.
    pub fn fail_next_polls(&self, count: u32) {
        self.state.lock().unwrap().polls_to_fail = count;
    }

    /// Messages posted over HTTP, in order.
    #[must_use]
    pub fn posted(&self) -> Vec<SignalMessage> {
        self.state.lock().unwrap().posted.clone()
    }

    /// Messages sent over the socket, in order.
    #[must_use]
    pub fn socket_sent(&self) -> Vec<SignalMessage> {
        self.state.lock().unwrap().socket_sent.clone()
    }

    /// Everything sent on any transport: socket first, then HTTP.
    #[must_use]
    pub fn sent(&self) -> Vec<SignalMessage> {
        let state = self.state.lock().unwrap();
        state
            .socket_sent
            .iter()
            .chain(state.posted.iter())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// The `since` cursor of the most recent poll.
    #[must_use]
    pub fn last_since(&self) -> Option<i64> {
        self.state.lock().unwrap().last_since
    }
}

/// Builder for [`MockSignalingBackend`].
#[derive(Debug, Default)]
pub struct MockSignalingBackendBuilder {
    socket: SocketBehavior,
    polls_to_fail: u32,
    fail_posts: bool,
    hang_posts: bool,
    inbox: Vec<SignalMessage>,
}

impl MockSignalingBackendBuilder {
    #[must_use]
    pub fn socket(mut self, behavior: SocketBehavior) -> Self {
        self.socket = behavior;
        self
    }

    /// Fail the first `count` polls.
    #[must_use]
    pub fn failing_polls(mut self, count: u32) -> Self {
        self.polls_to_fail = count;
        self
    }

    #[must_use]
    pub fn failing_posts(mut self) -> Self {
        self.fail_posts = true;
        self
    }

    /// Posts never complete.
    #[must_use]
    pub fn hanging_posts(mut self) -> Self {
        self.hang_posts = true;
        self
    }

    /// Queue a message for the first successful poll.
    #[must_use]
    pub fn with_inbound(mut self, message: SignalMessage) -> Self {
        self.inbox.push(message);
        self
    }

    #[must_use]
    pub fn build(self) -> MockSignalingBackend {
        MockSignalingBackend {
            socket: self.socket,
            fail_posts: self.fail_posts,
            hang_posts: self.hang_posts,
            state: Arc::new(Mutex::new(State {
                inbox: self.inbox.into(),
                polls_to_fail: self.polls_to_fail,
                ..State::default()
            })),
            poll_count: Arc::new(AtomicUsize::new(0)),
            open_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SignalingBackend for MockSignalingBackend {
    async fn open_socket(
        &self,
        _session_id: &SessionId,
        _token: &SecretString,
    ) -> Result<SocketChannel, TransportError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);

        if self.socket == SocketBehavior::Unavailable {
            return Err(TransportError::Connect("mock socket unavailable".to_string()));
        }

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        if self.socket == SocketBehavior::Opens {
            let _ = events_tx.send(SocketEvent::Opened);
        }
        self.state.lock().unwrap().socket_events = Some(events_tx);

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                state.lock().unwrap().socket_sent.push(message);
            }
            // Router dropped the socket.
            state.lock().unwrap().socket_events = None;
        });

        Ok(SocketChannel {
            outbound: outbound_tx,
            events: events_rx,
        })
    }

    async fn poll(
        &self,
        _session_id: &SessionId,
        _token: &SecretString,
        since: Option<i64>,
    ) -> Result<PollBatch, TransportError> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        state.last_since = since;
        if state.polls_to_fail > 0 {
            state.polls_to_fail -= 1;
            return Err(TransportError::Status(503));
        }
        let mut batch = PollBatch::new(state.inbox.drain(..).collect());
        if let Some(timestamp) = state.skipped_timestamp.take() {
            batch.advance_cursor(timestamp);
        }
        Ok(batch)
    }

    async fn post(
        &self,
        _session_id: &SessionId,
        _token: &SecretString,
        message: &SignalMessage,
    ) -> Result<(), TransportError> {
        if self.hang_posts {
            std::future::pending::<()>().await;
        }
        if self.fail_posts {
            return Err(TransportError::Status(503));
        }
        self.state.lock().unwrap().posted.push(message.clone());
        Ok(())
    }
}
