//! `TransportRouterActor` - one active signaling transport per session.
//!
//! The router hides which transport is in use. Callers `send` messages and
//! read a single [`RouterOutput`] stream; the router walks the failover policy
//! in [`failover`](super::failover) and performs the side effects of each
//! state:
//!
//! - **Primary Socket**: opened at spawn; must report open within
//!   `primary_open_timeout`. Sends are buffered until then and flushed on
//!   open. Any socket error, before or after open, fails over.
//! - **HTTP Poll**: polls every `poll_interval` with a `since` cursor; sends
//!   are POSTs. Poll and send failures are counted separately and either
//!   counter reaching `transport_error_threshold` fails over.
//! - **Direct Fallback**: no server. Announces a synthetic self-view
//!   participant; sends are counted and dropped.
//!
//! `Connected` is reported exactly once, by whichever transport first works.

use super::backend::{SignalingBackend, SocketChannel, SocketEvent};
use super::failover::{ErrorCounter, FailoverEvent, FailoverState, TransportKind};
use crate::config::Config;
use crate::errors::ScError;
use crate::observability::metrics;

use common::secret::SecretString;
use common::types::{ParticipantId, SessionId};
use signal_protocol::SignalMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the router mailbox.
const ROUTER_CHANNEL_BUFFER: usize = 256;

/// How long `shutdown` waits for the router to flush before cancelling it.
const ROUTER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Participant id announced for the direct-fallback self view.
pub const FALLBACK_PARTICIPANT_ID: &str = "direct-fallback";

/// Output of the router, in order.
#[derive(Debug, Clone)]
pub enum RouterOutput {
    /// A transport is working. Reported once per router.
    Connected(TransportKind),
    /// Inbound signaling message from the active transport.
    Message(SignalMessage),
    /// Direct Fallback engaged; show `participant_id` as a self view.
    FallbackActivated {
        participant_id: ParticipantId,
        display_name: String,
    },
}

/// Messages handled by the `TransportRouterActor`.
#[derive(Debug)]
pub enum RouterMessage {
    Send(SignalMessage),
    GetTransport {
        respond_to: oneshot::Sender<TransportKind>,
    },
    /// Flush and stop. Replies before exiting.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Handle to the `TransportRouterActor`.
#[derive(Clone, Debug)]
pub struct TransportRouterHandle {
    sender: mpsc::Sender<RouterMessage>,
    cancel_token: CancellationToken,
}

impl TransportRouterHandle {
    /// Send a message over the active transport.
    pub async fn send(&self, message: SignalMessage) -> Result<(), ScError> {
        self.sender
            .send(RouterMessage::Send(message))
            .await
            .map_err(|e| ScError::SignalingTransport(format!("router closed: {e}")))
    }

    /// Transport currently in use (or being attempted).
    pub async fn active_transport(&self) -> Result<TransportKind, ScError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RouterMessage::GetTransport { respond_to: tx })
            .await
            .map_err(|e| ScError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| ScError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop the router after it has handled everything already queued.
    ///
    /// Waits at most `ROUTER_SHUTDOWN_TIMEOUT`, then cancels.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RouterMessage::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            if tokio::time::timeout(ROUTER_SHUTDOWN_TIMEOUT, rx).await.is_err() {
                warn!(target: "sc.transport.router", "Router shutdown timed out, cancelling");
            }
        }
        self.cancel_token.cancel();
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

async fn next_socket_event(socket: Option<&mut SocketChannel>) -> Option<SocketEvent> {
    match socket {
        Some(channel) => channel.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_tick(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// The `TransportRouterActor` implementation.
pub struct TransportRouterActor {
    session_id: SessionId,
    token: SecretString,
    backend: Arc<dyn SignalingBackend>,
    config: Config,
    state: FailoverState,
    socket: Option<SocketChannel>,
    open_deadline: Option<Instant>,
    poll_timer: Option<Interval>,
    /// Highest server timestamp seen while polling.
    since: Option<i64>,
    poll_errors: ErrorCounter,
    send_errors: ErrorCounter,
    /// Sends waiting for the primary socket to open.
    pending: Vec<SignalMessage>,
    connected_reported: bool,
    output: mpsc::UnboundedSender<RouterOutput>,
    receiver: mpsc::Receiver<RouterMessage>,
    cancel_token: CancellationToken,
}

impl TransportRouterActor {
    /// Spawn the router and start connecting.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        session_id: SessionId,
        token: SecretString,
        backend: Arc<dyn SignalingBackend>,
        config: Config,
        output: mpsc::UnboundedSender<RouterOutput>,
        cancel_token: CancellationToken,
    ) -> (TransportRouterHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROUTER_CHANNEL_BUFFER);
        let threshold = config.transport_error_threshold;

        let actor = Self {
            session_id,
            token,
            backend,
            config,
            state: FailoverState::PrimaryPending,
            socket: None,
            open_deadline: None,
            poll_timer: None,
            since: None,
            poll_errors: ErrorCounter::new(threshold),
            send_errors: ErrorCounter::new(threshold),
            pending: Vec::new(),
            connected_reported: false,
            output,
            receiver,
            cancel_token: cancel_token.clone(),
        };

        let task_handle = tokio::spawn(actor.run());

        (
            TransportRouterHandle {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    #[instrument(skip_all, name = "sc.transport.router", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        debug!(
            target: "sc.transport.router",
            session_id = %self.session_id,
            "TransportRouterActor started"
        );

        self.start_primary().await;

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sc.transport.router",
                        session_id = %self.session_id,
                        "TransportRouterActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if self.handle_message(message).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }

                event = next_socket_event(self.socket.as_mut()) => {
                    self.handle_socket_event(event).await;
                }

                () = sleep_until_deadline(self.open_deadline) => {
                    self.open_deadline = None;
                    warn!(
                        target: "sc.transport.router",
                        session_id = %self.session_id,
                        timeout_ms = u64::try_from(self.config.primary_open_timeout.as_millis()).unwrap_or(u64::MAX),
                        "Primary socket did not open in time"
                    );
                    self.apply(FailoverEvent::PrimaryOpenTimeout).await;
                }

                () = next_tick(self.poll_timer.as_mut()) => {
                    self.poll_once().await;
                }
            }
        }

        metrics::transport_deactivated(self.state.transport().as_str());
        debug!(
            target: "sc.transport.router",
            session_id = %self.session_id,
            transport = %self.state.transport(),
            "TransportRouterActor stopped"
        );
    }

    /// Returns true if the actor should exit.
    async fn handle_message(&mut self, message: RouterMessage) -> bool {
        match message {
            RouterMessage::Send(message) => self.handle_send(message).await,
            RouterMessage::GetTransport { respond_to } => {
                let _ = respond_to.send(self.state.transport());
            }
            RouterMessage::Shutdown { respond_to } => {
                // Dropping the socket channel lets the socket task flush and close.
                self.socket = None;
                let _ = respond_to.send(());
                return true;
            }
        }
        false
    }

    async fn start_primary(&mut self) {
        metrics::transport_activated(TransportKind::PrimarySocket.as_str());

        match self.backend.open_socket(&self.session_id, &self.token).await {
            Ok(channel) => {
                self.socket = Some(channel);
                self.open_deadline = Some(Instant::now() + self.config.primary_open_timeout);
                debug!(
                    target: "sc.transport.router",
                    session_id = %self.session_id,
                    "Waiting for primary socket to open"
                );
            }
            Err(e) => {
                warn!(
                    target: "sc.transport.router",
                    session_id = %self.session_id,
                    error = %e,
                    "Primary socket unavailable"
                );
                self.apply(FailoverEvent::PrimaryError).await;
            }
        }
    }

    async fn handle_socket_event(&mut self, event: Option<SocketEvent>) {
        match event {
            Some(SocketEvent::Opened) => self.apply(FailoverEvent::PrimaryOpened).await,
            Some(SocketEvent::Message(message)) => self.emit(RouterOutput::Message(message)),
            Some(SocketEvent::Error(reason)) => {
                warn!(
                    target: "sc.transport.router",
                    session_id = %self.session_id,
                    error = %reason,
                    "Primary socket error"
                );
                self.apply(FailoverEvent::PrimaryError).await;
            }
            Some(SocketEvent::Closed) | None => {
                warn!(
                    target: "sc.transport.router",
                    session_id = %self.session_id,
                    "Primary socket closed"
                );
                self.apply(FailoverEvent::PrimaryError).await;
            }
        }
    }

    async fn handle_send(&mut self, message: SignalMessage) {
        match self.state {
            FailoverState::PrimaryPending => self.pending.push(message),
            FailoverState::PrimaryActive => {
                let delivered = self
                    .socket
                    .as_ref()
                    .is_some_and(|socket| socket.outbound.send(message.clone()).is_ok());
                if !delivered {
                    metrics::record_delivery_error(TransportKind::PrimarySocket.as_str(), "send");
                    // Retried on the next transport.
                    self.pending.push(message);
                    self.apply(FailoverEvent::PrimaryError).await;
                }
            }
            FailoverState::HttpPoll => {
                if self.post(&message).await {
                    self.apply(FailoverEvent::SendErrorThreshold).await;
                }
            }
            FailoverState::DirectFallback => {
                metrics::record_signal_suppressed();
                debug!(
                    target: "sc.transport.router",
                    session_id = %self.session_id,
                    kind = %message.kind(),
                    "Direct fallback active, message suppressed"
                );
            }
        }
    }

    /// POST one message. Returns true if the send error threshold was reached.
    ///
    /// A post still in flight when the router is cancelled is abandoned.
    async fn post(&mut self, message: &SignalMessage) -> bool {
        let result = tokio::select! {
            result = self.backend.post(&self.session_id, &self.token, message) => result,
            () = self.cancel_token.cancelled() => {
                debug!(
                    target: "sc.transport.router",
                    session_id = %self.session_id,
                    kind = %message.kind(),
                    "Send abandoned on cancellation"
                );
                return false;
            }
        };

        match result {
            Ok(()) => {
                self.send_errors.record_success();
                false
            }
            Err(e) => {
                let err = ScError::from(e);
                metrics::record_delivery_error(TransportKind::HttpPoll.as_str(), "send");
                let tripped = self.send_errors.record_failure();
                warn!(
                    target: "sc.transport.router",
                    session_id = %self.session_id,
                    kind = %message.kind(),
                    error = %err,
                    error_type = err.error_type_label(),
                    consecutive_errors = self.send_errors.consecutive(),
                    "Signaling send failed"
                );
                tripped
            }
        }
    }

    async fn poll_once(&mut self) {
        if self.state != FailoverState::HttpPoll {
            return;
        }

        let result = tokio::select! {
            result = self.backend.poll(&self.session_id, &self.token, self.since) => result,
            () = self.cancel_token.cancelled() => return,
        };

        match result {
            Ok(batch) => {
                self.poll_errors.record_success();
                self.report_connected(TransportKind::HttpPoll);

                if let Some(cursor) = batch.cursor {
                    self.since = Some(self.since.map_or(cursor, |since| since.max(cursor)));
                }
                for message in batch.messages {
                    self.emit(RouterOutput::Message(message));
                }
            }
            Err(e) => {
                let err = ScError::from(e);
                metrics::record_delivery_error(TransportKind::HttpPoll.as_str(), "poll");
                let tripped = self.poll_errors.record_failure();
                warn!(
                    target: "sc.transport.router",
                    session_id = %self.session_id,
                    error = %err,
                    error_type = err.error_type_label(),
                    consecutive_errors = self.poll_errors.consecutive(),
                    "Signaling poll failed"
                );
                if tripped {
                    self.apply(FailoverEvent::PollErrorThreshold).await;
                }
            }
        }
    }

    /// Feed `event` to the policy, following up on any event that entering
    /// the new state itself produces.
    async fn apply(&mut self, event: FailoverEvent) {
        let mut next_event = Some(event);
        while let Some(event) = next_event.take() {
            next_event = self.transition(event).await;
        }
    }

    async fn transition(&mut self, event: FailoverEvent) -> Option<FailoverEvent> {
        let from = self.state;
        let to = from.next(event);
        if to == from {
            debug!(
                target: "sc.transport.router",
                session_id = %self.session_id,
                event = event.as_str(),
                state = ?from,
                "Failover event has no effect"
            );
            return None;
        }
        self.state = to;

        if from.transport() != to.transport() {
            info!(
                target: "sc.transport.router",
                session_id = %self.session_id,
                from = %from.transport(),
                to = %to.transport(),
                reason = event.as_str(),
                "Signaling transport failover"
            );
            metrics::record_failover(from.transport().as_str(), to.transport().as_str());
            metrics::transport_deactivated(from.transport().as_str());
            metrics::transport_activated(to.transport().as_str());
        }

        match to {
            FailoverState::PrimaryPending => None,
            FailoverState::PrimaryActive => self.enter_primary_active(),
            FailoverState::HttpPoll => self.enter_http_poll().await,
            FailoverState::DirectFallback => {
                self.enter_direct_fallback();
                None
            }
        }
    }

    fn enter_primary_active(&mut self) -> Option<FailoverEvent> {
        self.open_deadline = None;
        self.report_connected(TransportKind::PrimarySocket);

        let socket = self.socket.as_ref()?;
        while !self.pending.is_empty() {
            let message = self.pending.remove(0);
            if socket.outbound.send(message.clone()).is_err() {
                self.pending.insert(0, message);
                return Some(FailoverEvent::PrimaryError);
            }
        }
        None
    }

    async fn enter_http_poll(&mut self) -> Option<FailoverEvent> {
        self.socket = None;
        self.open_deadline = None;

        let mut timer = tokio::time::interval(self.config.poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll_timer = Some(timer);

        for message in std::mem::take(&mut self.pending) {
            if self.post(&message).await {
                return Some(FailoverEvent::SendErrorThreshold);
            }
        }
        None
    }

    fn enter_direct_fallback(&mut self) {
        self.socket = None;
        self.open_deadline = None;
        self.poll_timer = None;

        for _ in self.pending.drain(..) {
            metrics::record_signal_suppressed();
        }

        self.report_connected(TransportKind::DirectFallback);
        self.emit(RouterOutput::FallbackActivated {
            participant_id: ParticipantId::from(FALLBACK_PARTICIPANT_ID),
            display_name: self.config.fallback_display_name.clone(),
        });
    }

    fn report_connected(&mut self, kind: TransportKind) {
        if self.connected_reported {
            return;
        }
        self.connected_reported = true;

        info!(
            target: "sc.transport.router",
            session_id = %self.session_id,
            transport = %kind,
            "Signaling connected"
        );
        self.emit(RouterOutput::Connected(kind));
    }

    fn emit(&self, output: RouterOutput) {
        if self.output.send(output).is_err() {
            debug!(
                target: "sc.transport.router",
                session_id = %self.session_id,
                "Router output closed"
            );
        }
    }
}
