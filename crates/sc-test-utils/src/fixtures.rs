//! Test fixtures: configuration, identities, signals and a session harness.

use crate::mock_links::MockPeerLinkFactory;
use crate::mock_media::MockMediaDevices;
use crate::mock_signaling::MockSignalingBackend;

use common::secret::SecretString;
use common::types::ParticipantId;
use session_coordinator::media::LocalMedia;
use session_coordinator::session::ParticipantInfo;
use session_coordinator::{Collaborators, Config, SessionCoordinator, SessionEvent};
use signal_protocol::{IceCandidate, SignalMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const TEST_SESSION_ID: &str = "session-123";
pub const LOCAL_ID: &str = "alice";
pub const LOCAL_NAME: &str = "Alice";

/// Default configuration (3s open timeout, 2s poll interval, threshold 3).
#[must_use]
pub fn test_config() -> Config {
    Config::default()
}

#[must_use]
pub fn test_token() -> SecretString {
    SecretString::from("test-token")
}

#[must_use]
pub fn local_participant() -> ParticipantInfo {
    ParticipantInfo::new(LOCAL_ID, LOCAL_NAME)
}

/// Broadcast join from `id`.
#[must_use]
pub fn join_from(id: &str, display_name: &str) -> SignalMessage {
    SignalMessage::join(ParticipantId::from(id), display_name)
}

/// Join from `id` directed at the local participant.
#[must_use]
pub fn join_reply_from(id: &str, display_name: &str) -> SignalMessage {
    SignalMessage::join_to(ParticipantId::from(id), ParticipantId::from(LOCAL_ID), display_name)
}

#[must_use]
pub fn leave_from(id: &str) -> SignalMessage {
    SignalMessage::leave(ParticipantId::from(id))
}

/// Offer from `id` to the local participant.
#[must_use]
pub fn offer_from(id: &str) -> SignalMessage {
    SignalMessage::offer(
        ParticipantId::from(id),
        ParticipantId::from(LOCAL_ID),
        format!("remote-offer-{id}"),
    )
}

/// Answer from `id` to the local participant.
#[must_use]
pub fn answer_from(id: &str) -> SignalMessage {
    SignalMessage::answer(
        ParticipantId::from(id),
        ParticipantId::from(LOCAL_ID),
        format!("remote-answer-{id}"),
    )
}

#[must_use]
pub fn candidate_from(id: &str, candidate: &str) -> SignalMessage {
    SignalMessage::ice_candidate(
        ParticipantId::from(id),
        ParticipantId::from(LOCAL_ID),
        IceCandidate {
            candidate: candidate.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        },
    )
}

/// Install a test tracing subscriber honouring `RUST_LOG`. Safe to call
/// from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A coordinator wired to mocks, plus its event stream.
pub struct TestSession {
    pub coordinator: SessionCoordinator,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
    pub signaling: MockSignalingBackend,
    pub devices: MockMediaDevices,
    pub links: MockPeerLinkFactory,
}

impl TestSession {
    /// Session whose socket never opens, so it runs on HTTP polling after
    /// the open timeout.
    #[must_use]
    pub fn poll_only() -> Self {
        Self::with_mocks(
            test_config(),
            MockSignalingBackend::poll_only(),
            MockMediaDevices::granting(),
            MockPeerLinkFactory::new(),
        )
    }

    #[must_use]
    pub fn with_mocks(
        config: Config,
        signaling: MockSignalingBackend,
        devices: MockMediaDevices,
        links: MockPeerLinkFactory,
    ) -> Self {
        let collaborators = Collaborators {
            signaling: Arc::new(signaling.clone()),
            media: Arc::new(devices.clone()),
            links: Arc::new(links.clone()),
        };
        let (coordinator, events) = SessionCoordinator::new(config, collaborators);

        Self {
            coordinator,
            events,
            signaling,
            devices,
            links,
        }
    }

    /// Initialize as the local participant.
    pub async fn initialize(&self) -> LocalMedia {
        self.coordinator
            .initialize(TEST_SESSION_ID, local_participant(), test_token())
            .await
            .expect("initialize should succeed")
    }

    /// Initialize and join.
    pub async fn join(&self) -> LocalMedia {
        let media = self.initialize().await;
        self.coordinator
            .join_session()
            .await
            .expect("join should succeed");
        media
    }

    /// Let spawned actors run. Under paused time this also lets pending
    /// timers fire once the runtime is idle.
    pub async fn settle(&self) {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    /// Advance paused time by `duration` and let actors react.
    pub async fn advance(&self, duration: Duration) {
        tokio::time::advance(duration).await;
        self.settle().await;
    }

    /// Everything currently queued on the event stream.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait (in paused time) until an event matches, returning it.
    ///
    /// # Panics
    ///
    /// Panics if no matching event arrives within `timeout`.
    pub async fn wait_for_event(
        &mut self,
        timeout: Duration,
        mut matches: impl FnMut(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(timeout, async {
            loop {
                match self.events.recv().await {
                    Some(event) if matches(&event) => return event,
                    Some(_) => {}
                    None => panic!("event stream closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }
}
