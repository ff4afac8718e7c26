//! Session lifecycle tests.
//!
//! Exercises `SessionCoordinator` end to end against mock collaborators:
//! - initialize / join / leave, including misuse and idempotence
//! - local media controls (toggle, screen share)
//! - the poll and direct-fallback scenarios

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use common::types::ParticipantId;
use sc_test_utils::{
    join_from, local_participant, test_config, test_token, DeviceBehavior, MockMediaDevices,
    MockPeerLinkFactory, MockSignalingBackend, SocketBehavior, TestSession, LOCAL_ID,
    TEST_SESSION_ID,
};
use session_coordinator::media::TrackKind;
use session_coordinator::peer::ConnectionState;
use session_coordinator::session::SessionPhase;
use session_coordinator::transport::{TransportKind, FALLBACK_PARTICIPANT_ID};
use session_coordinator::{ScError, SessionEvent};
use signal_protocol::{SignalBody, SignalKind};

fn count_kind(session: &TestSession, kind: SignalKind) -> usize {
    session
        .signaling
        .sent()
        .iter()
        .filter(|m| m.kind() == kind)
        .count()
}

// ============================================================================
// Initialize
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_initialize_emits_local_stream_with_default_mute_state() {
    let mut session = TestSession::poll_only();
    let media = session.initialize().await;

    let audio = media.camera.track(TrackKind::Audio).unwrap();
    let video = media.camera.track(TrackKind::Video).unwrap();
    assert!(!audio.is_enabled(), "audio starts muted");
    assert!(video.is_enabled(), "video starts enabled");

    let events = session.drain_events();
    assert!(matches!(
        events.first(),
        Some(SessionEvent::LocalStream(stream)) if stream.id() == media.camera.id()
    ));

    let state = session.coordinator.state().await.unwrap();
    assert_eq!(state.phase, SessionPhase::Initialized);
    assert_eq!(state.session_id.unwrap().as_str(), TEST_SESSION_ID);
    assert_eq!(state.active_transport, Some(TransportKind::PrimarySocket));
}

#[tokio::test(start_paused = true)]
async fn test_initialize_media_denied_fails_and_emits_error() {
    let mut session = TestSession::with_mocks(
        test_config(),
        MockSignalingBackend::healthy(),
        MockMediaDevices::denying(),
        MockPeerLinkFactory::new(),
    );

    let result = session
        .coordinator
        .initialize(TEST_SESSION_ID, local_participant(), test_token())
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, ScError::MediaAccess(_)));
    assert!(err.is_fatal());
    assert!(matches!(
        session.drain_events().as_slice(),
        [SessionEvent::Error { .. }]
    ));
    // Signaling is never attempted without media.
    assert_eq!(session.signaling.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_twice_is_invalid() {
    let session = TestSession::poll_only();
    session.initialize().await;

    let second = session
        .coordinator
        .initialize(TEST_SESSION_ID, local_participant(), test_token())
        .await;
    assert!(matches!(second, Err(ScError::InvalidState(_))));
}

#[tokio::test(start_paused = true)]
async fn test_join_before_initialize_is_invalid() {
    let session = TestSession::poll_only();
    assert!(matches!(
        session.coordinator.join_session().await,
        Err(ScError::InvalidState(_))
    ));
}

// ============================================================================
// Join
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_join_twice_sends_one_join() {
    let session = TestSession::with_mocks(
        test_config(),
        MockSignalingBackend::healthy(),
        MockMediaDevices::granting(),
        MockPeerLinkFactory::new(),
    );
    session.join().await;
    session.coordinator.join_session().await.unwrap();
    session.settle().await;

    assert_eq!(count_kind(&session, SignalKind::Join), 1);
    let join = session.signaling.socket_sent().into_iter().next().unwrap();
    assert!(join.is_broadcast());
    assert_eq!(join.sender, ParticipantId::from(LOCAL_ID));

    // A join from a peer still yields exactly one connection.
    session.signaling.deliver(join_from("bob", "Bob"));
    session.settle().await;
    session.coordinator.join_session().await.unwrap();
    session.settle().await;

    assert_eq!(session.links.link_count("bob"), 1);
    assert_eq!(count_kind(&session, SignalKind::Join), 2, "our join plus the reply to bob");
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_primary_timeout_then_join_from_peer_creates_one_connection() {
    let mut session = TestSession::poll_only();
    session.join().await;

    session.advance(Duration::from_secs(3)).await;
    let state = session.coordinator.state().await.unwrap();
    assert_eq!(state.active_transport, Some(TransportKind::HttpPoll));

    session.signaling.deliver(join_from("bob", "Bob"));
    session.advance(Duration::from_secs(2)).await;

    let state = session.coordinator.state().await.unwrap();
    assert_eq!(
        state.connections,
        vec![(ParticipantId::from("bob"), ConnectionState::Connecting)]
    );

    let offers: Vec<_> = session
        .signaling
        .posted()
        .into_iter()
        .filter(|m| m.kind() == SignalKind::Offer)
        .collect();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers.first().unwrap().target, Some(ParticipantId::from("bob")));

    let events = session.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ParticipantJoined { participant_id, display_name }
            if participant_id.as_str() == "bob" && display_name == "Bob"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ConnectionStateChanged { peer_id, state: ConnectionState::Connecting }
            if peer_id.as_str() == "bob"
    )));

    // Our reply tells bob who we are.
    assert!(session.signaling.posted().iter().any(|m| matches!(
        &m.body,
        SignalBody::Join(_)
    ) && m.target == Some(ParticipantId::from("bob"))));
}

#[tokio::test(start_paused = true)]
async fn test_three_poll_failures_activate_direct_fallback() {
    let mut session = TestSession::with_mocks(
        test_config(),
        MockSignalingBackend::builder()
            .socket(SocketBehavior::NeverOpens)
            .failing_polls(3)
            .build(),
        MockMediaDevices::granting(),
        MockPeerLinkFactory::new(),
    );
    let media = session.join().await;

    // Open timeout, then polls at +0s, +2s, +4s.
    session.advance(Duration::from_secs(3)).await;
    session.advance(Duration::from_secs(2)).await;
    session.drain_events();
    tokio::time::advance(Duration::from_secs(2)).await;

    let joined = session
        .wait_for_event(Duration::from_secs(1), |e| {
            matches!(e, SessionEvent::ParticipantJoined { .. })
        })
        .await;
    assert!(matches!(
        joined,
        SessionEvent::ParticipantJoined { participant_id, .. }
            if participant_id.as_str() == FALLBACK_PARTICIPANT_ID
    ));

    let connected = session
        .wait_for_event(Duration::from_secs(1), |e| {
            matches!(e, SessionEvent::ConnectionStateChanged { .. })
        })
        .await;
    assert!(matches!(
        connected,
        SessionEvent::ConnectionStateChanged { peer_id, state: ConnectionState::Connected }
            if peer_id.as_str() == FALLBACK_PARTICIPANT_ID
    ));

    let stream = session
        .wait_for_event(Duration::from_secs(1), |e| {
            matches!(e, SessionEvent::RemoteStreamAdded { .. })
        })
        .await;
    assert!(matches!(
        stream,
        SessionEvent::RemoteStreamAdded { peer_id, stream }
            if peer_id.as_str() == FALLBACK_PARTICIPANT_ID && stream.id() == media.camera.id()
    ));

    let participants = session.coordinator.participants().await.unwrap();
    assert_eq!(participants.len(), 1);
    let state = session.coordinator.state().await.unwrap();
    assert_eq!(state.active_transport, Some(TransportKind::DirectFallback));
    assert_eq!(
        state.connections,
        vec![(
            ParticipantId::from(FALLBACK_PARTICIPANT_ID),
            ConnectionState::Connected
        )]
    );

    // The self view closes with the session like any other connection.
    session.coordinator.leave_session().await.unwrap();
    assert!(session.drain_events().iter().any(|e| matches!(
        e,
        SessionEvent::ConnectionStateChanged { peer_id, state: ConnectionState::Closed }
            if peer_id.as_str() == FALLBACK_PARTICIPANT_ID
    )));
}

// ============================================================================
// Local media controls
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_toggle_audio_twice_returns_true_then_false() {
    let session = TestSession::poll_only();
    let media = session.initialize().await;

    assert!(session.coordinator.toggle_audio().await.unwrap());
    assert!(!session.coordinator.toggle_audio().await.unwrap());
    assert!(!media.camera.track(TrackKind::Audio).unwrap().is_enabled());

    assert!(!session.coordinator.toggle_video().await.unwrap());
    assert!(!media.camera.track(TrackKind::Video).unwrap().is_enabled());
}

#[tokio::test(start_paused = true)]
async fn test_toggle_before_initialize_is_invalid() {
    let session = TestSession::poll_only();
    assert!(matches!(
        session.coordinator.toggle_audio().await,
        Err(ScError::InvalidState(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_screen_share_swaps_and_restores_video_on_every_peer() {
    let session = TestSession::with_mocks(
        test_config(),
        MockSignalingBackend::healthy(),
        MockMediaDevices::granting(),
        MockPeerLinkFactory::new(),
    );
    let media = session.join().await;
    let camera_video = media.camera.track(TrackKind::Video).unwrap().id().to_string();

    session.signaling.deliver(join_from("bob", "Bob"));
    session.signaling.deliver(join_from("carol", "Carol"));
    session.settle().await;
    for peer in ["bob", "carol"] {
        assert_eq!(session.links.sending(peer, TrackKind::Video), Some(camera_video.clone()));
    }

    let screen = session.coordinator.start_screen_share().await.unwrap();
    session.settle().await;
    let screen_video = screen.track(TrackKind::Video).unwrap().id().to_string();
    for peer in ["bob", "carol"] {
        assert_eq!(session.links.sending(peer, TrackKind::Video), Some(screen_video.clone()));
    }
    assert!(session.coordinator.state().await.unwrap().screen_sharing);

    session.coordinator.stop_screen_share().await.unwrap();
    session.settle().await;
    for peer in ["bob", "carol"] {
        assert_eq!(session.links.sending(peer, TrackKind::Video), Some(camera_video.clone()));
    }
    assert!(screen.track(TrackKind::Video).unwrap().is_stopped());
    assert!(!media.camera.track(TrackKind::Video).unwrap().is_stopped());

    // Stopping again is a no-op.
    session.coordinator.stop_screen_share().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_screen_share_denied_leaves_session_untouched() {
    let mut session = TestSession::with_mocks(
        test_config(),
        MockSignalingBackend::healthy(),
        MockMediaDevices::granting().with_display_media(DeviceBehavior::Deny),
        MockPeerLinkFactory::new(),
    );
    session.join().await;
    session.drain_events();

    let result = session.coordinator.start_screen_share().await;
    assert!(matches!(result, Err(ScError::ScreenCapture(_))));
    assert!(!session.coordinator.state().await.unwrap().screen_sharing);
    assert_eq!(session.coordinator.state().await.unwrap().phase, SessionPhase::Joined);
    assert!(matches!(
        session.drain_events().as_slice(),
        [SessionEvent::Error { .. }]
    ));
}

// ============================================================================
// Leave
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_leave_closes_everything_and_silences_events() {
    let mut session = TestSession::with_mocks(
        test_config(),
        MockSignalingBackend::healthy(),
        MockMediaDevices::granting(),
        MockPeerLinkFactory::new(),
    );
    session.join().await;
    session.signaling.deliver(join_from("bob", "Bob"));
    session.signaling.deliver(join_from("carol", "Carol"));
    session.settle().await;
    session.coordinator.start_screen_share().await.unwrap();
    session.settle().await;
    session.drain_events();

    session.coordinator.leave_session().await.unwrap();

    // Each connection reported Closed before leave returned.
    let events = session.drain_events();
    session.settle().await;
    for peer in ["bob", "carol"] {
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::ConnectionStateChanged { peer_id, state: ConnectionState::Closed }
                if peer_id.as_str() == peer
        )));
        assert!(session.links.is_closed(peer));
        assert_eq!(session.links.open_link_count(peer), 0);
    }

    for track in session.devices.all_tracks() {
        assert!(track.is_stopped(), "track {} still live", track.label());
    }
    assert_eq!(count_kind(&session, SignalKind::Leave), 1);

    // Nothing after leave, even if the server keeps talking.
    session.signaling.deliver(join_from("dave", "Dave"));
    session.advance(Duration::from_secs(10)).await;
    assert!(session.drain_events().is_empty());
    assert!(session.events.recv().await.is_none());

    // Idempotent, and the session is over.
    session.coordinator.leave_session().await.unwrap();
    assert!(matches!(
        session.coordinator.join_session().await,
        Err(ScError::SessionEnded)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_leave_before_join_sends_no_leave() {
    let session = TestSession::with_mocks(
        test_config(),
        MockSignalingBackend::healthy(),
        MockMediaDevices::granting(),
        MockPeerLinkFactory::new(),
    );
    session.initialize().await;
    session.coordinator.leave_session().await.unwrap();

    assert_eq!(count_kind(&session, SignalKind::Leave), 0);
}

#[tokio::test(start_paused = true)]
async fn test_leave_abandons_pending_media_acquisition() {
    let session = TestSession::with_mocks(
        test_config(),
        MockSignalingBackend::healthy(),
        MockMediaDevices::granting().with_user_media(DeviceBehavior::Hang),
        MockPeerLinkFactory::new(),
    );

    let (init, leave) = tokio::join!(
        session
            .coordinator
            .initialize(TEST_SESSION_ID, local_participant(), test_token()),
        async {
            session.settle().await;
            session.coordinator.leave_session().await
        }
    );

    assert!(matches!(init, Err(ScError::SessionEnded)));
    assert!(leave.is_ok());
    assert_eq!(session.signaling.open_count(), 0);
}
