//! Local media tracks and the capture device seam.
//!
//! A [`MediaTrack`] is a cheap handle; clones share the same `enabled` and
//! `stopped` flags, so a track handed to every peer connection can be muted or
//! stopped once by the session and every connection sees it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Kind of a media track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TrackKind::Audio => "audio",
            TrackKind::Video => "video",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
}

/// Shared handle to a single audio or video track.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    /// Create an enabled, live track with a fresh id.
    #[must_use]
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    /// Device label (e.g. "FaceTime HD Camera", "Screen 1").
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Enable or mute the track. A disabled track still flows but carries
    /// silence / black frames.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Release the underlying capture device. Irreversible.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaTrack {}

/// A set of tracks captured together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    #[must_use]
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), tracks)
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// First track of `kind`, if any.
    #[must_use]
    pub fn track(&self, kind: TrackKind) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Local media owned by a session: the camera/microphone stream and an
/// optional independent screen-capture stream.
#[derive(Debug, Clone)]
pub struct LocalMedia {
    pub camera: MediaStream,
    pub screen: Option<MediaStream>,
}

impl LocalMedia {
    #[must_use]
    pub fn new(camera: MediaStream) -> Self {
        Self {
            camera,
            screen: None,
        }
    }

    /// Tracks every peer connection should currently send, one per kind.
    ///
    /// While screen sharing the screen's video replaces the camera's.
    #[must_use]
    pub fn outbound_tracks(&self) -> HashMap<TrackKind, MediaTrack> {
        let mut tracks: HashMap<TrackKind, MediaTrack> = HashMap::new();
        for track in self.camera.tracks() {
            tracks.entry(track.kind()).or_insert_with(|| track.clone());
        }
        if let Some(video) = self
            .screen
            .as_ref()
            .and_then(|s| s.track(TrackKind::Video))
        {
            tracks.insert(TrackKind::Video, video.clone());
        }
        tracks
    }

    /// Stop every track, camera and screen.
    pub fn stop_all(&self) {
        self.camera.stop_all();
        if let Some(screen) = &self.screen {
            screen.stop_all();
        }
    }
}

/// Capture device failure.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Permission denied")]
    PermissionDenied,

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device error: {0}")]
    Other(String),
}

/// Capture device seam (camera/microphone and screen).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a stream with one audio and one video track.
    async fn acquire_user_media(&self) -> Result<MediaStream, DeviceError>;

    /// Acquire a screen-capture stream (at least one video track).
    async fn acquire_display_media(&self) -> Result<MediaStream, DeviceError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn camera() -> MediaStream {
        MediaStream::new(vec![
            MediaTrack::new(TrackKind::Audio, "mic"),
            MediaTrack::new(TrackKind::Video, "cam"),
        ])
    }

    #[test]
    fn test_clones_share_flags() {
        let track = MediaTrack::new(TrackKind::Audio, "mic");
        let shared = track.clone();

        shared.set_enabled(false);
        assert!(!track.is_enabled());

        track.stop();
        assert!(shared.is_stopped());
        assert_eq!(track, shared);
    }

    #[test]
    fn test_tracks_have_distinct_ids() {
        let a = MediaTrack::new(TrackKind::Video, "cam");
        let b = MediaTrack::new(TrackKind::Video, "cam");
        assert_ne!(a, b);
    }

    #[test]
    fn test_outbound_tracks_prefer_screen_video() {
        let mut media = LocalMedia::new(camera());
        let cam_video = media.camera.track(TrackKind::Video).unwrap().clone();
        assert_eq!(media.outbound_tracks()[&TrackKind::Video], cam_video);

        let screen_video = MediaTrack::new(TrackKind::Video, "Screen 1");
        media.screen = Some(MediaStream::new(vec![screen_video.clone()]));

        let outbound = media.outbound_tracks();
        assert_eq!(outbound[&TrackKind::Video], screen_video);
        assert_eq!(
            &outbound[&TrackKind::Audio],
            media.camera.track(TrackKind::Audio).unwrap()
        );
    }

    #[test]
    fn test_stop_all_covers_screen() {
        let mut media = LocalMedia::new(camera());
        media.screen = Some(MediaStream::new(vec![MediaTrack::new(
            TrackKind::Video,
            "Screen 1",
        )]));

        media.stop_all();

        assert!(media.camera.tracks().iter().all(MediaTrack::is_stopped));
        assert!(media
            .screen
            .as_ref()
            .unwrap()
            .tracks()
            .iter()
            .all(MediaTrack::is_stopped));
    }
}
