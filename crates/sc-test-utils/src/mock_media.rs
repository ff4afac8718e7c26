//! Mock capture devices.
//!
//! Each successful acquisition returns fresh tracks, and every stream handed
//! out is kept so tests can check that tracks were stopped.

use async_trait::async_trait;
use session_coordinator::media::{DeviceError, MediaDevices, MediaStream, MediaTrack, TrackKind};
use std::sync::{Arc, Mutex};

/// How an acquisition behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceBehavior {
    #[default]
    Grant,
    Deny,
    /// Never completes; for abandoning acquisition on leave.
    Hang,
}

/// Mock camera/microphone and screen capture.
#[derive(Debug, Clone, Default)]
pub struct MockMediaDevices {
    user: DeviceBehavior,
    display: DeviceBehavior,
    user_streams: Arc<Mutex<Vec<MediaStream>>>,
    display_streams: Arc<Mutex<Vec<MediaStream>>>,
}

impl MockMediaDevices {
    /// Grants both camera/microphone and screen capture.
    #[must_use]
    pub fn granting() -> Self {
        Self::default()
    }

    /// Denies camera/microphone.
    #[must_use]
    pub fn denying() -> Self {
        Self::default().with_user_media(DeviceBehavior::Deny)
    }

    #[must_use]
    pub fn with_user_media(mut self, behavior: DeviceBehavior) -> Self {
        self.user = behavior;
        self
    }

    #[must_use]
    pub fn with_display_media(mut self, behavior: DeviceBehavior) -> Self {
        self.display = behavior;
        self
    }

    /// Camera/microphone streams handed out so far.
    #[must_use]
    pub fn user_streams(&self) -> Vec<MediaStream> {
        self.user_streams.lock().unwrap().clone()
    }

    /// Screen streams handed out so far.
    #[must_use]
    pub fn display_streams(&self) -> Vec<MediaStream> {
        self.display_streams.lock().unwrap().clone()
    }

    /// Every track handed out so far.
    #[must_use]
    pub fn all_tracks(&self) -> Vec<MediaTrack> {
        self.user_streams()
            .iter()
            .chain(self.display_streams().iter())
            .flat_map(|s| s.tracks().to_vec())
            .collect()
    }
}

async fn acquire(
    behavior: DeviceBehavior,
    make: impl FnOnce() -> MediaStream,
    issued: &Mutex<Vec<MediaStream>>,
) -> Result<MediaStream, DeviceError> {
    match behavior {
        DeviceBehavior::Grant => {
            let stream = make();
            issued.lock().unwrap().push(stream.clone());
            Ok(stream)
        }
        DeviceBehavior::Deny => Err(DeviceError::PermissionDenied),
        DeviceBehavior::Hang => std::future::pending().await,
    }
}

#[async_trait]
impl MediaDevices for MockMediaDevices {
    async fn acquire_user_media(&self) -> Result<MediaStream, DeviceError> {
        acquire(
            self.user,
            || {
                MediaStream::new(vec![
                    MediaTrack::new(TrackKind::Audio, "mock-microphone"),
                    MediaTrack::new(TrackKind::Video, "mock-camera"),
                ])
            },
            &self.user_streams,
        )
        .await
    }

    async fn acquire_display_media(&self) -> Result<MediaStream, DeviceError> {
        acquire(
            self.display,
            || MediaStream::new(vec![MediaTrack::new(TrackKind::Video, "mock-screen")]),
            &self.display_streams,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_granting_returns_audio_and_video() {
        let devices = MockMediaDevices::granting();
        let stream = devices.acquire_user_media().await.unwrap();

        assert!(stream.track(TrackKind::Audio).is_some());
        assert!(stream.track(TrackKind::Video).is_some());
        assert_eq!(devices.user_streams().len(), 1);
    }

    #[tokio::test]
    async fn test_denying() {
        let devices = MockMediaDevices::denying();
        assert!(matches!(
            devices.acquire_user_media().await,
            Err(DeviceError::PermissionDenied)
        ));
        assert!(devices.acquire_display_media().await.is_ok());
    }
}
