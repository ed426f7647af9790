//! Local media acquisition.
//!
//! Capture itself belongs to the embedding platform; the controller asks for
//! one microphone + camera pair per join and wraps the tracks in handles.

use crate::errors::SignalingError;
use crate::stream::{LocalStreams, MediaTrack, StreamHandle, StreamKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw tracks returned by the capture collaborator.
pub struct CapturedTracks {
    pub audio: Arc<dyn MediaTrack>,
    pub video: Arc<dyn MediaTrack>,
}

/// Camera/microphone capture collaborator.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn create_microphone_audio_and_camera_stream(
        &self,
    ) -> Result<CapturedTracks, SignalingError>;
}

/// Capture a fresh local audio/video pair.
///
/// # Errors
///
/// Propagates capture failures, and rejects a pair whose tracks are not one
/// audio and one video track (the tracks are released first).
pub async fn acquire_local_streams(
    devices: &dyn MediaDevices,
) -> Result<LocalStreams, SignalingError> {
    let captured = devices.create_microphone_audio_and_camera_stream().await?;

    if captured.audio.kind() != StreamKind::Audio || captured.video.kind() != StreamKind::Video {
        warn!(
            target: "p2p.session.media",
            audio_kind = captured.audio.kind().as_str(),
            video_kind = captured.video.kind().as_str(),
            "Capture returned mismatched track kinds"
        );
        captured.audio.release();
        captured.video.release();
        return Err(SignalingError::MediaCapture(
            "capture returned mismatched track kinds".to_string(),
        ));
    }

    debug!(
        target: "p2p.session.media",
        audio_track = captured.audio.id(),
        video_track = captured.video.id(),
        "Local media acquired"
    );

    Ok(LocalStreams {
        audio: StreamHandle::new(captured.audio),
        video: StreamHandle::new(captured.video),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::stream::Sink;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTrack {
        kind: StreamKind,
        releases: AtomicUsize,
    }

    impl CountingTrack {
        fn new(kind: StreamKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                releases: AtomicUsize::new(0),
            })
        }
    }

    impl MediaTrack for CountingTrack {
        fn id(&self) -> &str {
            self.kind.as_str()
        }
        fn kind(&self) -> StreamKind {
            self.kind
        }
        fn attach(&self, _sink: &dyn Sink) {}
        fn detach(&self) {}
        fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Devices {
        audio: Arc<CountingTrack>,
        video: Arc<CountingTrack>,
    }

    #[async_trait]
    impl MediaDevices for Devices {
        async fn create_microphone_audio_and_camera_stream(
            &self,
        ) -> Result<CapturedTracks, SignalingError> {
            Ok(CapturedTracks {
                audio: self.audio.clone(),
                video: self.video.clone(),
            })
        }
    }

    #[tokio::test]
    async fn test_acquire_wraps_detached_handles() {
        let devices = Devices {
            audio: CountingTrack::new(StreamKind::Audio),
            video: CountingTrack::new(StreamKind::Video),
        };

        let streams = acquire_local_streams(&devices).await.unwrap();
        assert_eq!(streams.audio.kind(), StreamKind::Audio);
        assert_eq!(streams.video.kind(), StreamKind::Video);
        assert!(!streams.video.is_attached());
    }

    #[tokio::test]
    async fn test_mismatched_kinds_released_and_rejected() {
        let devices = Devices {
            audio: CountingTrack::new(StreamKind::Video),
            video: CountingTrack::new(StreamKind::Video),
        };

        let err = acquire_local_streams(&devices).await.unwrap_err();
        assert!(matches!(err, SignalingError::MediaCapture(_)));
        assert_eq!(devices.audio.releases.load(Ordering::SeqCst), 1);
        assert_eq!(devices.video.releases.load(Ordering::SeqCst), 1);
    }
}
