//! Recording media fakes.
//!
//! Every track and sink writes into a shared [`CallLog`], so tests can assert
//! on the exact order of media calls across all handles of a participant.
//! The loopback signaling service logs publishes into the same log.
//!
//! # Example
//!
//! ```rust,ignore
//! let log = CallLog::new();
//! let track = RecordingTrack::new(StreamKind::Video, log.clone());
//! // ... drive the controller ...
//! assert!(log.detached_before_release(track.id()));
//! ```

use async_trait::async_trait;
use p2p_session::errors::{SignalingError, StreamError};
use p2p_session::media::{CapturedTracks, MediaDevices};
use p2p_session::stream::{MediaTrack, Sink, StreamKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One observed call on a track or sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaCall {
    Attach { track: String, sink: String },
    Detach { track: String },
    Release { track: String },
    Play { sink: String },
    /// The track was published into a room.
    Publish { track: String },
}

impl MediaCall {
    /// Track the call was made on, if any.
    #[must_use]
    pub fn track(&self) -> Option<&str> {
        match self {
            MediaCall::Attach { track, .. }
            | MediaCall::Detach { track }
            | MediaCall::Release { track }
            | MediaCall::Publish { track } => Some(track),
            MediaCall::Play { .. } => None,
        }
    }
}

/// Shared, ordered log of media calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<MediaCall>>>);

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: MediaCall) {
        self.0.lock().unwrap().push(call);
    }

    /// All calls so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<MediaCall> {
        self.0.lock().unwrap().clone()
    }

    /// Calls made on one track, in order.
    #[must_use]
    pub fn track_calls(&self, track: &str) -> Vec<MediaCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.track() == Some(track))
            .collect()
    }

    #[must_use]
    pub fn release_count(&self, track: &str) -> usize {
        self.track_calls(track)
            .iter()
            .filter(|c| matches!(c, MediaCall::Release { .. }))
            .count()
    }

    #[must_use]
    pub fn is_released(&self, track: &str) -> bool {
        self.release_count(track) > 0
    }

    #[must_use]
    pub fn was_attached(&self, track: &str) -> bool {
        self.track_calls(track)
            .iter()
            .any(|c| matches!(c, MediaCall::Attach { .. }))
    }

    /// Whether `track` is currently bound to a sink.
    #[must_use]
    pub fn is_attached(&self, track: &str) -> bool {
        let mut attached = false;
        for call in self.track_calls(track) {
            match call {
                MediaCall::Attach { .. } => attached = true,
                MediaCall::Detach { .. } => attached = false,
                _ => {}
            }
        }
        attached
    }

    /// Every attach of `track` is followed by a detach before its release,
    /// and nothing happens after the release.
    #[must_use]
    pub fn detached_before_release(&self, track: &str) -> bool {
        let mut attached = false;
        let mut released = false;
        for call in self.track_calls(track) {
            if released {
                return false;
            }
            match call {
                MediaCall::Attach { .. } => attached = true,
                MediaCall::Detach { .. } => attached = false,
                MediaCall::Release { .. } => {
                    if attached {
                        return false;
                    }
                    released = true;
                }
                MediaCall::Play { .. } | MediaCall::Publish { .. } => {}
            }
        }
        true
    }

    /// `track` was published, and only attached after its publish.
    #[must_use]
    pub fn published_before_attached(&self, track: &str) -> bool {
        let calls = self.track_calls(track);
        let published = calls
            .iter()
            .position(|c| matches!(c, MediaCall::Publish { .. }));
        let attached = calls
            .iter()
            .position(|c| matches!(c, MediaCall::Attach { .. }));
        match (published, attached) {
            (Some(p), Some(a)) => p < a,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    #[must_use]
    pub fn play_count(&self, sink: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MediaCall::Play { sink: s } if s == sink))
            .count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

/// A track that records every call into a [`CallLog`].
#[derive(Debug)]
pub struct RecordingTrack {
    id: String,
    kind: StreamKind,
    log: CallLog,
}

impl RecordingTrack {
    /// New track with a generated id (`<kind>-<suffix>`).
    #[must_use]
    pub fn new(kind: StreamKind, log: CallLog) -> Arc<Self> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let short = suffix.get(..8).unwrap_or("00000000").to_string();
        Self::with_id(format!("{}-{short}", kind.as_str()), kind, log)
    }

    #[must_use]
    pub fn with_id(id: impl Into<String>, kind: StreamKind, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            kind,
            log,
        })
    }
}

impl MediaTrack for RecordingTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn attach(&self, sink: &dyn Sink) {
        self.log.record(MediaCall::Attach {
            track: self.id.clone(),
            sink: sink.id().to_string(),
        });
    }

    fn detach(&self) {
        self.log.record(MediaCall::Detach {
            track: self.id.clone(),
        });
    }

    fn release(&self) {
        self.log.record(MediaCall::Release {
            track: self.id.clone(),
        });
    }
}

/// A playback surface that records `play` calls.
#[derive(Debug)]
pub struct RecordingSink {
    id: String,
    log: CallLog,
    fail_play: AtomicBool,
}

impl RecordingSink {
    #[must_use]
    pub fn new(id: impl Into<String>, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            log,
            fail_play: AtomicBool::new(false),
        })
    }

    /// Make `play` fail (autoplay blocked).
    pub fn set_failing(&self, failing: bool) {
        self.fail_play.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn play(&self) -> Result<(), StreamError> {
        self.log.record(MediaCall::Play {
            sink: self.id.clone(),
        });
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(StreamError::PlaybackFailed);
        }
        Ok(())
    }
}

/// Capture device returning fresh recording tracks on every call.
#[derive(Debug)]
pub struct FakeMediaDevices {
    log: CallLog,
    failing: AtomicBool,
    acquisitions: AtomicUsize,
    captured: Mutex<Vec<Arc<RecordingTrack>>>,
}

impl FakeMediaDevices {
    #[must_use]
    pub fn new(log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            log,
            failing: AtomicBool::new(false),
            acquisitions: AtomicUsize::new(0),
            captured: Mutex::new(Vec::new()),
        })
    }

    /// Make capture fail (camera unavailable).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Successful captures so far.
    #[must_use]
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Every track handed out, audio before video per capture.
    #[must_use]
    pub fn captured(&self) -> Vec<Arc<RecordingTrack>> {
        self.captured.lock().unwrap().clone()
    }

    /// Track ids handed out.
    #[must_use]
    pub fn captured_ids(&self) -> Vec<String> {
        self.captured()
            .iter()
            .map(|t| t.id().to_string())
            .collect()
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn create_microphone_audio_and_camera_stream(
        &self,
    ) -> Result<CapturedTracks, SignalingError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SignalingError::MediaCapture(
                "camera unavailable".to_string(),
            ));
        }
        let audio = RecordingTrack::new(StreamKind::Audio, self.log.clone());
        let video = RecordingTrack::new(StreamKind::Video, self.log.clone());
        {
            let mut captured = self.captured.lock().unwrap();
            captured.push(Arc::clone(&audio));
            captured.push(Arc::clone(&video));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(CapturedTracks { audio, video })
    }
}
