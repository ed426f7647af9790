//! Stream resource handles.
//!
//! A [`StreamHandle`] wraps one capture or reception track and tracks its
//! lifecycle against playback sinks:
//!
//! ```text
//! Detached ──attach(sink)──▶ Attached(sink) ──detach──▶ Detached
//!    │                            │
//!    └──────────release───────────┴──────────▶ Released (terminal)
//! ```
//!
//! - attaching to the sink it is already attached to is a no-op
//! - attaching to another sink rebinds (detach first)
//! - detaching an unattached handle is a no-op
//! - attach/detach after release is [`StreamError::Released`]
//! - release forwards to the track exactly once
//!
//! The session actor always detaches a handle before releasing it.

use crate::errors::StreamError;
use async_trait::async_trait;
use common::types::PublicationId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Media kind carried by a track or publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
    /// Application data; published by some clients but never tracked here.
    Data,
}

impl StreamKind {
    /// Returns the kind as a string for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Audio => "audio",
            StreamKind::Video => "video",
            StreamKind::Data => "data",
        }
    }

    /// Whether the controller routes this kind to a remote slot.
    #[must_use]
    pub const fn is_media(&self) -> bool {
        matches!(self, StreamKind::Audio | StreamKind::Video)
    }
}

/// A playback surface owned by the embedding UI.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable identifier (e.g. the element id).
    fn id(&self) -> &str;

    /// Start playback of whatever is attached.
    async fn play(&self) -> Result<(), StreamError>;
}

/// The raw capture/reception object provided by the media collaborator.
pub trait MediaTrack: Send + Sync {
    /// Track identifier assigned by the collaborator.
    fn id(&self) -> &str;

    fn kind(&self) -> StreamKind;

    /// Bind playback to `sink`.
    fn attach(&self, sink: &dyn Sink);

    /// Unbind from the current sink.
    fn detach(&self);

    /// Free capture or reception resources.
    fn release(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HandleState {
    Detached,
    Attached(String),
    Released,
}

/// Lifecycle wrapper around a [`MediaTrack`].
pub struct StreamHandle {
    track: Arc<dyn MediaTrack>,
    state: HandleState,
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandle")
            .field("track_id", &self.track.id())
            .field("kind", &self.track.kind())
            .field("state", &self.state)
            .finish()
    }
}

impl StreamHandle {
    #[must_use]
    pub fn new(track: Arc<dyn MediaTrack>) -> Self {
        Self {
            track,
            state: HandleState::Detached,
        }
    }

    #[must_use]
    pub fn kind(&self) -> StreamKind {
        self.track.kind()
    }

    #[must_use]
    pub fn track_id(&self) -> &str {
        self.track.id()
    }

    /// Shared reference to the underlying track (for publishing).
    #[must_use]
    pub fn track(&self) -> Arc<dyn MediaTrack> {
        Arc::clone(&self.track)
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        matches!(self.state, HandleState::Attached(_))
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.state == HandleState::Released
    }

    /// Attach to `sink`. Returns `true` if the binding changed.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Released`] after release.
    pub fn attach(&mut self, sink: &dyn Sink) -> Result<bool, StreamError> {
        if self.is_released() {
            return Err(StreamError::Released);
        }
        if let HandleState::Attached(current) = &self.state {
            if current == sink.id() {
                return Ok(false);
            }
            self.track.detach();
        }
        self.track.attach(sink);
        self.state = HandleState::Attached(sink.id().to_string());
        Ok(true)
    }

    /// Detach from the current sink, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Released`] after release.
    pub fn detach(&mut self) -> Result<(), StreamError> {
        match self.state {
            HandleState::Released => Err(StreamError::Released),
            HandleState::Detached => Ok(()),
            HandleState::Attached(_) => {
                self.track.detach();
                self.state = HandleState::Detached;
                Ok(())
            }
        }
    }

    /// Free the underlying resources. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.state == HandleState::Released {
            return;
        }
        self.track.release();
        self.state = HandleState::Released;
    }

    /// Detach (if attached) and release.
    pub fn dispose(&mut self) {
        if self.is_attached() {
            // Cannot fail: the handle is attached, hence not released.
            let _ = self.detach();
        }
        self.release();
    }
}

/// A remote stream resolved by a subscription, tagged by kind.
#[derive(Debug)]
pub enum RemoteStream {
    Audio(StreamHandle),
    Video(StreamHandle),
    Data(StreamHandle),
}

impl RemoteStream {
    /// Tag `track` by its declared kind.
    #[must_use]
    pub fn from_track(track: Arc<dyn MediaTrack>) -> Self {
        let kind = track.kind();
        let handle = StreamHandle::new(track);
        match kind {
            StreamKind::Audio => RemoteStream::Audio(handle),
            StreamKind::Video => RemoteStream::Video(handle),
            StreamKind::Data => RemoteStream::Data(handle),
        }
    }

    #[must_use]
    pub fn kind(&self) -> StreamKind {
        match self {
            RemoteStream::Audio(_) => StreamKind::Audio,
            RemoteStream::Video(_) => StreamKind::Video,
            RemoteStream::Data(_) => StreamKind::Data,
        }
    }

    #[must_use]
    pub fn into_handle(self) -> StreamHandle {
        match self {
            RemoteStream::Audio(h) | RemoteStream::Video(h) | RemoteStream::Data(h) => h,
        }
    }
}

/// The local microphone/camera pair.
#[derive(Debug)]
pub struct LocalStreams {
    pub audio: StreamHandle,
    pub video: StreamHandle,
}

impl LocalStreams {
    /// Local release order: detach video from the preview sink, then release both.
    pub fn dispose(&mut self) {
        if self.video.is_attached() {
            let _ = self.video.detach();
        }
        if self.audio.is_attached() {
            let _ = self.audio.detach();
        }
        self.audio.release();
        self.video.release();
    }
}

#[derive(Debug)]
struct RemoteSlot {
    publication_id: PublicationId,
    handle: StreamHandle,
}

/// One remote audio and one remote video slot.
#[derive(Debug, Default)]
pub struct RemoteSlots {
    audio: Option<RemoteSlot>,
    video: Option<RemoteSlot>,
}

impl RemoteSlots {
    /// Whether a slot currently holds the stream for `publication_id`.
    #[must_use]
    pub fn holds(&self, publication_id: &PublicationId) -> bool {
        self.audio
            .iter()
            .chain(self.video.iter())
            .any(|slot| &slot.publication_id == publication_id)
    }

    /// Route a resolved stream into its slot.
    ///
    /// Returns the displaced publication and its handle, if the slot was
    /// occupied. Data streams cannot be routed and come back as `Err`. The
    /// caller disposes whatever is returned.
    pub fn insert(
        &mut self,
        publication_id: PublicationId,
        stream: RemoteStream,
    ) -> Result<Option<(PublicationId, StreamHandle)>, StreamHandle> {
        let (slot, handle) = match stream {
            RemoteStream::Audio(h) => (&mut self.audio, h),
            RemoteStream::Video(h) => (&mut self.video, h),
            RemoteStream::Data(h) => return Err(h),
        };
        let displaced = slot.replace(RemoteSlot {
            publication_id,
            handle,
        });
        Ok(displaced.map(|old| {
            debug!(
                target: "p2p.session.stream",
                publication_id = %old.publication_id,
                "Replacing remote stream in occupied slot"
            );
            (old.publication_id, old.handle)
        }))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    /// Mutable access to every held handle (video first).
    pub fn handles_mut(&mut self) -> impl Iterator<Item = &mut StreamHandle> {
        self.video
            .iter_mut()
            .chain(self.audio.iter_mut())
            .map(|slot| &mut slot.handle)
    }

    /// Empty both slots, returning the handles.
    pub fn take_all(&mut self) -> Vec<StreamHandle> {
        self.video
            .take()
            .into_iter()
            .chain(self.audio.take())
            .map(|slot| slot.handle)
            .collect()
    }
}
