//! External signaling/media collaborator boundary.
//!
//! The hosted service owns rooms, the member registry and media transport.
//! The controller only sees it through these traits:
//!
//! | Operation | Trait |
//! |-----------|-------|
//! | find or create a room by name | [`SignalingService::create_or_join`] |
//! | join as a named member | [`Room::join`] |
//! | member / publication snapshots | [`Room::members`], [`Room::publications`] |
//! | member joined/left, stream published | [`Room::subscribe_events`] |
//! | publish / subscribe / leave | [`LocalMember`] |
//! | publication subscribed (pushed by the host) | [`LocalMember::subscribe_events`] |
//! | push a subscription onto the other member | [`RemoteMember::subscribe`] |
//!
//! Event subscriptions are `tokio::sync::mpsc` receivers; the controller
//! drains them from its actor loop instead of registering callbacks.

use crate::errors::SignalingError;
use crate::stream::{MediaTrack, RemoteStream, StreamKind};
use async_trait::async_trait;
use common::secret::SecretString;
use common::types::{MemberId, PublicationId};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A room member as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberInfo {
    /// Transport-level identity.
    pub id: MemberId,
    /// Declared name (`"host"` / `"guest"`).
    pub name: String,
}

impl MemberInfo {
    #[must_use]
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// One member's offer of one outgoing stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationInfo {
    pub id: PublicationId,
    pub publisher: MemberInfo,
    pub kind: StreamKind,
}

/// Room-level notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    MemberJoined(MemberInfo),
    MemberLeft(MemberInfo),
    StreamPublished(PublicationInfo),
}

impl RoomEvent {
    /// Returns the event type as a string for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RoomEvent::MemberJoined(_) => "member_joined",
            RoomEvent::MemberLeft(_) => "member_left",
            RoomEvent::StreamPublished(_) => "stream_published",
        }
    }
}

/// Notifications addressed to the local member.
#[derive(Debug)]
pub enum LocalMemberEvent {
    /// A subscription was created for the local member, possibly by another
    /// member on its behalf.
    PublicationSubscribed {
        publication_id: PublicationId,
        stream: RemoteStream,
    },
}

/// Entry point of the hosted service.
#[async_trait]
pub trait SignalingService: Send + Sync {
    /// Find the room named `name`, creating it if absent.
    async fn create_or_join(
        &self,
        name: &str,
        credential: &SecretString,
    ) -> Result<Arc<dyn Room>, SignalingError>;
}

/// A named, shared room.
#[async_trait]
pub trait Room: Send + Sync {
    fn name(&self) -> &str;

    /// Join as a member with the declared `member_name`.
    async fn join(&self, member_name: &str) -> Result<Arc<dyn LocalMember>, SignalingError>;

    /// Current member snapshot.
    fn members(&self) -> Vec<MemberInfo>;

    /// Current publication snapshot.
    fn publications(&self) -> Vec<PublicationInfo>;

    /// Register for room events delivered after this call.
    fn subscribe_events(&self) -> mpsc::Receiver<RoomEvent>;

    /// Handle for pushing subscriptions onto another member.
    fn remote_member(&self, id: &MemberId) -> Option<Arc<dyn RemoteMember>>;

    /// Release the local reference to the room.
    async fn dispose(&self) -> Result<(), SignalingError>;
}

/// This controller's own participant.
#[async_trait]
pub trait LocalMember: Send + Sync {
    fn info(&self) -> MemberInfo;

    async fn publish(&self, track: Arc<dyn MediaTrack>) -> Result<PublicationInfo, SignalingError>;

    async fn subscribe(&self, publication_id: &PublicationId)
        -> Result<RemoteStream, SignalingError>;

    async fn leave(&self) -> Result<(), SignalingError>;

    /// Register for local member events delivered after this call.
    fn subscribe_events(&self) -> mpsc::Receiver<LocalMemberEvent>;
}

/// Another participant, observed through events only.
#[async_trait]
pub trait RemoteMember: Send + Sync {
    fn info(&self) -> MemberInfo;

    /// Make this member subscribe to `publication_id`.
    async fn subscribe(&self, publication_id: &PublicationId) -> Result<(), SignalingError>;
}
