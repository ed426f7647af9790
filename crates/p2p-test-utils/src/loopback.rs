//! In-process signaling service.
//!
//! `LoopbackSignaling` plays the role of the hosted service for any number of
//! controllers in one process. Rooms are keyed by name; every clone of the
//! service resolves the same name to the same room. Events fan out to every
//! listener registered on the room, including the member that caused them,
//! which is what the hosted service does too.
//!
//! Supports:
//! - Failure injection per [`Operation`]
//! - Holding local subscribes until released (for in-flight completion tests)
//! - A record of every subscription created, local or pushed
//! - Scripted peers that act on the room without a controller

use crate::media::{CallLog, MediaCall, RecordingTrack};
use async_trait::async_trait;
use common::secret::SecretString;
use common::types::{MemberId, PublicationId};
use p2p_session::errors::SignalingError;
use p2p_session::signaling::{
    LocalMember, LocalMemberEvent, MemberInfo, PublicationInfo, RemoteMember, Room, RoomEvent,
    SignalingService,
};
use p2p_session::stream::{MediaTrack, RemoteStream, StreamKind};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tracing::warn;

/// Capacity of every event channel handed out.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Collaborator calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateOrJoin,
    Join,
    Publish,
    Subscribe,
    PushSubscribe,
    Leave,
    Dispose,
}

/// How a subscription came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOrigin {
    /// `LocalMember::subscribe` by the subscriber itself.
    Local,
    /// `RemoteMember::subscribe` by another member on its behalf.
    Pushed,
}

/// One subscription created by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub room: String,
    pub subscriber: MemberInfo,
    pub publication_id: PublicationId,
    pub publisher: MemberInfo,
    pub kind: StreamKind,
    /// Reception track handed to the subscriber.
    pub track_id: String,
    pub origin: SubscriptionOrigin,
}

struct MemberEntry {
    info: MemberInfo,
    events: Vec<mpsc::Sender<LocalMemberEvent>>,
}

struct RoomState {
    name: String,
    members: Mutex<Vec<MemberEntry>>,
    publications: Mutex<Vec<PublicationInfo>>,
    listeners: Mutex<Vec<mpsc::Sender<RoomEvent>>>,
}

impl RoomState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: Mutex::new(Vec::new()),
            publications: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    fn broadcast(&self, event: &RoomEvent) {
        let mut listeners = self.listeners.lock().unwrap();
        listeners.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(target: "p2p.loopback", room = %self.name, "Listener full, event dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn member(&self, id: &MemberId) -> Option<MemberInfo> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|m| &m.info.id == id)
            .map(|m| m.info.clone())
    }

    fn publication(&self, id: &PublicationId) -> Option<PublicationInfo> {
        self.publications
            .lock()
            .unwrap()
            .iter()
            .find(|p| &p.id == id)
            .cloned()
    }

    fn notify_member(&self, member: &MemberId, event: LocalMemberEvent) {
        let mut members = self.members.lock().unwrap();
        let Some(entry) = members.iter_mut().find(|m| &m.info.id == member) else {
            return;
        };
        entry.events.retain(|tx| !tx.is_closed());
        // One receiver per member in practice; extra receivers get nothing.
        if let Some(tx) = entry.events.first() {
            if tx.try_send(event).is_err() {
                warn!(target: "p2p.loopback", room = %self.name, "Member event dropped");
            }
        }
    }
}

/// Counts a parked subscribe; also undone when the caller times out.
struct Parked<'a>(&'a AtomicUsize);

impl<'a> Parked<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Parked<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Inner {
    rooms: Mutex<HashMap<String, Arc<RoomState>>>,
    faults: Mutex<HashMap<Operation, SignalingError>>,
    subscriptions: Mutex<Vec<SubscriptionRecord>>,
    hold_tx: watch::Sender<bool>,
    held: AtomicUsize,
    disposals: AtomicUsize,
    log: CallLog,
}

impl Inner {
    fn check(&self, operation: Operation) -> Result<(), SignalingError> {
        match self.faults.lock().unwrap().get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Reception track for a new subscription.
    fn reception(
        &self,
        room: &RoomState,
        subscriber: MemberInfo,
        publication: &PublicationInfo,
        origin: SubscriptionOrigin,
    ) -> RemoteStream {
        let track = RecordingTrack::new(publication.kind, self.log.clone());
        self.subscriptions.lock().unwrap().push(SubscriptionRecord {
            room: room.name.clone(),
            subscriber,
            publication_id: publication.id.clone(),
            publisher: publication.publisher.clone(),
            kind: publication.kind,
            track_id: track.id().to_string(),
            origin,
        });
        RemoteStream::from_track(track)
    }
}

/// The in-process signaling service.
#[derive(Clone)]
pub struct LoopbackSignaling {
    inner: Arc<Inner>,
}

impl Default for LoopbackSignaling {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackSignaling {
    /// Service whose reception tracks log into a private call log.
    #[must_use]
    pub fn new() -> Self {
        Self::with_log(CallLog::new())
    }

    /// Service whose reception tracks log into `log`.
    #[must_use]
    pub fn with_log(log: CallLog) -> Self {
        let (hold_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                rooms: Mutex::new(HashMap::new()),
                faults: Mutex::new(HashMap::new()),
                subscriptions: Mutex::new(Vec::new()),
                hold_tx,
                held: AtomicUsize::new(0),
                disposals: AtomicUsize::new(0),
                log,
            }),
        }
    }

    /// Call log shared by every reception track.
    #[must_use]
    pub fn log(&self) -> CallLog {
        self.inner.log.clone()
    }

    /// Make `operation` fail with `error` until cleared.
    pub fn fail(&self, operation: Operation, error: SignalingError) {
        self.inner.faults.lock().unwrap().insert(operation, error);
    }

    pub fn clear_fault(&self, operation: Operation) {
        self.inner.faults.lock().unwrap().remove(&operation);
    }

    /// Park every local subscribe until [`Self::release_subscriptions`].
    pub fn hold_subscriptions(&self) {
        self.inner.hold_tx.send_replace(true);
    }

    pub fn release_subscriptions(&self) {
        self.inner.hold_tx.send_replace(false);
    }

    /// Local subscribes currently parked.
    #[must_use]
    pub fn held_subscriptions(&self) -> usize {
        self.inner.held.load(Ordering::SeqCst)
    }

    /// Every subscription created so far.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.inner.subscriptions.lock().unwrap().clone()
    }

    /// Subscriptions whose subscriber has the declared `name`.
    #[must_use]
    pub fn subscriptions_of(&self, name: &str) -> Vec<SubscriptionRecord> {
        self.subscriptions()
            .into_iter()
            .filter(|s| s.subscriber.name == name)
            .collect()
    }

    /// `Room::dispose` calls so far.
    #[must_use]
    pub fn disposals(&self) -> usize {
        self.inner.disposals.load(Ordering::SeqCst)
    }

    /// Current members of `room`.
    #[must_use]
    pub fn members(&self, room: &str) -> Vec<MemberInfo> {
        self.room_state(room)
            .map(|state| {
                state
                    .members
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|m| m.info.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Current publications of `room`.
    #[must_use]
    pub fn publications(&self, room: &str) -> Vec<PublicationInfo> {
        self.room_state(room)
            .map(|state| state.publications.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Join `room` as `name` without a controller.
    pub async fn scripted_peer(&self, room: &str, name: &str) -> ScriptedPeer {
        let credential = SecretString::from("scripted-peer");
        let room = self.create_or_join(room, &credential).await.unwrap();
        let member = room.join(name).await.unwrap();
        let events = member.subscribe_events();
        ScriptedPeer {
            room,
            member,
            events,
            log: self.inner.log.clone(),
        }
    }

    fn room_state(&self, name: &str) -> Option<Arc<RoomState>> {
        self.inner.rooms.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl SignalingService for LoopbackSignaling {
    async fn create_or_join(
        &self,
        name: &str,
        _credential: &SecretString,
    ) -> Result<Arc<dyn Room>, SignalingError> {
        self.inner.check(Operation::CreateOrJoin)?;
        let state = {
            let mut rooms = self.inner.rooms.lock().unwrap();
            Arc::clone(
                rooms
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(RoomState::new(name))),
            )
        };
        Ok(Arc::new(LoopbackRoom {
            state,
            inner: Arc::clone(&self.inner),
        }))
    }
}

/// One participant's reference to a shared room.
pub struct LoopbackRoom {
    state: Arc<RoomState>,
    inner: Arc<Inner>,
}

#[async_trait]
impl Room for LoopbackRoom {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn join(&self, member_name: &str) -> Result<Arc<dyn LocalMember>, SignalingError> {
        self.inner.check(Operation::Join)?;
        let info = MemberInfo::new(MemberId::new(), member_name);
        self.state.members.lock().unwrap().push(MemberEntry {
            info: info.clone(),
            events: Vec::new(),
        });
        self.state.broadcast(&RoomEvent::MemberJoined(info.clone()));
        Ok(Arc::new(LoopbackLocalMember {
            info,
            state: Arc::clone(&self.state),
            inner: Arc::clone(&self.inner),
        }))
    }

    fn members(&self) -> Vec<MemberInfo> {
        self.state
            .members
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.info.clone())
            .collect()
    }

    fn publications(&self) -> Vec<PublicationInfo> {
        self.state.publications.lock().unwrap().clone()
    }

    fn subscribe_events(&self) -> mpsc::Receiver<RoomEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.state.listeners.lock().unwrap().push(tx);
        rx
    }

    fn remote_member(&self, id: &MemberId) -> Option<Arc<dyn RemoteMember>> {
        let info = self.state.member(id)?;
        Some(Arc::new(LoopbackRemoteMember {
            info,
            state: Arc::clone(&self.state),
            inner: Arc::clone(&self.inner),
        }))
    }

    async fn dispose(&self) -> Result<(), SignalingError> {
        self.inner.check(Operation::Dispose)?;
        self.inner.disposals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A joined member as seen by itself.
pub struct LoopbackLocalMember {
    info: MemberInfo,
    state: Arc<RoomState>,
    inner: Arc<Inner>,
}

#[async_trait]
impl LocalMember for LoopbackLocalMember {
    fn info(&self) -> MemberInfo {
        self.info.clone()
    }

    async fn publish(&self, track: Arc<dyn MediaTrack>) -> Result<PublicationInfo, SignalingError> {
        self.inner.check(Operation::Publish)?;
        self.inner.log.record(MediaCall::Publish {
            track: track.id().to_string(),
        });
        let publication = PublicationInfo {
            id: PublicationId::new(),
            publisher: self.info.clone(),
            kind: track.kind(),
        };
        self.state
            .publications
            .lock()
            .unwrap()
            .push(publication.clone());
        self.state
            .broadcast(&RoomEvent::StreamPublished(publication.clone()));
        Ok(publication)
    }

    async fn subscribe(
        &self,
        publication_id: &PublicationId,
    ) -> Result<RemoteStream, SignalingError> {
        self.inner.check(Operation::Subscribe)?;

        let publication = self
            .state
            .publication(publication_id)
            .ok_or_else(|| SignalingError::NotFound(format!("publication {publication_id}")))?;
        if publication.publisher.id == self.info.id {
            return Err(SignalingError::Rejected(
                "cannot subscribe to own publication".to_string(),
            ));
        }

        // Accepted; the response is what gets held.
        let mut hold = self.inner.hold_tx.subscribe();
        if *hold.borrow() {
            let _parked = Parked::new(&self.inner.held);
            let _ = hold.wait_for(|held| !*held).await;
        }

        Ok(self.inner.reception(
            &self.state,
            self.info.clone(),
            &publication,
            SubscriptionOrigin::Local,
        ))
    }

    async fn leave(&self) -> Result<(), SignalingError> {
        self.inner.check(Operation::Leave)?;
        let removed = {
            let mut members = self.state.members.lock().unwrap();
            let before = members.len();
            members.retain(|m| m.info.id != self.info.id);
            before != members.len()
        };
        if removed {
            self.state
                .publications
                .lock()
                .unwrap()
                .retain(|p| p.publisher.id != self.info.id);
            self.state
                .broadcast(&RoomEvent::MemberLeft(self.info.clone()));
        }
        Ok(())
    }

    fn subscribe_events(&self) -> mpsc::Receiver<LocalMemberEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut members = self.state.members.lock().unwrap();
        if let Some(entry) = members.iter_mut().find(|m| m.info.id == self.info.id) {
            entry.events.push(tx);
        }
        rx
    }
}

/// Another member, targeted by subscription pushes.
pub struct LoopbackRemoteMember {
    info: MemberInfo,
    state: Arc<RoomState>,
    inner: Arc<Inner>,
}

#[async_trait]
impl RemoteMember for LoopbackRemoteMember {
    fn info(&self) -> MemberInfo {
        self.info.clone()
    }

    async fn subscribe(&self, publication_id: &PublicationId) -> Result<(), SignalingError> {
        self.inner.check(Operation::PushSubscribe)?;
        let publication = self
            .state
            .publication(publication_id)
            .ok_or_else(|| SignalingError::NotFound(format!("publication {publication_id}")))?;
        if self.state.member(&self.info.id).is_none() {
            return Err(SignalingError::NotFound(format!("member {}", self.info.id)));
        }
        let stream = self.inner.reception(
            &self.state,
            self.info.clone(),
            &publication,
            SubscriptionOrigin::Pushed,
        );
        self.state.notify_member(
            &self.info.id,
            LocalMemberEvent::PublicationSubscribed {
                publication_id: publication_id.clone(),
                stream,
            },
        );
        Ok(())
    }
}

/// A room member driven directly by a test instead of a controller.
pub struct ScriptedPeer {
    pub room: Arc<dyn Room>,
    pub member: Arc<dyn LocalMember>,
    /// Notifications addressed to this peer (pushed subscriptions).
    pub events: mpsc::Receiver<LocalMemberEvent>,
    log: CallLog,
}

impl ScriptedPeer {
    #[must_use]
    pub fn info(&self) -> MemberInfo {
        self.member.info()
    }

    /// Publish a fresh recording track of `kind`.
    pub async fn publish(&self, kind: StreamKind) -> PublicationInfo {
        let track = RecordingTrack::new(kind, self.log.clone());
        self.member.publish(track).await.unwrap()
    }

    /// Push a subscription for `publication_id` onto `target`.
    pub async fn push_subscription(&self, target: &MemberId, publication_id: &PublicationId) {
        let remote = self.room.remote_member(target).expect("target member in room");
        remote.subscribe(publication_id).await.unwrap();
    }

    pub async fn leave(&self) {
        self.member.leave().await.unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rooms_are_shared_by_name() {
        let signaling = LoopbackSignaling::new();
        let host = signaling.scripted_peer("room-42", "host").await;
        let _guest = signaling.scripted_peer("room-42", "guest").await;
        let _other = signaling.scripted_peer("room-7", "guest").await;

        assert_eq!(signaling.members("room-42").len(), 2);
        assert_eq!(signaling.members("room-7").len(), 1);
        assert_eq!(host.room.name(), "room-42");
    }

    #[tokio::test]
    async fn test_events_fan_out_to_listeners() {
        let signaling = LoopbackSignaling::new();
        let host = signaling.scripted_peer("room-42", "host").await;
        let mut events = host.room.subscribe_events();

        let guest = signaling.scripted_peer("room-42", "guest").await;
        let publication = guest.publish(StreamKind::Audio).await;

        assert_eq!(
            events.recv().await.unwrap(),
            RoomEvent::MemberJoined(guest.info())
        );
        assert_eq!(
            events.recv().await.unwrap(),
            RoomEvent::StreamPublished(publication)
        );
    }

    #[tokio::test]
    async fn test_self_subscription_rejected() {
        let signaling = LoopbackSignaling::new();
        let host = signaling.scripted_peer("room-42", "host").await;
        let publication = host.publish(StreamKind::Video).await;

        let err = host.member.subscribe(&publication.id).await.unwrap_err();
        assert!(matches!(err, SignalingError::Rejected(_)));
        assert!(signaling.subscriptions().is_empty());
    }

    #[tokio::test]
    async fn test_push_notifies_target() {
        let signaling = LoopbackSignaling::new();
        let host = signaling.scripted_peer("room-42", "host").await;
        let mut guest = signaling.scripted_peer("room-42", "guest").await;
        let publication = host.publish(StreamKind::Video).await;

        host.push_subscription(&guest.info().id, &publication.id)
            .await;

        let LocalMemberEvent::PublicationSubscribed {
            publication_id,
            stream,
        } = guest.events.recv().await.unwrap();
        assert_eq!(publication_id, publication.id);
        assert_eq!(stream.kind(), StreamKind::Video);

        let records = signaling.subscriptions_of("guest");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].origin, SubscriptionOrigin::Pushed);
    }

    #[tokio::test]
    async fn test_injected_fault() {
        let signaling = LoopbackSignaling::new();
        signaling.fail(
            Operation::Join,
            SignalingError::Rejected("room full".to_string()),
        );
        let room = signaling
            .create_or_join("room-42", &SecretString::from("t"))
            .await
            .unwrap();
        assert!(room.join("guest").await.is_err());

        signaling.clear_fault(Operation::Join);
        assert!(room.join("guest").await.is_ok());
    }

    #[tokio::test]
    async fn test_leave_removes_member_and_publications() {
        let signaling = LoopbackSignaling::new();
        let guest = signaling.scripted_peer("room-42", "guest").await;
        guest.publish(StreamKind::Audio).await;
        guest.leave().await;

        assert!(signaling.members("room-42").is_empty());
        assert!(signaling.publications("room-42").is_empty());
    }
}
