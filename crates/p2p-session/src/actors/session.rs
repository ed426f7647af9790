//! `SessionActor` - owns one local participant's session.
//!
//! The actor serializes everything that touches session state: caller
//! requests, room events, local member events and the completions of
//! subscribe/push calls it spawned. Join, leave and conversation start are
//! processed inline, so no event is applied while one of them is suspended.
//!
//! # Leave Order
//!
//! 1. detach remote streams
//! 2. detach the local video preview, release local streams
//! 3. release remote streams
//! 4. leave the room as a member
//! 5. dispose the room
//!
//! State is reset before step 1; anything that resolves afterwards is stale.

use crate::config::SessionConfig;
use crate::errors::{SessionError, SignalingError};
use crate::media::{acquire_local_streams, MediaDevices};
use crate::observability::metrics::{
    record_join, record_stale_completion, record_subscription, session_closed, session_opened,
};
use crate::session::{Effect, Role, SessionEvent, SessionMachine, SessionStatus};
use crate::signaling::{
    LocalMember, LocalMemberEvent, PublicationInfo, Room, RoomEvent, SignalingService,
};
use crate::stream::{LocalStreams, RemoteSlots, RemoteStream, Sink};

use super::messages::{SessionMessage, TaskCompletion};

use common::credential::peek_expiry;
use common::secret::SecretString;
use common::types::{MemberId, PublicationId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// External collaborators a session actor drives.
#[derive(Clone)]
pub struct SessionCollaborators {
    /// Hosted signaling/media service.
    pub signaling: Arc<dyn SignalingService>,
    /// Camera/microphone capture.
    pub media: Arc<dyn MediaDevices>,
    /// Local video preview surface.
    pub local_sink: Arc<dyn Sink>,
    /// Remote playback surface.
    pub remote_sink: Arc<dyn Sink>,
}

/// Handle to a `SessionActor`.
#[derive(Clone)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    status: watch::Receiver<SessionStatus>,
    role: Role,
}

impl SessionActorHandle {
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Join the room named `room_name`.
    ///
    /// A no-op if a session is already joining or joined.
    ///
    /// # Errors
    ///
    /// Returns the first failing external call (room, join, capture,
    /// publish, snapshot subscribe), `CredentialExpired` for a lapsed
    /// credential, or `Internal` if the actor is gone. On error the actor is
    /// back in its initial state.
    pub async fn join_session(
        &self,
        room_name: impl Into<String>,
        credential: SecretString,
    ) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Join {
                room_name: room_name.into(),
                credential,
                respond_to: tx,
            })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Leave the session. A no-op if not joined.
    ///
    /// # Errors
    ///
    /// Returns the first failure of `leave`/`dispose`; local state has been
    /// reset regardless.
    pub async fn leave_session(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Leave { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Host only: push subscriptions onto the remote member and subscribe to
    /// its publications. A no-op for the guest, before a remote member is
    /// present, or when already in conversation.
    ///
    /// # Errors
    ///
    /// Returns the first failing push/subscribe; the conversation flag stays
    /// unset.
    pub async fn start_conversation(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::StartConversation { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))?
    }

    /// Query the actor for its status.
    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| SessionError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| SessionError::Internal(format!("response receive failed: {e}")))
    }

    /// Last published status, without a round trip.
    #[must_use]
    pub fn current_status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// Cancel the actor. A joined session is left first.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Room-side state that only exists while joined.
struct ActiveSession {
    room: Arc<dyn Room>,
    local_member: Arc<dyn LocalMember>,
    room_events: mpsc::Receiver<RoomEvent>,
    member_events: mpsc::Receiver<LocalMemberEvent>,
    events_closed: bool,
}

enum Signal {
    Room(RoomEvent),
    Member(LocalMemberEvent),
    Closed,
}

/// Next room or local member event; pending while there is no session.
async fn next_signal(session: &mut Option<ActiveSession>) -> Signal {
    match session {
        Some(active) if !active.events_closed => {
            tokio::select! {
                Some(event) = active.room_events.recv() => Signal::Room(event),
                Some(event) = active.member_events.recv() => Signal::Member(event),
                else => Signal::Closed,
            }
        }
        _ => std::future::pending().await,
    }
}

/// Run `fut` under the operation timeout.
async fn bounded<T, E>(
    timeout: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, SessionError>
where
    E: Into<SessionError>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(SessionError::Timeout(operation)),
    }
}

/// The session actor.
pub struct SessionActor {
    config: SessionConfig,
    collaborators: SessionCollaborators,
    receiver: mpsc::Receiver<SessionMessage>,
    cancel_token: CancellationToken,
    machine: SessionMachine,
    session: Option<ActiveSession>,
    local_streams: Option<LocalStreams>,
    remote: RemoteSlots,
    status_tx: watch::Sender<SessionStatus>,
    completions_tx: mpsc::Sender<TaskCompletion>,
    completions_rx: mpsc::Receiver<TaskCompletion>,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: SessionConfig,
        collaborators: SessionCollaborators,
        cancel_token: CancellationToken,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let buffer = config.mailbox_buffer.max(1);
        let (sender, receiver) = mpsc::channel(buffer);
        let (completions_tx, completions_rx) = mpsc::channel(buffer);
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let role = config.role;

        let actor = Self {
            machine: SessionMachine::new(role),
            config,
            collaborators,
            receiver,
            cancel_token: cancel_token.clone(),
            session: None,
            local_streams: None,
            remote: RemoteSlots::default(),
            status_tx,
            completions_tx,
            completions_rx,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            status: status_rx,
            role,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "p2p.actor.session", fields(role = %self.config.role))]
    async fn run(mut self) {
        info!(
            target: "p2p.session.actor",
            role = %self.config.role,
            "SessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "p2p.session.actor",
                        "SessionActor received cancellation signal"
                    );
                    self.shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(
                                target: "p2p.session.actor",
                                "SessionActor channel closed, exiting"
                            );
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion).await;
                }

                signal = next_signal(&mut self.session) => {
                    self.handle_signal(signal).await;
                }
            }
            self.publish_status();
        }

        info!(
            target: "p2p.session.actor",
            generation = self.machine.generation(),
            "SessionActor stopped"
        );
    }

    /// Handle a single request.
    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Join {
                room_name,
                credential,
                respond_to,
            } => {
                let result = self.handle_join(room_name, credential).await;
                self.publish_status();
                let _ = respond_to.send(result);
            }

            SessionMessage::Leave { respond_to } => {
                let result = self.handle_leave().await;
                self.publish_status();
                let _ = respond_to.send(result);
            }

            SessionMessage::StartConversation { respond_to } => {
                let result = self.handle_start_conversation().await;
                self.publish_status();
                let _ = respond_to.send(result);
            }

            SessionMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.machine.status());
            }
        }
    }

    #[instrument(skip_all, fields(room_name = %room_name, role = %self.config.role))]
    async fn handle_join(
        &mut self,
        room_name: String,
        credential: SecretString,
    ) -> Result<(), SessionError> {
        if !self.machine.is_idle() {
            debug!(
                target: "p2p.session.actor",
                room_name = %room_name,
                "Join ignored: session already joining or joined"
            );
            return Ok(());
        }

        let role = self.config.role.as_str();

        if let Some(exp) = peek_expiry(&credential) {
            if exp <= chrono::Utc::now().timestamp() {
                warn!(
                    target: "p2p.session.actor",
                    room_name = %room_name,
                    "Join rejected: credential has expired"
                );
                let err = SessionError::CredentialExpired;
                record_join(role, err.kind());
                return Err(err);
            }
        }

        self.machine.apply(SessionEvent::JoinStarted);
        self.publish_status();

        match self.establish(&room_name, &credential).await {
            Ok(()) => {
                record_join(role, "success");
                session_opened();
                info!(
                    target: "p2p.session.actor",
                    room_name = %room_name,
                    generation = self.machine.generation(),
                    remote_present = self.machine.remote().is_some(),
                    "Session joined"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    target: "p2p.session.actor",
                    room_name = %room_name,
                    error = %e,
                    "Join failed, rolling back"
                );
                if let Err(cleanup) = self.teardown().await {
                    debug!(
                        target: "p2p.session.actor",
                        error = %cleanup,
                        "Rollback after failed join reported an error"
                    );
                }
                self.machine.apply(SessionEvent::JoinFailed);
                record_join(role, e.kind());
                Err(e)
            }
        }
    }

    /// Steps of a join after the state checks. Partial progress is left in
    /// `self` for `teardown` on error.
    async fn establish(
        &mut self,
        room_name: &str,
        credential: &SecretString,
    ) -> Result<(), SessionError> {
        let timeout = self.config.operation_timeout;
        let signaling = Arc::clone(&self.collaborators.signaling);

        let room = bounded(
            timeout,
            "create_or_join",
            signaling.create_or_join(room_name, credential),
        )
        .await?;

        // Listen before snapshotting so nothing falls between the two.
        let room_events = room.subscribe_events();
        let local_member =
            match bounded(timeout, "join", room.join(self.config.role.as_str())).await {
                Ok(member) => member,
                Err(e) => {
                    if let Err(dispose) = bounded(timeout, "dispose", room.dispose()).await {
                        debug!(
                            target: "p2p.session.actor",
                            error = %dispose,
                            "Room dispose after failed join reported an error"
                        );
                    }
                    return Err(e);
                }
            };
        let member_events = local_member.subscribe_events();
        let members = room.members();
        let publications = room.publications();
        let local = local_member.info();

        debug!(
            target: "p2p.session.actor",
            member_id = %local.id,
            members = members.len(),
            publications = publications.len(),
            "Joined room as member"
        );

        self.session = Some(ActiveSession {
            room,
            local_member: Arc::clone(&local_member),
            room_events,
            member_events,
            events_closed: false,
        });

        let mut effects = self.machine.apply(SessionEvent::Joined {
            local,
            members,
            publications,
        });

        let media = Arc::clone(&self.collaborators.media);
        let streams = bounded(timeout, "media", acquire_local_streams(media.as_ref())).await?;
        let tracks = [streams.audio.track(), streams.video.track()];
        self.local_streams = Some(streams);

        for track in tracks {
            let publication = bounded(timeout, "publish", local_member.publish(track)).await?;
            debug!(
                target: "p2p.session.actor",
                publication_id = %publication.id,
                kind = publication.kind.as_str(),
                "Published local stream"
            );
            effects.extend(self.machine.apply(SessionEvent::LocalPublished(publication)));
        }

        // Preview only once both streams are published.
        let local_sink = Arc::clone(&self.collaborators.local_sink);
        if let Some(streams) = self.local_streams.as_mut() {
            streams.video.attach(local_sink.as_ref())?;
        }
        if let Err(e) = bounded(timeout, "play", local_sink.play()).await {
            warn!(
                target: "p2p.session.actor",
                error = %e,
                "Local preview playback did not start"
            );
        }

        // Snapshot subscriptions are awaited so their failure fails the join.
        let mut deferred = Vec::new();
        for effect in effects {
            match effect {
                Effect::Subscribe(publication) => {
                    self.subscribe_inline(&local_member, publication, "snapshot")
                        .await?;
                }
                other => deferred.push(other),
            }
        }
        self.dispatch(deferred).await;

        Ok(())
    }

    #[instrument(skip_all, fields(role = %self.config.role))]
    async fn handle_leave(&mut self) -> Result<(), SessionError> {
        if !self.machine.is_joined() {
            debug!(
                target: "p2p.session.actor",
                "Leave ignored: not joined"
            );
            return Ok(());
        }

        let generation = self.machine.generation();
        self.machine.apply(SessionEvent::Left);
        self.publish_status();

        let result = self.teardown().await;
        session_closed();

        info!(
            target: "p2p.session.actor",
            generation,
            clean = result.is_ok(),
            "Session left"
        );
        result
    }

    #[instrument(skip_all, fields(role = %self.config.role))]
    async fn handle_start_conversation(&mut self) -> Result<(), SessionError> {
        let Some(plan) = self.machine.conversation_plan() else {
            debug!(
                target: "p2p.session.actor",
                "Start conversation ignored: not host, not joined, no remote or already started"
            );
            return Ok(());
        };
        let Some((room, local_member)) = self
            .session
            .as_ref()
            .map(|active| (Arc::clone(&active.room), Arc::clone(&active.local_member)))
        else {
            return Ok(());
        };

        let remote = room.remote_member(&plan.remote.id).ok_or_else(|| {
            SessionError::from(SignalingError::NotFound(format!(
                "member {}",
                plan.remote.id
            )))
        })?;

        let timeout = self.config.operation_timeout;
        for publication_id in &plan.push {
            record_subscription("push");
            bounded(timeout, "push_subscribe", remote.subscribe(publication_id)).await?;
            self.machine.apply(SessionEvent::SubscriptionPushed {
                publication_id: publication_id.clone(),
            });
        }

        for publication in plan.subscribe {
            self.machine.apply(SessionEvent::SubscriptionRequested {
                publication_id: publication.id.clone(),
            });
            self.subscribe_inline(&local_member, publication, "conversation")
                .await?;
        }

        let effects = self.machine.apply(SessionEvent::ConversationStarted);
        self.dispatch(effects).await;

        info!(
            target: "p2p.session.actor",
            remote_member = %plan.remote.id,
            pushed = plan.push.len(),
            "Conversation started"
        );
        Ok(())
    }

    /// Subscribe and route the result before returning.
    async fn subscribe_inline(
        &mut self,
        local_member: &Arc<dyn LocalMember>,
        publication: PublicationInfo,
        origin: &'static str,
    ) -> Result<(), SessionError> {
        record_subscription(origin);
        let timeout = self.config.operation_timeout;
        match bounded(timeout, "subscribe", local_member.subscribe(&publication.id)).await {
            Ok(stream) => {
                let effects = self.route_remote(publication.id, stream);
                self.dispatch(effects).await;
                Ok(())
            }
            Err(e) => {
                self.machine.apply(SessionEvent::SubscriptionFailed {
                    publication_id: publication.id,
                });
                Err(e)
            }
        }
    }

    /// Place a resolved remote stream into its slot.
    fn route_remote(&mut self, publication_id: PublicationId, stream: RemoteStream) -> Vec<Effect> {
        let kind = stream.kind();
        if !kind.is_media() {
            debug!(
                target: "p2p.session.stream",
                publication_id = %publication_id,
                kind = kind.as_str(),
                "Ignoring stream of untracked kind"
            );
            stream.into_handle().dispose();
        } else if self.remote.holds(&publication_id) {
            debug!(
                target: "p2p.session.stream",
                publication_id = %publication_id,
                "Stream for publication already held"
            );
            stream.into_handle().dispose();
        } else {
            match self.remote.insert(publication_id.clone(), stream) {
                Ok(Some((displaced_id, mut displaced))) => {
                    displaced.dispose();
                    self.machine.apply(SessionEvent::SubscriptionDisplaced {
                        publication_id: displaced_id,
                    });
                }
                Ok(None) => {}
                Err(mut unrouted) => unrouted.dispose(),
            }
        }

        self.machine.apply(SessionEvent::SubscriptionResolved {
            publication_id,
            kind,
        })
    }

    /// Perform effects that do not have to be awaited by a caller.
    async fn dispatch(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Subscribe(publication) => self.spawn_subscribe(publication),
                Effect::PushSubscribe {
                    member,
                    publication_id,
                } => self.spawn_push(&member, publication_id),
                Effect::AttachRemote => self.attach_remote().await,
                Effect::DropRemote => self.drop_remote(),
            }
        }
    }

    fn spawn_subscribe(&self, publication: PublicationInfo) {
        let Some(local_member) = self
            .session
            .as_ref()
            .map(|active| Arc::clone(&active.local_member))
        else {
            return;
        };
        record_subscription("event");

        let generation = self.machine.generation();
        let timeout = self.config.operation_timeout;
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = bounded(timeout, "subscribe", local_member.subscribe(&publication.id)).await;
            let sent = tx
                .send(TaskCompletion::Subscribed {
                    generation,
                    publication_id: publication.id,
                    result,
                })
                .await;
            // The actor is gone; nobody else will release the stream.
            if let Err(mpsc::error::SendError(TaskCompletion::Subscribed {
                publication_id,
                result: Ok(stream),
                ..
            })) = sent
            {
                record_stale_completion();
                debug!(
                    target: "p2p.session.actor",
                    publication_id = %publication_id,
                    "Releasing subscription resolved after actor stopped"
                );
                stream.into_handle().dispose();
            }
        });
    }

    fn spawn_push(&mut self, member: &MemberId, publication_id: PublicationId) {
        let remote = self
            .session
            .as_ref()
            .and_then(|active| active.room.remote_member(member));
        let Some(remote) = remote else {
            warn!(
                target: "p2p.session.actor",
                member_id = %member,
                publication_id = %publication_id,
                "Remote member not found for subscription push"
            );
            self.machine
                .apply(SessionEvent::PushFailed { publication_id });
            return;
        };
        record_subscription("push");

        let generation = self.machine.generation();
        let timeout = self.config.operation_timeout;
        let tx = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = bounded(timeout, "push_subscribe", remote.subscribe(&publication_id)).await;
            let _ = tx
                .send(TaskCompletion::Pushed {
                    generation,
                    publication_id,
                    result,
                })
                .await;
        });
    }

    async fn handle_completion(&mut self, completion: TaskCompletion) {
        let current = self.machine.is_current(completion.generation());

        match completion {
            TaskCompletion::Subscribed {
                publication_id,
                result: Ok(stream),
                ..
            } => {
                if !current || !self.machine.wants_stream(&publication_id) {
                    record_stale_completion();
                    debug!(
                        target: "p2p.session.actor",
                        publication_id = %publication_id,
                        "Discarding stale subscription completion"
                    );
                    stream.into_handle().dispose();
                    return;
                }
                let effects = self.route_remote(publication_id, stream);
                self.dispatch(effects).await;
            }
            TaskCompletion::Subscribed {
                publication_id,
                result: Err(e),
                ..
            } => {
                warn!(
                    target: "p2p.session.actor",
                    publication_id = %publication_id,
                    error = %e,
                    "Subscribe failed"
                );
                if current {
                    self.machine
                        .apply(SessionEvent::SubscriptionFailed { publication_id });
                }
            }
            TaskCompletion::Pushed {
                publication_id,
                result,
                ..
            } => match result {
                Ok(()) => {
                    debug!(
                        target: "p2p.session.actor",
                        publication_id = %publication_id,
                        "Subscription pushed onto remote member"
                    );
                }
                Err(e) => {
                    warn!(
                        target: "p2p.session.actor",
                        publication_id = %publication_id,
                        error = %e,
                        "Subscription push failed"
                    );
                    if current {
                        self.machine
                            .apply(SessionEvent::PushFailed { publication_id });
                    }
                }
            },
        }
    }

    async fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Room(event) => {
                debug!(
                    target: "p2p.session.events",
                    event = event.as_str(),
                    "Room event"
                );
                let event = match event {
                    RoomEvent::MemberJoined(member) => SessionEvent::MemberJoined(member),
                    RoomEvent::MemberLeft(member) => SessionEvent::MemberLeft(member),
                    RoomEvent::StreamPublished(publication) => {
                        SessionEvent::StreamPublished(publication)
                    }
                };
                let effects = self.machine.apply(event);
                self.dispatch(effects).await;
            }
            Signal::Member(LocalMemberEvent::PublicationSubscribed {
                publication_id,
                stream,
            }) => {
                let kind = stream.kind();
                debug!(
                    target: "p2p.session.events",
                    publication_id = %publication_id,
                    kind = kind.as_str(),
                    "Publication subscribed notification"
                );
                if self.config.role.starts_conversation() || !self.machine.is_joined() {
                    stream.into_handle().dispose();
                    return;
                }
                // Routing applies the resolved-state bookkeeping as well; the
                // notification then flips the conversation flag.
                let mut effects = self.route_remote(publication_id.clone(), stream);
                effects.extend(self.machine.apply(SessionEvent::PublicationSubscribed {
                    publication_id,
                    kind,
                }));
                self.dispatch(effects).await;
            }
            Signal::Closed => {
                warn!(
                    target: "p2p.session.events",
                    "Room event streams closed"
                );
                if let Some(active) = self.session.as_mut() {
                    active.events_closed = true;
                }
            }
        }
    }

    /// Attach held remote streams to the remote sink while in conversation.
    async fn attach_remote(&mut self) {
        if !self.machine.in_conversation() {
            return;
        }
        let sink = Arc::clone(&self.collaborators.remote_sink);
        let mut changed = false;
        for handle in self.remote.handles_mut() {
            match handle.attach(sink.as_ref()) {
                Ok(attached) => changed |= attached,
                Err(e) => {
                    warn!(
                        target: "p2p.session.stream",
                        track_id = handle.track_id(),
                        error = %e,
                        "Remote stream could not be attached"
                    );
                }
            }
        }
        if changed {
            if let Err(e) = bounded(self.config.operation_timeout, "play", sink.play()).await {
                warn!(
                    target: "p2p.session.stream",
                    error = %e,
                    "Remote playback did not start"
                );
            }
        }
    }

    /// Detach, then release, every remote stream.
    fn drop_remote(&mut self) {
        let handles = self.remote.take_all();
        if !handles.is_empty() {
            debug!(
                target: "p2p.session.stream",
                count = handles.len(),
                "Dropping remote streams"
            );
        }
        for mut handle in handles {
            handle.dispose();
        }
    }

    /// Release everything the session holds, in leave order.
    async fn teardown(&mut self) -> Result<(), SessionError> {
        for handle in self.remote.handles_mut() {
            if let Err(e) = handle.detach() {
                warn!(
                    target: "p2p.session.stream",
                    track_id = handle.track_id(),
                    error = %e,
                    "Remote stream detach failed"
                );
            }
        }

        if let Some(mut local) = self.local_streams.take() {
            local.dispose();
        }

        for mut handle in self.remote.take_all() {
            handle.release();
        }

        let Some(mut active) = self.session.take() else {
            return Ok(());
        };

        // Streams delivered but not yet handled would otherwise never be released.
        while let Ok(LocalMemberEvent::PublicationSubscribed { stream, .. }) =
            active.member_events.try_recv()
        {
            stream.into_handle().dispose();
        }

        let timeout = self.config.operation_timeout;
        let mut first_error = None;
        if let Err(e) = bounded(timeout, "leave", active.local_member.leave()).await {
            warn!(
                target: "p2p.session.actor",
                error = %e,
                "Member leave failed"
            );
            first_error.get_or_insert(e);
        }
        if let Err(e) = bounded(timeout, "dispose", active.room.dispose()).await {
            warn!(
                target: "p2p.session.actor",
                room_name = active.room.name(),
                error = %e,
                "Room dispose failed"
            );
            first_error.get_or_insert(e);
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn shutdown(&mut self) {
        if self.machine.is_joined() {
            if let Err(e) = self.handle_leave().await {
                warn!(
                    target: "p2p.session.actor",
                    error = %e,
                    "Leave during shutdown reported an error"
                );
            }
            self.publish_status();
        }
    }

    fn publish_status(&self) {
        let status = self.machine.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::StreamError;
    use crate::media::CapturedTracks;
    use async_trait::async_trait;
    use common::credential::{Capability, CredentialConfig, CredentialIssuer};

    struct RejectingSignaling;

    #[async_trait]
    impl SignalingService for RejectingSignaling {
        async fn create_or_join(
            &self,
            _name: &str,
            _credential: &SecretString,
        ) -> Result<Arc<dyn Room>, SignalingError> {
            Err(SignalingError::Rejected("room quota".to_string()))
        }
    }

    struct NoDevices;

    #[async_trait]
    impl MediaDevices for NoDevices {
        async fn create_microphone_audio_and_camera_stream(
            &self,
        ) -> Result<CapturedTracks, SignalingError> {
            Err(SignalingError::MediaCapture("no camera".to_string()))
        }
    }

    struct NullSink;

    #[async_trait]
    impl Sink for NullSink {
        fn id(&self) -> &str {
            "null"
        }
        async fn play(&self) -> Result<(), StreamError> {
            Ok(())
        }
    }

    fn collaborators() -> SessionCollaborators {
        SessionCollaborators {
            signaling: Arc::new(RejectingSignaling),
            media: Arc::new(NoDevices),
            local_sink: Arc::new(NullSink),
            remote_sink: Arc::new(NullSink),
        }
    }

    fn spawn(role: Role) -> (SessionActorHandle, JoinHandle<()>) {
        SessionActor::spawn(
            SessionConfig::new(role),
            collaborators(),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_session_actor_spawn_and_cancel() {
        let (handle, task) = spawn(Role::Host);
        assert_eq!(handle.role(), Role::Host);
        assert!(!handle.is_cancelled());

        handle.cancel();
        assert!(handle.is_cancelled());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_operations_while_idle_are_noops() {
        let (handle, _task) = spawn(Role::Host);

        handle.leave_session().await.unwrap();
        handle.start_conversation().await.unwrap();
        assert_eq!(handle.status().await.unwrap(), SessionStatus::default());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_rejected_join_leaves_flags_unchanged() {
        let (handle, _task) = spawn(Role::Guest);

        let err = handle
            .join_session("room-42", SecretString::from("opaque-token"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Signaling(SignalingError::Rejected(_))
        ));
        assert_eq!(handle.status().await.unwrap(), SessionStatus::default());
        assert_eq!(handle.current_status(), SessionStatus::default());

        handle.cancel();
    }

    #[tokio::test]
    async fn test_expired_credential_rejected_before_signaling() {
        let issuer = CredentialIssuer::new(CredentialConfig {
            app_id: "app".to_string(),
            secret_key: SecretString::from("test-secret-key"),
            validity: Duration::from_secs(60),
        })
        .unwrap();
        let credential = issuer.mint_at(Capability::Attendee, 1_000).unwrap();

        let (handle, _task) = spawn(Role::Guest);
        let err = handle.join_session("room-42", credential).await.unwrap_err();
        assert!(matches!(err, SessionError::CredentialExpired));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_handle_fails_after_actor_stops() {
        let (handle, task) = spawn(Role::Guest);
        handle.cancel();
        task.await.unwrap();

        let err = handle.status().await.unwrap_err();
        assert!(matches!(err, SessionError::Internal(_)));
    }
}
