//! Session state machine.
//!
//! Pure transition function: [`SessionEvent`] in, [`Effect`]s out. The actor
//! performs the I/O the effects describe and feeds the outcome back in as
//! further events.
//!
//! ```text
//! Idle ─JoinStarted─▶ Joining ─Joined─▶ JoinedLocalOnly ◀─MemberLeft─┐
//!   ▲                    │                   │ MemberJoined           │
//!   │               JoinFailed               ▼                        │
//!   ├────────────────────┘           JoinedRemotePresent ─────────────┤
//!   │                                        │ ConversationStarted     │
//!   │                                        │ / PublicationSubscribed │
//!   │                                        ▼                        │
//!   └──────────────Left (any)──────── InConversation ─────────────────┘
//! ```
//!
//! Every session gets a new generation on `JoinStarted`. Completions of
//! asynchronous work carry the generation they were issued under and are
//! applied only while [`SessionMachine::is_current`] holds for it.

use super::membership::MembershipTracker;
use super::policy::{Role, SubscriptionPolicy};
use super::registry::PublicationRegistry;
use crate::signaling::{MemberInfo, PublicationInfo};
use crate::stream::StreamKind;
use common::types::{MemberId, PublicationId};
use serde::Serialize;

/// Inputs to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// `join_session` accepted.
    JoinStarted,
    /// Any step of the join failed; everything is rolled back.
    JoinFailed,
    /// The external join resolved; snapshots taken right after listener
    /// registration.
    Joined {
        local: MemberInfo,
        members: Vec<MemberInfo>,
        publications: Vec<PublicationInfo>,
    },
    /// A local stream was published.
    LocalPublished(PublicationInfo),
    MemberJoined(MemberInfo),
    MemberLeft(MemberInfo),
    StreamPublished(PublicationInfo),
    /// An inline subscribe is about to be issued.
    SubscriptionRequested { publication_id: PublicationId },
    SubscriptionResolved {
        publication_id: PublicationId,
        kind: StreamKind,
    },
    SubscriptionFailed { publication_id: PublicationId },
    /// A later stream of the same kind took over this publication's slot.
    SubscriptionDisplaced { publication_id: PublicationId },
    /// A push onto the remote member succeeded.
    SubscriptionPushed { publication_id: PublicationId },
    PushFailed { publication_id: PublicationId },
    /// Another member created a subscription for the local member.
    PublicationSubscribed {
        publication_id: PublicationId,
        kind: StreamKind,
    },
    ConversationStarted,
    Left,
}

impl SessionEvent {
    /// Returns the event type as a string for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionEvent::JoinStarted => "join_started",
            SessionEvent::JoinFailed => "join_failed",
            SessionEvent::Joined { .. } => "joined",
            SessionEvent::LocalPublished(_) => "local_published",
            SessionEvent::MemberJoined(_) => "member_joined",
            SessionEvent::MemberLeft(_) => "member_left",
            SessionEvent::StreamPublished(_) => "stream_published",
            SessionEvent::SubscriptionRequested { .. } => "subscription_requested",
            SessionEvent::SubscriptionResolved { .. } => "subscription_resolved",
            SessionEvent::SubscriptionFailed { .. } => "subscription_failed",
            SessionEvent::SubscriptionDisplaced { .. } => "subscription_displaced",
            SessionEvent::SubscriptionPushed { .. } => "subscription_pushed",
            SessionEvent::PushFailed { .. } => "push_failed",
            SessionEvent::PublicationSubscribed { .. } => "publication_subscribed",
            SessionEvent::ConversationStarted => "conversation_started",
            SessionEvent::Left => "left",
        }
    }
}

/// Work the actor must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Subscribe the local member to a publication.
    Subscribe(PublicationInfo),
    /// Make `member` subscribe to one of our publications.
    PushSubscribe {
        member: MemberId,
        publication_id: PublicationId,
    },
    /// Attach held remote streams to the remote sink.
    AttachRemote,
    /// Detach and release every remote stream.
    DropRemote,
}

/// What `start_conversation` has to do, computed from current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationPlan {
    pub remote: MemberInfo,
    /// Own publications to push onto the remote member.
    pub push: Vec<PublicationId>,
    /// Remote publications the host subscribes itself to.
    pub subscribe: Vec<PublicationInfo>,
}

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Joining,
    JoinedLocalOnly,
    JoinedRemotePresent,
    InConversation,
}

impl SessionPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Joining => "joining",
            SessionPhase::JoinedLocalOnly => "joined_local_only",
            SessionPhase::JoinedRemotePresent => "joined_remote_present",
            SessionPhase::InConversation => "in_conversation",
        }
    }
}

/// Snapshot published to UI observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub local_member_joined: bool,
    pub remote_member_joined: bool,
    pub in_conversation: bool,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            local_member_joined: false,
            remote_member_joined: false,
            in_conversation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Joining,
    Joined,
}

/// One parameterized machine for both roles.
#[derive(Debug)]
pub struct SessionMachine {
    role: Role,
    phase: Phase,
    generation: u64,
    membership: MembershipTracker,
    registry: PublicationRegistry,
    in_conversation: bool,
}

impl SessionMachine {
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            phase: Phase::Idle,
            generation: 0,
            membership: MembershipTracker::new(role.as_str()),
            registry: PublicationRegistry::new(),
            in_conversation: false,
        }
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.phase == Phase::Joined
    }

    /// Whether a completion issued under `generation` may still be applied.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.phase == Phase::Joined && self.generation == generation
    }

    #[must_use]
    pub fn in_conversation(&self) -> bool {
        self.in_conversation
    }

    #[must_use]
    pub fn local(&self) -> Option<&MemberInfo> {
        self.membership.local()
    }

    #[must_use]
    pub fn remote(&self) -> Option<&MemberInfo> {
        self.membership.remote()
    }

    #[must_use]
    pub fn registry(&self) -> &PublicationRegistry {
        &self.registry
    }

    /// Whether a resolved stream for `publication_id` should be kept.
    #[must_use]
    pub fn wants_stream(&self, publication_id: &PublicationId) -> bool {
        self.is_joined() && self.registry.subscription(publication_id).is_some()
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        match self.phase {
            Phase::Idle => SessionPhase::Idle,
            Phase::Joining => SessionPhase::Joining,
            Phase::Joined if self.in_conversation => SessionPhase::InConversation,
            Phase::Joined if self.membership.remote_member_joined() => {
                SessionPhase::JoinedRemotePresent
            }
            Phase::Joined => SessionPhase::JoinedLocalOnly,
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let joined = self.is_joined();
        SessionStatus {
            phase: self.phase(),
            local_member_joined: joined && self.membership.local_member_joined(),
            remote_member_joined: joined && self.membership.remote_member_joined(),
            in_conversation: joined && self.in_conversation,
        }
    }

    /// Plan for `start_conversation`, or `None` when it is a no-op
    /// (guest role, not joined, no remote, already in conversation).
    #[must_use]
    pub fn conversation_plan(&self) -> Option<ConversationPlan> {
        if self.role.policy() != SubscriptionPolicy::PushOnConversationStart
            || !self.is_joined()
            || self.in_conversation
        {
            return None;
        }
        let local = self.membership.local()?;
        let remote = self.membership.remote()?;

        let push = self
            .registry
            .owned_by(&local.id)
            .filter(|p| p.kind.is_media() && !self.registry.is_pushed(&p.id))
            .map(|p| p.id.clone())
            .collect();
        let subscribe = self
            .registry
            .not_owned_by(&local.id)
            .filter(|p| {
                p.kind.is_media()
                    && p.publisher.id == remote.id
                    && self.registry.subscription(&p.id).is_none()
            })
            .cloned()
            .collect();

        Some(ConversationPlan {
            remote: remote.clone(),
            push,
            subscribe,
        })
    }

    /// Apply one event and return the effects it triggers.
    pub fn apply(&mut self, event: SessionEvent) -> Vec<Effect> {
        match event {
            SessionEvent::JoinStarted => {
                if self.phase == Phase::Idle {
                    self.phase = Phase::Joining;
                    self.generation += 1;
                }
                Vec::new()
            }
            SessionEvent::JoinFailed => {
                if self.phase != Phase::Idle {
                    self.reset();
                }
                Vec::new()
            }
            SessionEvent::Joined {
                local,
                members,
                publications,
            } => {
                if self.phase != Phase::Joining {
                    return Vec::new();
                }
                self.phase = Phase::Joined;
                self.membership.local_joined(local, &members);
                publications
                    .into_iter()
                    .flat_map(|p| self.observe(p))
                    .collect()
            }
            SessionEvent::LocalPublished(publication)
            | SessionEvent::StreamPublished(publication) => {
                if !self.is_joined() {
                    return Vec::new();
                }
                self.observe(publication)
            }
            SessionEvent::MemberJoined(member) => {
                if self.is_joined() {
                    self.membership.member_joined(&member);
                }
                Vec::new()
            }
            SessionEvent::MemberLeft(member) => {
                if !self.is_joined() || !self.membership.member_left(&member) {
                    return Vec::new();
                }
                self.registry.forget_publisher(&member.id);
                self.registry.clear_pushed();
                self.in_conversation = false;
                vec![Effect::DropRemote]
            }
            SessionEvent::SubscriptionRequested { publication_id } => {
                if self.is_joined() {
                    self.registry.mark_requested(&publication_id);
                }
                Vec::new()
            }
            SessionEvent::SubscriptionResolved {
                publication_id,
                kind,
            } => {
                if !self.is_joined() || !self.registry.mark_active(&publication_id, kind) {
                    return Vec::new();
                }
                if self.in_conversation && kind.is_media() {
                    vec![Effect::AttachRemote]
                } else {
                    Vec::new()
                }
            }
            SessionEvent::SubscriptionFailed { publication_id } => {
                self.registry.mark_failed(&publication_id);
                Vec::new()
            }
            SessionEvent::SubscriptionDisplaced { publication_id } => {
                if self.is_joined() {
                    self.registry.forget_subscription(&publication_id);
                }
                Vec::new()
            }
            SessionEvent::SubscriptionPushed { publication_id } => {
                if self.is_joined() {
                    self.registry.mark_pushed(&publication_id);
                }
                Vec::new()
            }
            SessionEvent::PushFailed { publication_id } => {
                self.registry.unmark_pushed(&publication_id);
                Vec::new()
            }
            SessionEvent::PublicationSubscribed {
                publication_id,
                kind,
            } => {
                if !self.is_joined()
                    || self.role.policy() != SubscriptionPolicy::EagerOnPublish
                    || !kind.is_media()
                {
                    return Vec::new();
                }
                self.registry.mark_granted(&publication_id, kind);
                self.in_conversation = true;
                vec![Effect::AttachRemote]
            }
            SessionEvent::ConversationStarted => {
                if self.role.starts_conversation()
                    && self.is_joined()
                    && !self.in_conversation
                    && self.membership.remote_member_joined()
                {
                    self.in_conversation = true;
                    vec![Effect::AttachRemote]
                } else {
                    Vec::new()
                }
            }
            SessionEvent::Left => {
                if self.phase != Phase::Idle {
                    self.reset();
                }
                Vec::new()
            }
        }
    }

    fn observe(&mut self, publication: PublicationInfo) -> Vec<Effect> {
        if !self.registry.record(publication.clone()) {
            return Vec::new();
        }
        let Some(local) = self.membership.local() else {
            return Vec::new();
        };
        if !publication.kind.is_media() {
            return Vec::new();
        }

        if publication.publisher.id == local.id {
            // Own publication: only the host mirrors it onto the remote, and
            // only once the conversation is running.
            if self.role.policy() != SubscriptionPolicy::PushOnConversationStart
                || !self.in_conversation
            {
                return Vec::new();
            }
            let Some(remote) = self.membership.remote() else {
                return Vec::new();
            };
            let member = remote.id.clone();
            if self.registry.mark_pushed(&publication.id) {
                return vec![Effect::PushSubscribe {
                    member,
                    publication_id: publication.id,
                }];
            }
            return Vec::new();
        }

        let wanted = match self.role.policy() {
            SubscriptionPolicy::EagerOnPublish => true,
            SubscriptionPolicy::PushOnConversationStart => self.in_conversation,
        };
        if wanted && self.registry.mark_requested(&publication.id) {
            vec![Effect::Subscribe(publication)]
        } else {
            Vec::new()
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.membership.reset();
        self.registry.reset();
        self.in_conversation = false;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn member(name: &str) -> MemberInfo {
        MemberInfo::new(MemberId::from(format!("id-{name}").as_str()), name)
    }

    fn publication(id: &str, publisher: &MemberInfo, kind: StreamKind) -> PublicationInfo {
        PublicationInfo {
            id: PublicationId::from(id),
            publisher: publisher.clone(),
            kind,
        }
    }

    fn joined(
        role: Role,
        members: Vec<MemberInfo>,
        publications: Vec<PublicationInfo>,
    ) -> (SessionMachine, Vec<Effect>) {
        let mut machine = SessionMachine::new(role);
        machine.apply(SessionEvent::JoinStarted);
        let effects = machine.apply(SessionEvent::Joined {
            local: member(role.as_str()),
            members,
            publications,
        });
        (machine, effects)
    }

    fn subscribed_ids(effects: &[Effect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Subscribe(p) => Some(p.id.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_initial_status_is_idle() {
        let machine = SessionMachine::new(Role::Host);
        assert_eq!(machine.status(), SessionStatus::default());
        assert!(machine.conversation_plan().is_none());
    }

    #[test]
    fn test_join_started_twice_is_noop() {
        let mut machine = SessionMachine::new(Role::Guest);
        machine.apply(SessionEvent::JoinStarted);
        machine.apply(SessionEvent::JoinStarted);
        assert_eq!(machine.generation(), 1);
        assert_eq!(machine.phase(), SessionPhase::Joining);
    }

    #[test]
    fn test_join_failed_restores_idle() {
        let mut machine = SessionMachine::new(Role::Guest);
        machine.apply(SessionEvent::JoinStarted);
        machine.apply(SessionEvent::JoinFailed);
        assert_eq!(machine.status(), SessionStatus::default());
        assert!(!machine.is_current(1));
    }

    #[test]
    fn test_guest_eager_subscribes_snapshot_once() {
        let host = member("host");
        let guest = member("guest");
        let (mut machine, effects) = joined(
            Role::Guest,
            vec![host.clone(), guest.clone()],
            vec![
                publication("h-audio", &host, StreamKind::Audio),
                publication("h-video", &host, StreamKind::Video),
            ],
        );
        assert_eq!(subscribed_ids(&effects), vec!["h-audio", "h-video"]);
        assert_eq!(machine.phase(), SessionPhase::JoinedRemotePresent);

        let again = machine.apply(SessionEvent::StreamPublished(publication(
            "h-audio",
            &host,
            StreamKind::Audio,
        )));
        assert!(again.is_empty());
    }

    #[test]
    fn test_displaced_subscription_no_longer_wanted() {
        let host = member("host");
        let (mut machine, _) = joined(
            Role::Guest,
            vec![host.clone()],
            vec![
                publication("h-video-1", &host, StreamKind::Video),
                publication("h-video-2", &host, StreamKind::Video),
            ],
        );
        let first = PublicationId::from("h-video-1");
        let second = PublicationId::from("h-video-2");
        for id in [&first, &second] {
            machine.apply(SessionEvent::SubscriptionResolved {
                publication_id: id.clone(),
                kind: StreamKind::Video,
            });
        }

        let effects = machine.apply(SessionEvent::SubscriptionDisplaced {
            publication_id: first.clone(),
        });
        assert!(effects.is_empty());
        assert_eq!(machine.registry().subscription(&first), None);
        assert!(!machine.wants_stream(&first));
        assert!(machine.wants_stream(&second));

        // Re-announcing the displaced publication does not subscribe again.
        let again = machine.apply(SessionEvent::StreamPublished(publication(
            "h-video-1",
            &host,
            StreamKind::Video,
        )));
        assert!(again.is_empty());
    }

    #[test]
    fn test_self_publications_never_subscribed() {
        let guest = member("guest");
        let (mut machine, _) = joined(Role::Guest, vec![], vec![]);
        let effects = machine.apply(SessionEvent::LocalPublished(publication(
            "g-audio",
            &guest,
            StreamKind::Audio,
        )));
        assert!(effects.is_empty());
        let effects = machine.apply(SessionEvent::StreamPublished(publication(
            "g-video",
            &guest,
            StreamKind::Video,
        )));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_data_publications_ignored() {
        let host = member("host");
        let (mut machine, _) = joined(Role::Guest, vec![host.clone()], vec![]);
        let effects = machine.apply(SessionEvent::StreamPublished(publication(
            "h-data",
            &host,
            StreamKind::Data,
        )));
        assert!(effects.is_empty());
        let effects = machine.apply(SessionEvent::PublicationSubscribed {
            publication_id: PublicationId::from("h-data"),
            kind: StreamKind::Data,
        });
        assert!(effects.is_empty());
        assert!(!machine.in_conversation());
    }

    #[test]
    fn test_host_records_without_subscribing_before_start() {
        let guest = member("guest");
        let (mut machine, effects) = joined(Role::Host, vec![], vec![]);
        assert!(effects.is_empty());
        machine.apply(SessionEvent::MemberJoined(guest.clone()));
        let effects = machine.apply(SessionEvent::StreamPublished(publication(
            "g-audio",
            &guest,
            StreamKind::Audio,
        )));
        assert!(effects.is_empty());
        assert_eq!(machine.registry().len(), 1);
    }

    #[test]
    fn test_host_start_without_remote_is_noop() {
        let (mut machine, _) = joined(Role::Host, vec![], vec![]);
        assert!(machine.conversation_plan().is_none());
        assert!(machine.apply(SessionEvent::ConversationStarted).is_empty());
        assert!(!machine.status().in_conversation);
        assert_eq!(machine.phase(), SessionPhase::JoinedLocalOnly);
    }

    #[test]
    fn test_guest_has_no_conversation_plan() {
        let host = member("host");
        let (mut machine, _) = joined(Role::Guest, vec![host], vec![]);
        assert!(machine.conversation_plan().is_none());
        assert!(machine.apply(SessionEvent::ConversationStarted).is_empty());
    }

    #[test]
    fn test_host_conversation_plan() {
        let host = member("host");
        let guest = member("guest");
        let (mut machine, _) = joined(
            Role::Host,
            vec![guest.clone()],
            vec![
                publication("g-audio", &guest, StreamKind::Audio),
                publication("g-data", &guest, StreamKind::Data),
            ],
        );
        machine.apply(SessionEvent::LocalPublished(publication(
            "h-audio",
            &host,
            StreamKind::Audio,
        )));
        machine.apply(SessionEvent::LocalPublished(publication(
            "h-video",
            &host,
            StreamKind::Video,
        )));

        let plan = machine.conversation_plan().unwrap();
        assert_eq!(plan.remote, guest);
        let push: Vec<_> = plan.push.iter().map(PublicationId::as_str).collect();
        assert_eq!(push, vec!["h-audio", "h-video"]);
        let subscribe: Vec<_> = plan.subscribe.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(subscribe, vec!["g-audio"]);

        let effects = machine.apply(SessionEvent::ConversationStarted);
        assert_eq!(effects, vec![Effect::AttachRemote]);
        assert_eq!(machine.phase(), SessionPhase::InConversation);
        assert!(machine.conversation_plan().is_none());
    }

    #[test]
    fn test_host_mirrors_publications_during_conversation() {
        let host = member("host");
        let guest = member("guest");
        let (mut machine, _) = joined(Role::Host, vec![guest.clone()], vec![]);
        machine.apply(SessionEvent::ConversationStarted);

        let effects = machine.apply(SessionEvent::LocalPublished(publication(
            "h-video",
            &host,
            StreamKind::Video,
        )));
        assert_eq!(
            effects,
            vec![Effect::PushSubscribe {
                member: guest.id.clone(),
                publication_id: PublicationId::from("h-video"),
            }]
        );

        let effects = machine.apply(SessionEvent::StreamPublished(publication(
            "g-video",
            &guest,
            StreamKind::Video,
        )));
        assert_eq!(subscribed_ids(&effects), vec!["g-video"]);
    }

    #[test]
    fn test_guest_flips_conversation_on_notification() {
        let host = member("host");
        let (mut machine, _) = joined(
            Role::Guest,
            vec![host.clone()],
            vec![publication("h-video", &host, StreamKind::Video)],
        );
        let effects = machine.apply(SessionEvent::SubscriptionResolved {
            publication_id: PublicationId::from("h-video"),
            kind: StreamKind::Video,
        });
        assert!(effects.is_empty());
        assert!(!machine.in_conversation());

        let effects = machine.apply(SessionEvent::PublicationSubscribed {
            publication_id: PublicationId::from("h-video"),
            kind: StreamKind::Video,
        });
        assert_eq!(effects, vec![Effect::AttachRemote]);
        assert!(machine.status().in_conversation);
    }

    #[test]
    fn test_notification_before_publication_event_blocks_resubscribe() {
        let host = member("host");
        let (mut machine, _) = joined(Role::Guest, vec![host.clone()], vec![]);
        machine.apply(SessionEvent::PublicationSubscribed {
            publication_id: PublicationId::from("h-audio"),
            kind: StreamKind::Audio,
        });
        let effects = machine.apply(SessionEvent::StreamPublished(publication(
            "h-audio",
            &host,
            StreamKind::Audio,
        )));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_host_ignores_publication_subscribed() {
        let guest = member("guest");
        let (mut machine, _) = joined(Role::Host, vec![guest], vec![]);
        let effects = machine.apply(SessionEvent::PublicationSubscribed {
            publication_id: PublicationId::from("g-audio"),
            kind: StreamKind::Audio,
        });
        assert!(effects.is_empty());
        assert!(!machine.in_conversation());
    }

    #[test]
    fn test_remote_leaving_mid_conversation() {
        let guest = member("guest");
        let (mut machine, _) = joined(
            Role::Host,
            vec![guest.clone()],
            vec![publication("g-audio", &guest, StreamKind::Audio)],
        );
        machine.apply(SessionEvent::ConversationStarted);

        let effects = machine.apply(SessionEvent::MemberLeft(guest));
        assert_eq!(effects, vec![Effect::DropRemote]);
        let status = machine.status();
        assert!(status.local_member_joined);
        assert!(!status.remote_member_joined);
        assert!(!status.in_conversation);
        assert_eq!(status.phase, SessionPhase::JoinedLocalOnly);
        assert!(machine.registry().is_empty());
    }

    #[test]
    fn test_self_member_left_is_ignored() {
        let (mut machine, _) = joined(Role::Host, vec![], vec![]);
        assert!(machine
            .apply(SessionEvent::MemberLeft(member("host")))
            .is_empty());
        assert!(machine.status().local_member_joined);
    }

    #[test]
    fn test_left_invalidates_generation() {
        let host = member("host");
        let (mut machine, _) = joined(
            Role::Guest,
            vec![host.clone()],
            vec![publication("h-audio", &host, StreamKind::Audio)],
        );
        let generation = machine.generation();
        assert!(machine.is_current(generation));
        assert!(machine.wants_stream(&PublicationId::from("h-audio")));

        machine.apply(SessionEvent::Left);
        assert!(!machine.is_current(generation));
        assert!(!machine.wants_stream(&PublicationId::from("h-audio")));
        assert_eq!(machine.status(), SessionStatus::default());

        machine.apply(SessionEvent::JoinStarted);
        assert_eq!(machine.generation(), generation + 1);
    }

    #[test]
    fn test_events_while_idle_are_ignored() {
        let mut machine = SessionMachine::new(Role::Guest);
        let host = member("host");
        assert!(machine
            .apply(SessionEvent::StreamPublished(publication(
                "h-audio",
                &host,
                StreamKind::Audio
            )))
            .is_empty());
        machine.apply(SessionEvent::MemberJoined(host));
        machine.apply(SessionEvent::Left);
        assert_eq!(machine.status(), SessionStatus::default());
    }

    #[test]
    fn test_failed_subscription_can_be_retriggered() {
        let host = member("host");
        let (mut machine, _) = joined(
            Role::Guest,
            vec![host.clone()],
            vec![publication("h-audio", &host, StreamKind::Audio)],
        );
        machine.apply(SessionEvent::SubscriptionFailed {
            publication_id: PublicationId::from("h-audio"),
        });
        assert!(!machine.wants_stream(&PublicationId::from("h-audio")));
    }
}
