//! Publication/Subscription registry.
//!
//! Records every publication observed in the room (snapshot or event) and
//! the subscription state of each one, so that overlapping signals never
//! produce a second subscribe for the same publication id.

use crate::signaling::PublicationInfo;
use crate::stream::StreamKind;
use common::types::{MemberId, PublicationId};
use std::collections::{HashMap, HashSet};

/// Local subscription state of one remote publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribe issued, completion not yet applied.
    Requested,
    /// Stream resolved and routed.
    Active(StreamKind),
}

#[derive(Debug, Default)]
pub struct PublicationRegistry {
    publications: HashMap<PublicationId, PublicationInfo>,
    /// Observation order, so passes over publications are deterministic.
    order: Vec<PublicationId>,
    subscriptions: HashMap<PublicationId, SubscriptionState>,
    /// Own publications already pushed onto the remote member.
    pushed: HashSet<PublicationId>,
}

impl PublicationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a publication. Returns `false` if its id was already known.
    pub fn record(&mut self, publication: PublicationInfo) -> bool {
        if self.publications.contains_key(&publication.id) {
            return false;
        }
        self.order.push(publication.id.clone());
        self.publications.insert(publication.id.clone(), publication);
        true
    }

    #[must_use]
    pub fn subscription(&self, id: &PublicationId) -> Option<SubscriptionState> {
        self.subscriptions.get(id).copied()
    }

    /// Mark a subscribe as issued. Returns `false` if one was already
    /// requested or resolved for this publication.
    pub fn mark_requested(&mut self, id: &PublicationId) -> bool {
        if self.subscriptions.contains_key(id) {
            return false;
        }
        self.subscriptions
            .insert(id.clone(), SubscriptionState::Requested);
        true
    }

    /// Mark a subscription as resolved. Ignored for unknown publications.
    pub fn mark_active(&mut self, id: &PublicationId, kind: StreamKind) -> bool {
        if !self.publications.contains_key(id) {
            return false;
        }
        self.subscriptions
            .insert(id.clone(), SubscriptionState::Active(kind));
        true
    }

    /// Record a subscription created on our behalf by another member. The
    /// publication itself may not have been observed yet.
    pub fn mark_granted(&mut self, id: &PublicationId, kind: StreamKind) {
        self.subscriptions
            .insert(id.clone(), SubscriptionState::Active(kind));
    }

    /// Forget a failed subscribe so a later pass may try again.
    pub fn mark_failed(&mut self, id: &PublicationId) {
        if self.subscriptions.get(id) == Some(&SubscriptionState::Requested) {
            self.subscriptions.remove(id);
        }
    }

    /// Drop the subscription of a publication whose stream was displaced
    /// from its slot. The publication itself stays recorded.
    pub fn forget_subscription(&mut self, id: &PublicationId) {
        self.subscriptions.remove(id);
    }

    /// Returns `false` if `id` was already pushed.
    pub fn mark_pushed(&mut self, id: &PublicationId) -> bool {
        self.pushed.insert(id.clone())
    }

    pub fn unmark_pushed(&mut self, id: &PublicationId) {
        self.pushed.remove(id);
    }

    #[must_use]
    pub fn is_pushed(&self, id: &PublicationId) -> bool {
        self.pushed.contains(id)
    }

    pub fn clear_pushed(&mut self) {
        self.pushed.clear();
    }

    /// Drop every publication (and its subscription) owned by `publisher`.
    pub fn forget_publisher(&mut self, publisher: &MemberId) {
        let gone: Vec<PublicationId> = self
            .publications
            .values()
            .filter(|p| &p.publisher.id == publisher)
            .map(|p| p.id.clone())
            .collect();
        for id in &gone {
            self.publications.remove(id);
            self.subscriptions.remove(id);
            self.pushed.remove(id);
        }
        self.order.retain(|id| !gone.contains(id));
        // Granted subscriptions whose publication never showed up
        let publications = &self.publications;
        self.subscriptions.retain(|id, _| publications.contains_key(id));
    }

    /// Publications owned by `member`, in observation order.
    pub fn owned_by<'a>(
        &'a self,
        member: &'a MemberId,
    ) -> impl Iterator<Item = &'a PublicationInfo> + 'a {
        self.in_order().filter(move |p| &p.publisher.id == member)
    }

    /// Publications not owned by `member`, in observation order.
    pub fn not_owned_by<'a>(
        &'a self,
        member: &'a MemberId,
    ) -> impl Iterator<Item = &'a PublicationInfo> + 'a {
        self.in_order().filter(move |p| &p.publisher.id != member)
    }

    fn in_order(&self) -> impl Iterator<Item = &PublicationInfo> {
        self.order.iter().filter_map(|id| self.publications.get(id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.publications.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.publications.is_empty()
    }

    pub fn reset(&mut self) {
        self.publications.clear();
        self.order.clear();
        self.subscriptions.clear();
        self.pushed.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::signaling::MemberInfo;

    fn publication(id: &str, publisher: &str, kind: StreamKind) -> PublicationInfo {
        PublicationInfo {
            id: PublicationId::from(id),
            publisher: MemberInfo::new(MemberId::from(publisher), publisher),
            kind,
        }
    }

    #[test]
    fn test_duplicate_publication_recorded_once() {
        let mut registry = PublicationRegistry::new();
        assert!(registry.record(publication("p1", "guest", StreamKind::Audio)));
        assert!(!registry.record(publication("p1", "guest", StreamKind::Audio)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_subscribe_requested_once() {
        let mut registry = PublicationRegistry::new();
        let id = PublicationId::from("p1");
        registry.record(publication("p1", "host", StreamKind::Video));

        assert!(registry.mark_requested(&id));
        assert!(!registry.mark_requested(&id));
        assert!(registry.mark_active(&id, StreamKind::Video));
        assert!(!registry.mark_requested(&id));
        assert_eq!(
            registry.subscription(&id),
            Some(SubscriptionState::Active(StreamKind::Video))
        );
    }

    #[test]
    fn test_failed_subscribe_can_be_retried() {
        let mut registry = PublicationRegistry::new();
        let id = PublicationId::from("p1");
        registry.record(publication("p1", "host", StreamKind::Audio));
        registry.mark_requested(&id);
        registry.mark_failed(&id);
        assert_eq!(registry.subscription(&id), None);
        assert!(registry.mark_requested(&id));
    }

    #[test]
    fn test_displaced_subscription_forgotten() {
        let mut registry = PublicationRegistry::new();
        let id = PublicationId::from("p1");
        registry.record(publication("p1", "host", StreamKind::Video));
        registry.mark_requested(&id);
        registry.mark_active(&id, StreamKind::Video);

        registry.forget_subscription(&id);
        assert_eq!(registry.subscription(&id), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_mark_active_unknown_publication_ignored() {
        let mut registry = PublicationRegistry::new();
        assert!(!registry.mark_active(&PublicationId::from("ghost"), StreamKind::Audio));
    }

    #[test]
    fn test_ownership_filters_and_forget() {
        let mut registry = PublicationRegistry::new();
        registry.record(publication("h-audio", "host", StreamKind::Audio));
        registry.record(publication("g-audio", "guest", StreamKind::Audio));
        registry.record(publication("g-video", "guest", StreamKind::Video));
        registry.mark_requested(&PublicationId::from("g-video"));

        let host = MemberId::from("host");
        let guest = MemberId::from("guest");
        let owned: Vec<_> = registry.owned_by(&host).map(|p| p.id.as_str()).collect();
        assert_eq!(owned, vec!["h-audio"]);
        let foreign: Vec<_> = registry
            .not_owned_by(&host)
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(foreign, vec!["g-audio", "g-video"]);

        registry.forget_publisher(&guest);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.subscription(&PublicationId::from("g-video")), None);
    }

    #[test]
    fn test_pushed_tracking() {
        let mut registry = PublicationRegistry::new();
        let id = PublicationId::from("h-video");
        assert!(registry.mark_pushed(&id));
        assert!(!registry.mark_pushed(&id));
        registry.clear_pushed();
        assert!(!registry.is_pushed(&id));
    }
}
