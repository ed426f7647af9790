//! Membership tracking.
//!
//! A member is "remote" iff its declared name differs from the local role's
//! name. Self-events are filtered by that comparison, so the order in which
//! the join confirmation and the event stream arrive does not matter.
//!
//! The initial snapshot taken at join time and later `MemberJoined` events may
//! overlap; remote members are keyed by id so the overlap is absorbed.

use crate::signaling::MemberInfo;
use common::types::MemberId;
use std::collections::BTreeMap;

/// Tracks `localMemberJoined` / `remoteMemberJoined`.
#[derive(Debug)]
pub struct MembershipTracker {
    local_name: String,
    local: Option<MemberInfo>,
    remotes: BTreeMap<MemberId, MemberInfo>,
}

impl MembershipTracker {
    #[must_use]
    pub fn new(local_name: impl Into<String>) -> Self {
        Self {
            local_name: local_name.into(),
            local: None,
            remotes: BTreeMap::new(),
        }
    }

    /// Whether `member` counts as the remote party.
    #[must_use]
    pub fn is_remote(&self, member: &MemberInfo) -> bool {
        member.name != self.local_name
    }

    /// Record the local join and reconcile the existing-member snapshot.
    pub fn local_joined(&mut self, local: MemberInfo, snapshot: &[MemberInfo]) {
        self.local = Some(local);
        for member in snapshot {
            self.member_joined(member);
        }
    }

    /// Returns `true` if this added a remote member not seen before.
    pub fn member_joined(&mut self, member: &MemberInfo) -> bool {
        if !self.is_remote(member) {
            return false;
        }
        self.remotes
            .insert(member.id.clone(), member.clone())
            .is_none()
    }

    /// Returns `true` if `member` was a tracked remote member.
    pub fn member_left(&mut self, member: &MemberInfo) -> bool {
        if !self.is_remote(member) {
            return false;
        }
        self.remotes.remove(&member.id).is_some()
    }

    #[must_use]
    pub fn local(&self) -> Option<&MemberInfo> {
        self.local.as_ref()
    }

    #[must_use]
    pub fn local_member_joined(&self) -> bool {
        self.local.is_some()
    }

    #[must_use]
    pub fn remote_member_joined(&self) -> bool {
        !self.remotes.is_empty()
    }

    /// The remote party, if present.
    #[must_use]
    pub fn remote(&self) -> Option<&MemberInfo> {
        self.remotes.values().next()
    }

    pub fn reset(&mut self) {
        self.local = None;
        self.remotes.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn member(id: &str, name: &str) -> MemberInfo {
        MemberInfo::new(MemberId::from(id), name)
    }

    #[test]
    fn test_snapshot_with_remote_already_present() {
        let mut tracker = MembershipTracker::new("guest");
        let me = member("m-guest", "guest");
        tracker.local_joined(me.clone(), &[member("m-host", "host"), me]);

        assert!(tracker.local_member_joined());
        assert!(tracker.remote_member_joined());
        assert_eq!(tracker.remote().unwrap().name, "host");
    }

    #[test]
    fn test_self_event_is_never_remote() {
        let mut tracker = MembershipTracker::new("host");
        // Self join event arrives before the join confirmation
        assert!(!tracker.member_joined(&member("m-host", "host")));
        tracker.local_joined(member("m-host", "host"), &[]);
        assert!(!tracker.remote_member_joined());
        assert!(!tracker.member_left(&member("m-host", "host")));
    }

    #[test]
    fn test_snapshot_and_event_overlap_counted_once() {
        let mut tracker = MembershipTracker::new("host");
        let guest = member("m-guest", "guest");
        tracker.local_joined(member("m-host", "host"), &[guest.clone()]);

        assert!(!tracker.member_joined(&guest));
        assert!(tracker.member_left(&guest));
        assert!(!tracker.remote_member_joined());
    }

    #[test]
    fn test_unknown_member_left_is_ignored() {
        let mut tracker = MembershipTracker::new("host");
        tracker.local_joined(member("m-host", "host"), &[]);
        assert!(!tracker.member_left(&member("m-ghost", "guest")));
    }

    #[test]
    fn test_reset() {
        let mut tracker = MembershipTracker::new("host");
        tracker.local_joined(member("m-host", "host"), &[member("m-guest", "guest")]);
        tracker.reset();
        assert!(!tracker.local_member_joined());
        assert!(!tracker.remote_member_joined());
    }
}
