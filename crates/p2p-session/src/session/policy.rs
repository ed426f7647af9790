//! Roles and the per-role subscription policy table.
//!
//! | Role  | Policy | Conversation starts |
//! |-------|--------|---------------------|
//! | host  | push subscriptions on conversation start | `start_conversation` |
//! | guest | eager subscription on publish | first pushed subscription |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed role of the local participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

/// How a role decides to subscribe to publications it does not own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPolicy {
    /// Record publications; subscribe and push only once the conversation
    /// has been started, then mirror later publications.
    PushOnConversationStart,
    /// Subscribe to every foreign publication as soon as it is observed.
    EagerOnPublish,
}

impl Role {
    /// Declared member name used when joining and for remote detection.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Guest => "guest",
        }
    }

    #[must_use]
    pub const fn policy(&self) -> SubscriptionPolicy {
        match self {
            Role::Host => SubscriptionPolicy::PushOnConversationStart,
            Role::Guest => SubscriptionPolicy::EagerOnPublish,
        }
    }

    /// Only the host can start a conversation explicitly.
    #[must_use]
    pub const fn starts_conversation(&self) -> bool {
        matches!(self, Role::Host)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Role::Host),
            "guest" => Ok(Role::Guest),
            other => Err(format!("unknown role '{other}' (expected host or guest)")),
        }
    }
}
