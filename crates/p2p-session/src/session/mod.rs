//! Pure session state (no I/O).
//!
//! The [`SessionMachine`] consumes [`SessionEvent`]s and returns the
//! [`Effect`]s the actor must perform against the collaborators. Keeping it
//! free of I/O lets every transition be unit tested without a signaling
//! service.
//!
//! # Modules
//!
//! - [`policy`] - Role and per-role subscription policy
//! - [`membership`] - Local joined / remote present tracking
//! - [`registry`] - Known publications and subscription state
//! - [`machine`] - The state machine combining the above

pub mod machine;
pub mod membership;
pub mod policy;
pub mod registry;

pub use machine::{ConversationPlan, Effect, SessionEvent, SessionMachine, SessionPhase, SessionStatus};
pub use membership::MembershipTracker;
pub use policy::{Role, SubscriptionPolicy};
pub use registry::{PublicationRegistry, SubscriptionState};
