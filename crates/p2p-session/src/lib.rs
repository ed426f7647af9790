//! P2P Session Controller Library
//!
//! This library drives one local participant through the lifecycle of a
//! two-party real-time session on a hosted signaling/media service:
//!
//! - Joining a room by name and publishing local camera/microphone streams
//! - Tracking whether the remote participant is present
//! - Deciding, per role, which publications get subscribed and by whom
//! - Attaching remote streams to a playback sink once a conversation starts
//! - Tearing everything down again, exactly once and in order
//!
//! # Architecture
//!
//! ```text
//! SessionActorHandle (cloneable, UI-facing)
//! └── SessionActor (one tokio task per local participant)
//!     ├── SessionMachine (pure: no I/O)
//!     │   ├── MembershipTracker   (local joined / remote present)
//!     │   └── PublicationRegistry (known publications, subscriptions)
//!     ├── ActiveSession (room, local member, event receivers)
//!     └── StreamHandles (local audio/video, remote audio/video slots)
//! ```
//!
//! The signaling service, media capture and playback sinks are external
//! collaborators behind the traits in [`signaling`] and [`stream`].
//!
//! # Roles
//!
//! - **Host** records publications and, on `start_conversation`, pushes
//!   subscriptions for its own publications onto the guest while subscribing
//!   itself to the guest's publications.
//! - **Guest** subscribes eagerly to every publication it does not own and
//!   enters the conversation when the host's pushed subscription arrives.
//!
//! # Modules
//!
//! - [`actors`] - Session actor and its handle
//! - [`session`] - Pure state machine, membership tracker, registry, role policy
//! - [`signaling`] - Collaborator traits and event types
//! - [`stream`] - Stream resource handles and sinks
//! - [`media`] - Local media acquisition
//! - [`config`] - Controller configuration from environment
//! - [`errors`] - Error types
//! - [`observability`] - Tracing setup and metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod media;
pub mod observability;
pub mod session;
pub mod signaling;
pub mod stream;

pub use actors::{SessionActor, SessionActorHandle, SessionCollaborators};
pub use config::SessionConfig;
pub use errors::SessionError;
pub use session::{Role, SessionPhase, SessionStatus};
