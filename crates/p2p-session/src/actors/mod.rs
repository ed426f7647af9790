//! Actor implementation of the session controller.
//!
//! ```text
//! SessionActorHandle (cloneable; join/leave/start/status)
//! └── SessionActor (one tokio task per local participant)
//!     ├── mailbox: SessionMessage (request/reply via oneshot)
//!     ├── room events + local member events (from the collaborator)
//!     └── task completions (spawned subscribe / push calls)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single owner**: the actor exclusively owns the room, the local member
//!   and every stream handle; nothing is shared across sessions
//! - **Leave is a barrier**: completions are tagged with the session
//!   generation and discarded once the session they belong to is gone
//! - **CancellationToken**: cancelling the actor performs a full leave first
//!
//! # Modules
//!
//! - [`session`] - `SessionActor` and `SessionActorHandle`
//! - [`messages`] - Message types for actor communication

pub mod messages;
pub mod session;

pub use messages::{SessionMessage, TaskCompletion};
pub use session::{SessionActor, SessionActorHandle, SessionCollaborators};
