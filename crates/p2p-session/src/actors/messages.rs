//! Message types for the session actor.
//!
//! Requests use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::SessionError;
use crate::session::SessionStatus;
use crate::stream::RemoteStream;
use common::secret::SecretString;
use common::types::PublicationId;
use tokio::sync::oneshot;

/// Requests sent to `SessionActor` by its handle.
#[derive(Debug)]
pub enum SessionMessage {
    /// Open or attach to the room named `room_name` and join it.
    Join {
        room_name: String,
        credential: SecretString,
        /// Response channel for the join result.
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Tear the session down.
    Leave {
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Host only: start the conversation with the remote member.
    StartConversation {
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Get the current status.
    GetStatus {
        respond_to: oneshot::Sender<SessionStatus>,
    },
}

/// Results of external calls the actor spawned off its loop.
///
/// Each carries the generation of the session that issued it.
#[derive(Debug)]
pub enum TaskCompletion {
    /// The local member's subscribe resolved.
    Subscribed {
        generation: u64,
        publication_id: PublicationId,
        result: Result<RemoteStream, SessionError>,
    },

    /// A subscription push onto the remote member resolved.
    Pushed {
        generation: u64,
        publication_id: PublicationId,
        result: Result<(), SessionError>,
    },
}

impl TaskCompletion {
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            TaskCompletion::Subscribed { generation, .. }
            | TaskCompletion::Pushed { generation, .. } => *generation,
        }
    }
}
