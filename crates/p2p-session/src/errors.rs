//! Session controller error types.
//!
//! Only external-call failures surface to callers. Calling an operation in
//! the wrong state is a silent no-op and never produces an error.
//! Internal details are logged but not exposed through `client_message`.

use thiserror::Error;

/// Session controller error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The signaling/media collaborator rejected a call.
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// A stream handle was used after release.
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// An external call did not complete within the operation timeout.
    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    /// The room credential was already past its expiry.
    #[error("Credential has expired")]
    CredentialExpired,

    /// Actor communication failed.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures reported by the external signaling/media collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    /// The service refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The credential does not grant the requested action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A referenced room, member or publication does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The room has been disposed.
    #[error("room disposed")]
    Disposed,

    /// Camera or microphone could not be captured.
    #[error("media capture failed: {0}")]
    MediaCapture(String),
}

/// Stream resource handle misuse.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum StreamError {
    /// attach/detach on a released handle.
    #[error("stream already released")]
    Released,

    /// The sink refused to start playback.
    #[error("playback could not start")]
    PlaybackFailed,
}

impl SessionError {
    /// Returns a UI-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Signaling(SignalingError::PermissionDenied(_)) => {
                "This credential is not allowed to do that".to_string()
            }
            SessionError::Signaling(SignalingError::MediaCapture(_)) => {
                "Camera or microphone is unavailable".to_string()
            }
            SessionError::Signaling(_) => "The session service rejected the request".to_string(),
            SessionError::Timeout(_) => "The session service did not respond in time".to_string(),
            SessionError::CredentialExpired => "Your session credential has expired".to_string(),
            SessionError::Stream(_) | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            SessionError::Signaling(_) => "signaling",
            SessionError::Stream(_) => "stream",
            SessionError::Timeout(_) => "timeout",
            SessionError::CredentialExpired => "credential_expired",
            SessionError::Internal(_) => "internal",
        }
    }
}
