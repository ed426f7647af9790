//! Common error types for the P2P session components.

use thiserror::Error;

/// Errors raised while minting or inspecting room credentials.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// A required configuration variable is absent.
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    /// The signing key is empty or otherwise unusable.
    #[error("Credential signing key is invalid")]
    InvalidKey,

    /// Encoding the claims into a signed credential failed.
    #[error("Credential encoding failed: {0}")]
    Encoding(String),

    /// The credential is not a well-formed signed token.
    #[error("Credential is malformed")]
    Malformed,

    /// The credential validity window has passed.
    #[error("Credential has expired")]
    Expired,
}

/// Result type alias using `CredentialError`
pub type Result<T> = std::result::Result<T, CredentialError>;
