//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate. Room credentials
//! are bearer strings: anyone holding one can join the room it is scoped to,
//! so they travel through the session layer as [`SecretString`] and never
//! appear in `Debug` output or tracing fields.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinRequest {
//!     room_name: String,
//!     credential: SecretString, // Debug shows "[REDACTED]"
//! }
//!
//! let req = JoinRequest {
//!     room_name: "room-42".to_string(),
//!     credential: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! println!("{:?}", req);
//!
//! // Handing the credential to the signaling service is an explicit act
//! let bearer: &str = req.credential.expose_secret();
//! # let _ = bearer;
//! ```
//!
//! Use `SecretString` for:
//! - Room credentials returned by the credential endpoint
//! - The application signing key used to mint them

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("bearer-credential");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("bearer-credential"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("signing-key");
        assert_eq!(secret.expose_secret(), "signing-key");
    }

    #[test]
    fn test_credential_response_deserializes() {
        // Shape of the credential endpoint response body
        #[derive(Debug, Deserialize)]
        struct CredentialResponse {
            token: SecretString,
        }

        let json = r#"{"token": "header.payload.signature"}"#;
        let body: CredentialResponse = serde_json::from_str(json).expect("deserialize");

        assert_eq!(body.token.expose_secret(), "header.payload.signature");
        let debug = format!("{body:?}");
        assert!(!debug.contains("payload"));
    }
}
