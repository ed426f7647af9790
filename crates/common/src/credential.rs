//! Room credential minting and inspection.
//!
//! The hosted signaling service authorizes clients with a short-lived HS256
//! token scoped to one application. The scope grants wildcard access to every
//! room ("channel") and member, with write access to publications. Only the
//! host capability set may create subscriptions; attendees have that grant
//! omitted, which is what forces the host to push subscriptions onto them.
//!
//! The session layer treats a credential as an opaque bearer string and never
//! refreshes it. [`peek_expiry`] exists so a caller can refuse to start a join
//! with a credential that has already lapsed.
//!
//! ```text
//! scope.app
//! ├── id, turn = true, actions = ["read"]
//! └── channels[*] (id/name "*", actions ["write"])
//!     └── members[*] (id/name "*", actions ["write"])
//!         ├── publication.actions  = ["write"]
//!         └── subscription.actions = ["write"]   (host only)
//! ```

use crate::error::{CredentialError, Result};
use crate::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Credential validity window (24 hours).
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(60 * 60 * 24);

const WILDCARD: &str = "*";

/// Which grant set a credential carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// May publish and create subscriptions (including on other members).
    Host,
    /// May publish but may not create subscriptions.
    Attendee,
}

/// A list of permitted actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionScope {
    pub actions: Vec<String>,
}

impl ActionScope {
    fn write() -> Self {
        Self {
            actions: vec!["write".to_string()],
        }
    }
}

/// Member-level grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberScope {
    pub id: String,
    pub name: String,
    pub actions: Vec<String>,
    pub publication: ActionScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<ActionScope>,
}

/// Channel (room) level grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelScope {
    pub id: String,
    pub name: String,
    pub actions: Vec<String>,
    pub members: Vec<MemberScope>,
}

/// Application level grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppScope {
    pub id: String,
    pub turn: bool,
    pub actions: Vec<String>,
    pub channels: Vec<ChannelScope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialScope {
    pub app: AppScope,
}

/// Claims carried by a room credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialClaims {
    /// Unique token id.
    pub jti: String,
    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,
    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,
    pub scope: CredentialScope,
}

impl CredentialClaims {
    /// Build claims for `app_id` issued at `iat`.
    #[must_use]
    pub fn new(app_id: &str, capability: Capability, iat: i64, validity: Duration) -> Self {
        #[allow(clippy::cast_possible_wrap)]
        let exp = iat + validity.as_secs() as i64;
        let subscription = match capability {
            Capability::Host => Some(ActionScope::write()),
            Capability::Attendee => None,
        };
        Self {
            jti: Uuid::new_v4().to_string(),
            iat,
            exp,
            scope: CredentialScope {
                app: AppScope {
                    id: app_id.to_string(),
                    turn: true,
                    actions: vec!["read".to_string()],
                    channels: vec![ChannelScope {
                        id: WILDCARD.to_string(),
                        name: WILDCARD.to_string(),
                        actions: vec!["write".to_string()],
                        members: vec![MemberScope {
                            id: WILDCARD.to_string(),
                            name: WILDCARD.to_string(),
                            actions: vec!["write".to_string()],
                            publication: ActionScope::write(),
                            subscription,
                        }],
                    }],
                },
            },
        }
    }

    /// Whether any member grant allows creating subscriptions.
    #[must_use]
    pub fn can_subscribe(&self) -> bool {
        self.scope
            .app
            .channels
            .iter()
            .flat_map(|c| c.members.iter())
            .any(|m| m.subscription.is_some())
    }

    /// Whether the credential is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// Credential issuer configuration.
#[derive(Clone)]
pub struct CredentialConfig {
    /// Application id placed in `scope.app.id`.
    pub app_id: String,
    /// HS256 signing key.
    pub secret_key: SecretString,
    /// Validity window for minted credentials.
    pub validity: Duration,
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("app_id", &self.app_id)
            .field("secret_key", &"[REDACTED]")
            .field("validity", &self.validity)
            .finish()
    }
}

impl CredentialConfig {
    /// Load from a variable map (`P2P_APP_ID`, `P2P_SECRET_KEY`).
    ///
    /// # Errors
    ///
    /// Returns `MissingVar` if either variable is absent.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let app_id = vars
            .get("P2P_APP_ID")
            .cloned()
            .ok_or_else(|| CredentialError::MissingVar("P2P_APP_ID".to_string()))?;
        let secret_key = SecretString::from(
            vars.get("P2P_SECRET_KEY")
                .cloned()
                .ok_or_else(|| CredentialError::MissingVar("P2P_SECRET_KEY".to_string()))?,
        );
        Ok(Self {
            app_id,
            secret_key,
            validity: DEFAULT_CREDENTIAL_TTL,
        })
    }
}

/// Mints and verifies room credentials.
#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    config: CredentialConfig,
}

impl CredentialIssuer {
    /// Create an issuer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for an empty signing key.
    pub fn new(config: CredentialConfig) -> Result<Self> {
        if config.secret_key.expose_secret().is_empty() {
            return Err(CredentialError::InvalidKey);
        }
        Ok(Self { config })
    }

    /// Mint a credential valid from now.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if signing fails.
    pub fn mint(&self, capability: Capability) -> Result<SecretString> {
        self.mint_at(capability, chrono::Utc::now().timestamp())
    }

    /// Mint a credential issued at an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns `Encoding` if signing fails.
    pub fn mint_at(&self, capability: Capability, iat: i64) -> Result<SecretString> {
        let claims =
            CredentialClaims::new(&self.config.app_id, capability, iat, self.config.validity);
        let key = EncodingKey::from_secret(self.config.secret_key.expose_secret().as_bytes());
        let token = encode(&Header::new(Algorithm::HS256), &claims, &key)
            .map_err(|e| CredentialError::Encoding(e.to_string()))?;

        tracing::debug!(
            target: "common.credential",
            jti = %claims.jti,
            capability = ?capability,
            exp = claims.exp,
            "Minted room credential"
        );

        Ok(SecretString::from(token))
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// # Errors
    ///
    /// Returns `Expired` for a lapsed credential, `Malformed` otherwise.
    pub fn inspect(&self, credential: &SecretString) -> Result<CredentialClaims> {
        let key = DecodingKey::from_secret(self.config.secret_key.expose_secret().as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<CredentialClaims>(credential.expose_secret(), &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => CredentialError::Expired,
                _ => {
                    tracing::debug!(target: "common.credential", error = %e, "Credential rejected");
                    CredentialError::Malformed
                }
            })
    }
}

/// Read the `exp` claim without verifying the signature.
///
/// Returns `None` when the credential is not a decodable token; such
/// credentials are treated as opaque.
#[must_use]
pub fn peek_expiry(credential: &SecretString) -> Option<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    decode::<CredentialClaims>(
        credential.expose_secret(),
        &DecodingKey::from_secret(&[]),
        &validation,
    )
    .ok()
    .map(|data| data.claims.exp)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn issuer() -> CredentialIssuer {
        CredentialIssuer::new(CredentialConfig {
            app_id: "app-123".to_string(),
            secret_key: SecretString::from("test-signing-key"),
            validity: DEFAULT_CREDENTIAL_TTL,
        })
        .unwrap()
    }

    #[test]
    fn test_claims_expire_after_24_hours() {
        let claims = CredentialClaims::new("app", Capability::Host, 1_000, DEFAULT_CREDENTIAL_TTL);
        assert_eq!(claims.exp - claims.iat, 86_400);
        assert!(!claims.is_expired_at(1_000 + 86_399));
        assert!(claims.is_expired_at(1_000 + 86_400));
    }

    #[test]
    fn test_attendee_cannot_subscribe() {
        let host = CredentialClaims::new("app", Capability::Host, 0, DEFAULT_CREDENTIAL_TTL);
        let attendee = CredentialClaims::new("app", Capability::Attendee, 0, DEFAULT_CREDENTIAL_TTL);
        assert!(host.can_subscribe());
        assert!(!attendee.can_subscribe());

        let json = serde_json::to_value(&attendee).unwrap();
        let member = &json["scope"]["app"]["channels"][0]["members"][0];
        assert!(member.get("subscription").is_none());
        assert_eq!(member["publication"]["actions"][0], "write");
        assert_eq!(json["scope"]["app"]["turn"], true);
    }

    #[test]
    fn test_mint_then_inspect() {
        let issuer = issuer();
        let credential = issuer.mint(Capability::Host).unwrap();
        let claims = issuer.inspect(&credential).unwrap();
        assert_eq!(claims.scope.app.id, "app-123");
        assert!(claims.can_subscribe());
    }

    #[test]
    fn test_inspect_rejects_expired() {
        let issuer = issuer();
        let issued = chrono::Utc::now().timestamp() - 2 * 86_400;
        let credential = issuer.mint_at(Capability::Attendee, issued).unwrap();
        assert_eq!(issuer.inspect(&credential), Err(CredentialError::Expired));
    }

    #[test]
    fn test_inspect_rejects_foreign_signature() {
        let other = CredentialIssuer::new(CredentialConfig {
            app_id: "app-123".to_string(),
            secret_key: SecretString::from("another-key"),
            validity: DEFAULT_CREDENTIAL_TTL,
        })
        .unwrap();
        let credential = other.mint(Capability::Host).unwrap();
        assert_eq!(issuer().inspect(&credential), Err(CredentialError::Malformed));
    }

    #[test]
    fn test_peek_expiry() {
        let credential = issuer().mint_at(Capability::Host, 5_000).unwrap();
        assert_eq!(peek_expiry(&credential), Some(5_000 + 86_400));
        assert_eq!(peek_expiry(&SecretString::from("opaque-bearer")), None);
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = CredentialIssuer::new(CredentialConfig {
            app_id: "app".to_string(),
            secret_key: SecretString::from(""),
            validity: DEFAULT_CREDENTIAL_TTL,
        });
        assert!(matches!(result, Err(CredentialError::InvalidKey)));
    }

    #[test]
    fn test_config_from_vars() {
        let vars = HashMap::from([
            ("P2P_APP_ID".to_string(), "app-9".to_string()),
            ("P2P_SECRET_KEY".to_string(), "k".to_string()),
        ]);
        let config = CredentialConfig::from_vars(&vars).unwrap();
        assert_eq!(config.app_id, "app-9");
        assert!(!format!("{config:?}").contains("\"k\""));

        let missing = CredentialConfig::from_vars(&HashMap::new());
        assert_eq!(
            missing.unwrap_err(),
            CredentialError::MissingVar("P2P_APP_ID".to_string())
        );
    }
}
