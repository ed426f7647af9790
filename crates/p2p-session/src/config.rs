//! Session controller configuration.
//!
//! Configuration is loaded from environment variables. The room credential
//! is never part of the configuration; it is passed per join.

use crate::session::Role;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default bound on every external call, in milliseconds.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 10_000;

/// Default actor mailbox capacity.
pub const DEFAULT_MAILBOX_BUFFER: usize = 64;

/// Session controller configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed role; also the declared member name.
    pub role: Role,

    /// Bound on each join/publish/subscribe/leave/dispose/capture call.
    pub operation_timeout: Duration,

    /// Capacity of the actor's request mailbox.
    pub mailbox_buffer: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl SessionConfig {
    /// Defaults for `role`.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self {
            role,
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            mailbox_buffer: DEFAULT_MAILBOX_BUFFER,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let role = vars
            .get("P2P_ROLE")
            .ok_or_else(|| ConfigError::MissingEnvVar("P2P_ROLE".to_string()))?
            .parse::<Role>()
            .map_err(ConfigError::InvalidValue)?;

        let operation_timeout_ms = match vars.get("P2P_OPERATION_TIMEOUT_MS") {
            Some(raw) => parse_positive(raw, "P2P_OPERATION_TIMEOUT_MS")?,
            None => DEFAULT_OPERATION_TIMEOUT_MS,
        };

        let mailbox_buffer = match vars.get("P2P_MAILBOX_BUFFER") {
            Some(raw) => {
                let value = parse_positive(raw, "P2P_MAILBOX_BUFFER")?;
                usize::try_from(value).map_err(|_| {
                    ConfigError::InvalidValue(format!("P2P_MAILBOX_BUFFER out of range: {raw}"))
                })?
            }
            None => DEFAULT_MAILBOX_BUFFER,
        };

        Ok(SessionConfig {
            role,
            operation_timeout: Duration::from_millis(operation_timeout_ms),
            mailbox_buffer,
        })
    }
}

fn parse_positive(raw: &str, name: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue(format!("{name} must be > 0"))),
        Ok(value) => Ok(value),
        Err(e) => Err(ConfigError::InvalidValue(format!("{name}: {e}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars(role: &str) -> HashMap<String, String> {
        HashMap::from([("P2P_ROLE".to_string(), role.to_string())])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = SessionConfig::from_vars(&base_vars("guest"))
            .expect("Config should load successfully");

        assert_eq!(config.role, Role::Guest);
        assert_eq!(
            config.operation_timeout,
            Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS)
        );
        assert_eq!(config.mailbox_buffer, DEFAULT_MAILBOX_BUFFER);
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars("host");
        vars.insert("P2P_OPERATION_TIMEOUT_MS".to_string(), "2500".to_string());
        vars.insert("P2P_MAILBOX_BUFFER".to_string(), "8".to_string());

        let config = SessionConfig::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.role, Role::Host);
        assert_eq!(config.operation_timeout, Duration::from_millis(2500));
        assert_eq!(config.mailbox_buffer, 8);
    }

    #[test]
    fn test_missing_role() {
        let result = SessionConfig::from_vars(&HashMap::new());
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "P2P_ROLE"));
    }

    #[test]
    fn test_invalid_role() {
        let result = SessionConfig::from_vars(&base_vars("moderator"));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_zero_and_garbage_values_rejected() {
        let mut vars = base_vars("host");
        vars.insert("P2P_OPERATION_TIMEOUT_MS".to_string(), "0".to_string());
        assert!(matches!(
            SessionConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));

        let mut vars = base_vars("host");
        vars.insert("P2P_MAILBOX_BUFFER".to_string(), "lots".to_string());
        assert!(matches!(
            SessionConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_new_uses_defaults() {
        let config = SessionConfig::new(Role::Host);
        assert_eq!(config.mailbox_buffer, DEFAULT_MAILBOX_BUFFER);
        assert_eq!(config.operation_timeout, Duration::from_secs(10));
    }
}
