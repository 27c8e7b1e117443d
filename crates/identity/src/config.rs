//! Identity service configuration.
//!
//! [`IdentityConfig`] deserializes from any serde format; durations use
//! humantime strings (`"1h"`, `"15m"`).
//!
//! ```
//! use std::time::Duration;
//! use tessera_identity::IdentityConfig;
//!
//! let config = IdentityConfig::builder()
//!     .identity_application("identity-v1")
//!     .token_ttl(Duration::from_secs(900))
//!     .build();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.collision_retries, 3);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_authn::DEFAULT_DECODING_KEY_CACHE_CAPACITY;
use tessera_storage::{ApplicationId, ConfigError};

/// Default token lifetime (1 hour).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3_600);

/// Default token audience.
pub const DEFAULT_TOKEN_AUDIENCE: &str = "tessera";

/// Default number of re-stamping attempts after a timestamp collision.
pub const DEFAULT_COLLISION_RETRIES: u32 = 3;

/// Default bound of the command queue.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 1_024;

/// Configuration for [`IdentityService`](crate::IdentityService).
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// The identity manager's own application identifier. Its signature sets
    /// sign login tokens, and it is the `iss` of those tokens.
    #[builder(into)]
    pub identity_application: String,

    /// Audience of issued tokens, enforced on verification.
    #[serde(default = "default_token_audience")]
    #[builder(into, default = default_token_audience())]
    pub token_audience: String,

    /// Lifetime of issued tokens.
    #[serde(with = "humantime_serde", default = "default_token_ttl")]
    #[builder(default = default_token_ttl())]
    pub token_ttl: Duration,

    /// How often signature-set creation waits for the next second and
    /// re-stamps after a timestamp collision.
    #[serde(default = "default_collision_retries")]
    #[builder(default = default_collision_retries())]
    pub collision_retries: u32,

    /// Bound on commands accepted but not yet processed; submitters wait
    /// while it is reached.
    #[serde(default = "default_command_queue_capacity")]
    #[builder(default = default_command_queue_capacity())]
    pub command_queue_capacity: usize,

    /// Maximum number of memoized token decoding keys.
    #[serde(default = "default_decoding_key_cache_capacity")]
    #[builder(default = default_decoding_key_cache_capacity())]
    pub decoding_key_cache_capacity: u64,
}

fn default_token_audience() -> String {
    DEFAULT_TOKEN_AUDIENCE.to_owned()
}

fn default_token_ttl() -> Duration {
    DEFAULT_TOKEN_TTL
}

fn default_collision_retries() -> u32 {
    DEFAULT_COLLISION_RETRIES
}

fn default_command_queue_capacity() -> usize {
    DEFAULT_COMMAND_QUEUE_CAPACITY
}

fn default_decoding_key_cache_capacity() -> u64 {
    DEFAULT_DECODING_KEY_CACHE_CAPACITY
}

impl IdentityConfig {
    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a malformed application id or an
    /// empty audience or an oversized command queue, and
    /// [`ConfigError::BelowMinimum`] for a zero TTL or zero capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.identity_application_id()?;

        if self.token_audience.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "token_audience",
                reason: "must not be empty".to_owned(),
            });
        }
        if self.token_ttl < Duration::from_secs(1) {
            return Err(ConfigError::BelowMinimum {
                field: "token_ttl",
                min: "1s".to_owned(),
                value: format!("{:?}", self.token_ttl),
            });
        }
        if self.command_queue_capacity == 0 {
            return Err(below_minimum("command_queue_capacity", 1, 0));
        }
        if self.command_queue_capacity > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid {
                field: "command_queue_capacity",
                reason: format!("must not exceed {}", tokio::sync::Semaphore::MAX_PERMITS),
            });
        }
        if self.decoding_key_cache_capacity == 0 {
            return Err(below_minimum("decoding_key_cache_capacity", 1, 0));
        }
        Ok(())
    }

    /// The identity manager's application id.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `identity_application` is not a
    /// valid identifier.
    pub fn identity_application_id(&self) -> Result<ApplicationId, ConfigError> {
        ApplicationId::new(self.identity_application.as_str()).map_err(|e| ConfigError::Invalid {
            field: "identity_application",
            reason: e.to_string(),
        })
    }
}

fn below_minimum(field: &'static str, min: u64, value: u64) -> ConfigError {
    ConfigError::BelowMinimum { field, min: min.to_string(), value: value.to_string() }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base() -> IdentityConfig {
        IdentityConfig::builder().identity_application("identity-v1").build()
    }

    #[test]
    fn test_builder_defaults() {
        let config = base();
        assert_eq!(config.token_audience, DEFAULT_TOKEN_AUDIENCE);
        assert_eq!(config.token_ttl, DEFAULT_TOKEN_TTL);
        assert_eq!(config.collision_retries, DEFAULT_COLLISION_RETRIES);
        assert_eq!(config.command_queue_capacity, DEFAULT_COMMAND_QUEUE_CAPACITY);
        assert_eq!(config.decoding_key_cache_capacity, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_with_humantime() {
        let config: IdentityConfig = serde_json::from_str(
            r#"{"identity_application": "identity-v1", "token_ttl": "15m", "collision_retries": 0}"#,
        )
        .unwrap();
        assert_eq!(config.token_ttl, Duration::from_secs(900));
        assert_eq!(config.collision_retries, 0);
        assert_eq!(config.command_queue_capacity, DEFAULT_COMMAND_QUEUE_CAPACITY);
    }

    #[test]
    fn test_deserialize_rejects_unknown_fields() {
        let result: Result<IdentityConfig, _> =
            serde_json::from_str(r#"{"identity_application": "a", "token_issuer": "x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_identifier() {
        let config = IdentityConfig::builder().identity_application("not valid!").build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "identity_application", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = IdentityConfig { token_ttl: Duration::ZERO, ..base() };
        assert!(matches!(config.validate(), Err(ConfigError::BelowMinimum { field: "token_ttl", .. })));

        let config = IdentityConfig { command_queue_capacity: 0, ..base() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BelowMinimum { field: "command_queue_capacity", .. })
        ));

        let config = IdentityConfig { decoding_key_cache_capacity: 0, ..base() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BelowMinimum { field: "decoding_key_cache_capacity", .. })
        ));

        let config = IdentityConfig { token_audience: " ".to_owned(), ..base() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field: "token_audience", .. })));
    }

    #[test]
    fn test_validate_rejects_oversized_command_queue() {
        let config = IdentityConfig { command_queue_capacity: usize::MAX, ..base() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "command_queue_capacity", .. })
        ));
    }
}
