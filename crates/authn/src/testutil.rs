//! Shared test utilities for token testing.
//!
//! Helpers for building signature sets with real Ed25519 keys, signing
//! tokens under them, and crafting raw JWT strings for attack testing. It is
//! feature-gated behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tessera-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use tessera_authn::testutil::{signature_set_at, token_for};
//! ```

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use tessera_storage::{ApplicationId, UserId, auth::SignatureSet};

use crate::{
    keys::KeyMaterial,
    token::{TokenClaims, issue_token},
};

/// Audience used by [`token_for`].
pub const TEST_AUDIENCE: &str = "tessera-test";

/// Builds a signature set at `timestamp` with a freshly generated key.
///
/// # Panics
///
/// Panics if `timestamp` is not a key timestamp or key generation fails.
pub fn signature_set_at(timestamp: &str) -> SignatureSet {
    let material = KeyMaterial::generate().expect("key generation");
    SignatureSet::builder()
        .timestamp(timestamp.parse().expect("valid key timestamp"))
        .private_key(material.private_key)
        .identity_manager_signature(material.signature)
        .build()
}

/// Claims for `user` issued by `application`, valid for one hour.
///
/// # Panics
///
/// Panics if either identifier is invalid.
pub fn claims_for(application: &str, user: &str) -> TokenClaims {
    TokenClaims::new(
        &ApplicationId::new(application).expect("valid application id"),
        &UserId::new(user).expect("valid user id"),
        TEST_AUDIENCE,
        Utc::now(),
        Duration::from_secs(3600),
    )
}

/// Signs a one-hour token for `user` under `set`.
///
/// # Panics
///
/// Panics if signing fails.
pub fn token_for(set: &SignatureSet, application: &str, user: &str) -> String {
    issue_token(set, &claims_for(application, user)).expect("Failed to encode test JWT")
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The result is `{header_b64}.{payload_b64}.` with an empty signature, for
/// testing rejection of malformed or attack JWTs (`alg: "none"`, algorithm
/// confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given
/// [`AuthError`] variant.
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use tessera_authn::assert_auth_error;
/// use tessera_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::token_expired());
/// assert_auth_error!(result, TokenExpired);
/// ```
///
/// [`AuthError`]: crate::error::AuthError
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::token::decode_token_header;

    #[test]
    fn test_token_for_carries_kid() {
        let set = signature_set_at("2024-01-15T10_30_00");
        let token = token_for(&set, "office", "alice");
        let header = decode_token_header(&token).expect("header");
        assert_eq!(header.kid.as_deref(), Some("2024-01-15T10_30_00"));
    }

    #[test]
    fn test_craft_raw_jwt_format() {
        let jwt = craft_raw_jwt(&json!({"alg": "none", "typ": "JWT"}), &json!({"sub": "test"}));
        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[2].is_empty(), "signature should be empty for raw JWTs");
    }

    #[test]
    fn test_assert_auth_error_variants() {
        use crate::error::AuthError;
        let result: Result<(), AuthError> = Err(AuthError::token_expired());
        assert_auth_error!(result, TokenExpired);
        assert_auth_error!(result, TokenExpired, "token should be expired");

        let result: Result<(), AuthError> = Err(AuthError::signature_set_not_found("a", "t"));
        assert_auth_error!(result, SignatureSetNotFound);
    }
}
