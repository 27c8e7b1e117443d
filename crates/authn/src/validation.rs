//! Token header validation.
//!
//! Checks that run before any store lookup: the signing algorithm must be
//! one we implement end-to-end, and the `kid` must be a well-formed key
//! timestamp.
//!
//! # Security
//!
//! - `none` and symmetric algorithms are always rejected, so a public key
//!   can never be abused as an HMAC secret.
//! - A malformed `kid` is rejected without touching the signature-set store.

use tessera_storage::{KeyTimestamp, StorageError};

use crate::error::AuthError;

/// Algorithms that are never accepted.
///
/// - `none`: no signature at all
/// - `HS256`, `HS384`, `HS512`: symmetric, verifier would need the secret
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted algorithms.
///
/// Signature sets hold Ed25519 keys only, so only EdDSA verifies end-to-end.
/// Validators must reject algorithms they do not fully implement
/// (RFC 8725 Section 3.1).
pub const ACCEPTED_ALGORITHMS: &[&str] = &["EdDSA"];

/// Longest `kid` inspected before rejecting outright.
pub const MAX_KID_LEN: usize = 64;

/// Validates a token algorithm against the accepted list.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if the algorithm is forbidden
/// or not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use tessera_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("EdDSA").is_ok());
/// assert!(validate_algorithm("RS256").is_err());
/// assert!(validate_algorithm("HS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list (only EdDSA is supported)"
        )));
    }

    Ok(())
}

/// Parses a `kid` header into the key timestamp it names.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the `kid` is empty, too long
/// or not a `YYYY-MM-DDTHH_MM_SS` timestamp.
///
/// # Examples
///
/// ```
/// use tessera_authn::validation::parse_kid;
///
/// let ts = parse_kid("2024-01-15T10_30_00").unwrap();
/// assert_eq!(ts.to_string(), "2024-01-15T10_30_00");
/// assert!(parse_kid("../../etc/passwd").is_err());
/// ```
pub fn parse_kid(kid: &str) -> Result<KeyTimestamp, AuthError> {
    if kid.is_empty() {
        return Err(AuthError::invalid_token_format("JWT header 'kid' is empty"));
    }
    if kid.len() > MAX_KID_LEN {
        return Err(AuthError::invalid_token_format(format!(
            "JWT header 'kid' exceeds {MAX_KID_LEN} bytes"
        )));
    }
    kid.parse().map_err(|e: StorageError| {
        AuthError::invalid_token_format(format!("JWT header 'kid' is not a key timestamp: {e}"))
    })
}
