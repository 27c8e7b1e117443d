//! Authentication error types.
//!
//! This module defines errors that can occur while generating key material,
//! issuing tokens and verifying them against live signature sets.

use tessera_storage::StorageError;
use thiserror::Error;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Malformed token that cannot be decoded.
    #[error("Invalid token format: {message}")]
    InvalidTokenFormat {
        /// What was wrong with the token.
        message: String,
    },

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Audience does not match the expected value.
    #[error("Invalid audience: {message}")]
    InvalidAudience {
        /// Expected versus actual audience.
        message: String,
    },

    /// Required claim is missing or empty.
    #[error("Missing claim: {claim}")]
    MissingClaim {
        /// Name of the claim.
        claim: String,
    },

    /// Token is scoped to a different permittable group.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Requested versus granted group.
        message: String,
    },

    /// Algorithm not in the accepted list.
    #[error("Unsupported algorithm: {message}")]
    UnsupportedAlgorithm {
        /// Why the algorithm was rejected.
        message: String,
    },

    /// The signature set named by the token does not exist.
    ///
    /// Either it never existed or it was deleted, which revokes every token
    /// issued under it.
    #[error("Signature set not found: app:{application}/ts:{timestamp}")]
    SignatureSetNotFound {
        /// Application that signed the token.
        application: String,
        /// Key timestamp from the token's `kid` header.
        timestamp: String,
    },

    /// The user's enablement flag for the permission is off.
    #[error("Permission disabled: app:{application}/perm:{group} for user {user}")]
    PermissionDisabled {
        /// Application owning the permission.
        application: String,
        /// Permittable group identifier.
        group: String,
        /// User named by the token.
        user: String,
    },

    /// Stored public key is not a valid Ed25519 key.
    #[error("Invalid public key: {message}")]
    InvalidPublicKey {
        /// Decoding failure detail.
        message: String,
    },

    /// The entropy source failed; no key can be produced.
    #[error("Key generation failed: {message}")]
    KeyGeneration {
        /// Failure detail from the entropy source or encoder.
        message: String,
    },

    /// Storage error during signature-set or enablement lookup.
    ///
    /// Wraps the original [`StorageError`] to preserve the source chain.
    #[error("Key storage error: {0}")]
    KeyStorageError(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),
}

impl AuthError {
    /// Creates an [`AuthError::InvalidTokenFormat`].
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat { message: message.into() }
    }

    /// Creates an [`AuthError::TokenExpired`].
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates an [`AuthError::InvalidSignature`].
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates an [`AuthError::InvalidAudience`].
    #[must_use]
    pub fn invalid_audience(message: impl Into<String>) -> Self {
        Self::InvalidAudience { message: message.into() }
    }

    /// Creates an [`AuthError::MissingClaim`].
    #[must_use]
    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim { claim: claim.into() }
    }

    /// Creates an [`AuthError::InvalidScope`].
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope { message: message.into() }
    }

    /// Creates an [`AuthError::UnsupportedAlgorithm`].
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm { message: message.into() }
    }

    /// Creates an [`AuthError::SignatureSetNotFound`].
    #[must_use]
    pub fn signature_set_not_found(
        application: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self::SignatureSetNotFound { application: application.into(), timestamp: timestamp.into() }
    }

    /// Creates an [`AuthError::PermissionDisabled`].
    #[must_use]
    pub fn permission_disabled(
        application: impl Into<String>,
        group: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self::PermissionDisabled {
            application: application.into(),
            group: group.into(),
            user: user.into(),
        }
    }

    /// Creates an [`AuthError::InvalidPublicKey`].
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey { message: message.into() }
    }

    /// Creates an [`AuthError::KeyGeneration`].
    #[must_use]
    pub fn key_generation(message: impl Into<String>) -> Self {
        Self::KeyGeneration { message: message.into() }
    }

    /// Creates an [`AuthError::KeyStorageError`].
    #[must_use]
    pub fn key_storage_error(err: StorageError) -> Self {
        Self::KeyStorageError(err)
    }

    /// Whether the error means the token's signing key is no longer trusted.
    #[must_use]
    pub fn is_revoked_key(&self) -> bool {
        matches!(self, Self::SignatureSetNotFound { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => Self::invalid_token_format("Invalid JWT structure"),
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidAudience => Self::invalid_audience("Audience validation failed"),
            ErrorKind::InvalidAlgorithm => Self::unsupported_algorithm("Algorithm not supported"),
            ErrorKind::InvalidKeyFormat => Self::invalid_public_key(err.to_string()),
            _ => Self::invalid_token_format(format!("JWT error: {err}")),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::KeyStorageError(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;
