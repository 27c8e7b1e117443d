//! Identity service errors.
//!
//! Every failure the registries, the reconciler and the command gateway
//! report is an [`IdentityError`]. [`IdentityError::kind`] folds them into
//! the four [`ErrorKind`]s a transport layer maps to responses.

use tessera_authn::AuthError;
use tessera_storage::{ConfigError, StorageError};
use thiserror::Error;

/// Coarse classification of an [`IdentityError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced application, signature set, permission or user does not
    /// exist. Also covers revoked signature sets.
    NotFound,
    /// A signature-set timestamp collided. Retryable after a short delay.
    Conflict,
    /// Malformed input or a rejected token. Nothing was written.
    ValidationFailure,
    /// Key generation or the command pipeline failed; not retried.
    Fatal,
}

/// Identity service errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IdentityError {
    /// A referenced entity does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        /// Resource identifier, e.g. `app:office/perm:documents`.
        resource: String,
    },

    /// Signature-set creation could not obtain a fresh timestamp.
    #[error("Conflict: {message}")]
    Conflict {
        /// What collided.
        message: String,
    },

    /// Malformed request input, rejected before any state was touched.
    #[error("Validation failed for {field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// Unrecoverable failure.
    #[error("Fatal: {message}")]
    Fatal {
        /// What failed.
        message: String,
    },

    /// Token or key-material failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl IdentityError {
    /// Creates an [`IdentityError::NotFound`].
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Creates an [`IdentityError::Conflict`].
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Creates an [`IdentityError::Validation`] for the named field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field, message: message.into() }
    }

    /// Creates an [`IdentityError::Fatal`].
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal { message: message.into() }
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Validation { .. } => ErrorKind::ValidationFailure,
            Self::Fatal { .. } => ErrorKind::Fatal,
            Self::Storage(err) => storage_kind(err),
            Self::Auth(err) => auth_kind(err),
            Self::Config(_) => ErrorKind::ValidationFailure,
        }
    }

    /// Whether the error is a not-found condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Whether the caller may retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::NotFound { .. } => ErrorKind::NotFound,
        StorageError::Conflict { .. } => ErrorKind::Conflict,
        StorageError::Validation { .. } => ErrorKind::ValidationFailure,
        _ => ErrorKind::Fatal,
    }
}

fn auth_kind(err: &AuthError) -> ErrorKind {
    match err {
        AuthError::SignatureSetNotFound { .. } => ErrorKind::NotFound,
        AuthError::KeyGeneration { .. } => ErrorKind::Fatal,
        AuthError::KeyStorageError(inner) => storage_kind(inner),
        _ => ErrorKind::ValidationFailure,
    }
}

/// Result type alias for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let cases = [
            (IdentityError::not_found("app:a"), ErrorKind::NotFound),
            (IdentityError::conflict("ts"), ErrorKind::Conflict),
            (IdentityError::validation("signature", "empty"), ErrorKind::ValidationFailure),
            (IdentityError::fatal("rng"), ErrorKind::Fatal),
            (StorageError::not_found("app:a/ts:t").into(), ErrorKind::NotFound),
            (StorageError::conflict("ts").into(), ErrorKind::Conflict),
            (StorageError::validation("id", "empty").into(), ErrorKind::ValidationFailure),
            (StorageError::internal("boom").into(), ErrorKind::Fatal),
            (AuthError::signature_set_not_found("a", "t").into(), ErrorKind::NotFound),
            (AuthError::key_generation("rng").into(), ErrorKind::Fatal),
            (AuthError::invalid_signature().into(), ErrorKind::ValidationFailure),
            (
                AuthError::key_storage_error(StorageError::not_found("perm")).into(),
                ErrorKind::NotFound,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.kind(), expected, "{err}");
        }
    }

    #[test]
    fn test_storage_not_found_is_propagated_unchanged() {
        let err: IdentityError = StorageError::not_found("app:office/ts:2024-01-15T10_30_00").into();
        assert_eq!(err.to_string(), "Not found: app:office/ts:2024-01-15T10_30_00");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_conflict_is_retryable() {
        assert!(IdentityError::conflict("x").is_retryable());
        let err: IdentityError = StorageError::conflict("x").into();
        assert!(err.is_retryable());
    }
}
