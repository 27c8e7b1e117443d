//! Storage error types and result alias.
//!
//! Every store in this crate maps its failures onto [`StorageError`]. The
//! variants line up with the error kinds callers act on:
//!
//! - [`StorageError::NotFound`] - a referenced application, signature set,
//!   permission or user does not exist. Absence of a signature set is the
//!   revocation signal, so this variant is never swallowed.
//! - [`StorageError::Conflict`] - a write lost a race (e.g. a signature-set
//!   timestamp that does not advance past the application's high-water mark).
//!   Retryable.
//! - [`StorageError::Validation`] - malformed input rejected before any state
//!   was touched.
//! - [`StorageError::Internal`] - anything else.
//!
//! # Example
//!
//! ```
//! use tessera_storage::{StorageError, StorageResult};
//!
//! fn lookup(resource: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(resource))
//! }
//!
//! assert!(lookup("app:billing").unwrap_err().is_not_found());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The requested resource does not exist.
    #[error("Not found: {resource}")]
    NotFound {
        /// Resource identifier, e.g. `app:billing/ts:2024-01-15T10_30_00`.
        resource: String,
    },

    /// A concurrent or stale write was rejected.
    ///
    /// Retrying after a short delay is expected to succeed.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflicting state.
        message: String,
    },

    /// Input failed validation before reaching the store.
    #[error("Validation failed for {field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// Internal storage error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    /// Creates a new `NotFound` error for the given resource.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }

    /// Creates a new `Validation` error for the named field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { field, message: message.into() }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` for [`StorageError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`StorageError::Conflict`].
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric or duration field is below its minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the field.
        field: &'static str,
        /// Minimum accepted value.
        min: String,
        /// The rejected value.
        value: String,
    },

    /// A field holds a value that cannot be used.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::not_found("app:a").to_string(), "Not found: app:a");
        assert_eq!(
            StorageError::conflict("timestamp taken").to_string(),
            "Conflict: timestamp taken"
        );
        assert_eq!(
            StorageError::validation("timestamp", "bad shape").to_string(),
            "Validation failed for timestamp: bad shape"
        );
        assert_eq!(StorageError::internal("boom").to_string(), "Internal error: boom");
    }

    #[test]
    fn test_predicates() {
        assert!(StorageError::not_found("x").is_not_found());
        assert!(!StorageError::not_found("x").is_conflict());
        assert!(StorageError::conflict("x").is_conflict());
    }

    #[test]
    fn test_internal_preserves_source_chain() {
        let inner = std::io::Error::other("disk gone");
        let err = StorageError::internal_with_source("write failed", inner);
        let source = err.source().expect("source exists");
        assert_eq!(source.to_string(), "disk gone");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::BelowMinimum { field: "token_ttl", min: "1s".into(), value: "0s".into() };
        assert_eq!(err.to_string(), "token_ttl must be at least 1s, got 0s");
    }
}
