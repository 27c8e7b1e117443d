//! Shared test utilities for store testing.
//!
//! Feature-gated behind `testutil` so helpers never reach production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! tessera-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use tessera_storage::testutil::{app_id, make_signature_set, timestamp};
//! ```

use crate::{
    auth::{PrivateKeyDer, Signature, SignatureSet},
    permission::{AllowedOperation, Permission},
    types::{ApplicationId, KeyTimestamp, PermittableGroupId, UserId},
};

/// Parses an [`ApplicationId`], panicking on invalid input.
#[must_use]
pub fn app_id(id: &str) -> ApplicationId {
    ApplicationId::new(id).expect("valid application id")
}

/// Parses a [`PermittableGroupId`], panicking on invalid input.
#[must_use]
pub fn group_id(id: &str) -> PermittableGroupId {
    PermittableGroupId::new(id).expect("valid permittable group id")
}

/// Parses a [`UserId`], panicking on invalid input.
#[must_use]
pub fn user_id(id: &str) -> UserId {
    UserId::new(id).expect("valid user id")
}

/// Parses a `YYYY-MM-DDTHH_MM_SS` [`KeyTimestamp`], panicking on invalid input.
#[must_use]
pub fn timestamp(s: &str) -> KeyTimestamp {
    s.parse().expect("valid key timestamp")
}

/// Builds a signature set with placeholder key bytes and the given
/// identity-manager public key.
///
/// The key bytes do not form a usable key; use the authn crate's key
/// generator when tokens must actually be signed.
#[must_use]
pub fn make_signature_set(timestamp: KeyTimestamp, public_key: &str) -> SignatureSet {
    SignatureSet::builder()
        .timestamp(timestamp)
        .private_key(PrivateKeyDer::new(zeroize::Zeroizing::new(vec![0xAB; 48])))
        .identity_manager_signature(Signature::new(public_key))
        .build()
}

/// Builds a permission allowing `operations` on `group`.
#[must_use]
pub fn make_permission(group: &str, operations: &[AllowedOperation]) -> Permission {
    Permission::builder()
        .permittable_group_id(group_id(group))
        .allowed_operations(operations.iter().copied().collect())
        .build()
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::Conflict`](crate::StorageError::Conflict).
#[macro_export]
macro_rules! assert_conflict {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::Conflict { .. })),
            "expected StorageError::Conflict, got: {:?}",
            $result,
        );
    };
}

/// Assert that a [`StorageResult`](crate::StorageResult) is a
/// [`StorageError::NotFound`](crate::StorageError::NotFound).
#[macro_export]
macro_rules! assert_not_found {
    ($result:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::NotFound { .. })),
            "expected StorageError::NotFound, got: {:?}",
            $result,
        );
    };
}
