//! Shared stores for the tessera identity core.
//!
//! This crate owns the domain types and the persistence traits that the
//! token layer (`tessera-authn`) and the identity service
//! (`tessera-identity`) build on.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Identity Service                         │
//! │     (registry, reconciler, enablement, command gateway)     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Token Layer                              │
//! │         (key generation, issuing, verification)             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 tessera-storage                             │
//! │  SignatureSetStore │ PermissionStore │ ApplicationStore     │
//! │                    UserDirectory                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │        Memory* implementations (one lock per application)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use tessera_storage::{
//!     ApplicationId, MemoryPermissionStore, PermissionStore, PermittableGroupId, UserId,
//!     Permission,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryPermissionStore::new();
//!     let app = ApplicationId::new("office")?;
//!     let group = PermittableGroupId::new("documents")?;
//!     let user = UserId::new("alice")?;
//!
//!     store
//!         .create_permission(&app, Permission::builder().permittable_group_id(group.clone()).build())
//!         .await?;
//!     assert!(!store.get_enabled(&app, &group, &user).await?);
//!
//!     store.set_enabled(&app, &group, &user, true).await?;
//!     assert!(store.get_enabled(&app, &group, &user).await?);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! All operations return [`StorageResult<T>`]. A missing signature set is a
//! revocation signal; stores report it as `Ok(None)` from lookups and as
//! [`StorageError::NotFound`] from writes that need the set to exist.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with identifier parsers,
//!   placeholder signature sets and assertion macros. Enable this in
//!   `[dev-dependencies]` for integration tests.

#![deny(unsafe_code)]

pub mod application;
pub mod auth;
pub mod directory;
pub mod error;
pub mod permission;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

// Re-export primary types at crate root for convenience
pub use application::{ApplicationStore, MemoryApplicationStore};
pub use directory::{MemoryUserDirectory, UserDirectory};
pub use error::{BoxError, ConfigError, StorageError, StorageResult};
pub use permission::{
    AllowedOperation, MemoryPermissionStore, Permission, PermissionStore, permission_resource,
};
pub use types::{
    ApplicationId, KEY_TIMESTAMP_FORMAT, KeyTimestamp, MAX_IDENTIFIER_LEN, PermittableGroupId,
    UserId,
};
pub use zeroize::Zeroizing;
