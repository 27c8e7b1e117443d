//! # Tessera Authentication
//!
//! Key material and access tokens for the Tessera identity manager.
//!
//! This crate provides:
//! - **Key generation**: Ed25519 key pairs behind signature sets
//! - **Tokens**: EdDSA JWTs whose `kid` names the signing signature set
//! - **Verification**: existence check against live signature sets, then
//!   cryptographic checks, then per-user enablement
//! - **Algorithm validation**: security checks for JWT algorithms
//!
//! ## Features
//!
//! - Only EdDSA is accepted; `none` and symmetric algorithms are rejected
//! - Deleting a signature set revokes every token issued under it on the
//!   next verification
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera_authn::{DEFAULT_DECODING_KEY_CACHE_CAPACITY, TokenVerifier};
//! use tessera_storage::{MemoryPermissionStore, auth::MemorySignatureSetStore};
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = TokenVerifier::new(
//!     Arc::new(MemorySignatureSetStore::new()),
//!     Arc::new(MemoryPermissionStore::new()),
//!     DEFAULT_DECODING_KEY_CACHE_CAPACITY,
//! );
//!
//! let verified = verifier.verify(token).await?;
//! println!("{} signed in via {}", verified.user, verified.application);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Authentication error types.
pub mod error;
/// Ed25519 key material.
pub mod keys;
/// Shared test utilities (requires `testutil` feature or `cfg(test)`).
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod token;
/// Algorithm and `kid` validation.
pub mod validation;
pub mod verifier;

pub use error::{AuthError, Result};
pub use keys::{KeyMaterial, signature_of};
pub use token::{TokenClaims, issue_token};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
pub use verifier::{DEFAULT_DECODING_KEY_CACHE_CAPACITY, TokenVerifier, VerifiedToken};
