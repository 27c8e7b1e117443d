//! # Tessera Identity
//!
//! The identity-management core of a multi-tenant identity provider.
//!
//! This crate provides:
//! - **Signature-set rotation**: per-application Ed25519 key pairs stamped
//!   with a unique, strictly increasing [`KeyTimestamp`](tessera_storage::KeyTimestamp)
//! - **Signature reconciliation**: the signature an application declares for
//!   a set, next to the one the identity manager computed
//! - **Permission enablement**: a per-user flag for each permission of each
//!   application
//! - **Tokens**: login tokens signed with the identity application's newest
//!   set, verified against the live sets
//! - **Commands**: an asynchronous gateway that acknowledges mutations
//!   immediately and applies them in order per application, with different
//!   applications processed concurrently
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera_identity::{Command, CommandGateway, IdentityConfig, IdentityService};
//! use tessera_storage::{ApplicationId, MemoryUserDirectory};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(
//!     IdentityService::builder()
//!         .config(IdentityConfig::builder().identity_application("identity-v1").build())
//!         .users(Arc::new(MemoryUserDirectory::new()))
//!         .build()?,
//! );
//! service.bootstrap().await?;
//!
//! let office = ApplicationId::new("office")?;
//! service.register_application(&office).await?;
//!
//! let gateway = CommandGateway::spawn(Arc::clone(&service));
//! let receipt = gateway.submit(Command::CreateSignatureSet { application: office }).await?;
//! println!("accepted {}", receipt.id());
//! receipt.outcome().await?;
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod enablement;
/// Identity error types.
pub mod error;
pub mod reconciler;
pub mod registry;
pub mod service;

pub use command::{Command, CommandGateway, CommandId, CommandOutcome, CommandReceipt};
pub use config::{
    DEFAULT_COLLISION_RETRIES, DEFAULT_COMMAND_QUEUE_CAPACITY, DEFAULT_TOKEN_AUDIENCE,
    DEFAULT_TOKEN_TTL, IdentityConfig,
};
pub use enablement::EnablementRegistry;
pub use error::{ErrorKind, IdentityError, Result};
pub use reconciler::{SignatureReconciler, signatures_match};
pub use registry::SignatureSetRegistry;
pub use service::{AUDIT_ACTOR, IdentityService};
