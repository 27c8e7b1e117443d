//! Signature-set types and storage for token signing and verification.
//!
//! A signature set is a timestamped Ed25519 key pair owned by one
//! application. The identity manager writes sets here when rotating keys;
//! the token verifier reads them back to decide whether a token's key is
//! still trusted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐       ┌──────────────────┐       ┌─────────────┐
//! │  Registry   │       │ SignatureSetStore│       │  Verifier   │
//! │             │──────►│  (per-app shard, │◄──────│             │
//! │ rotates keys│       │  source of truth)│       │ checks kid  │
//! └─────────────┘       └──────────────────┘       └─────────────┘
//! ```
//!
//! # Revocation
//!
//! Deleting a set is the revocation lever. Once
//! [`SignatureSetStore::delete_signature_set`] returns, lookups for that
//! timestamp return `None` and the timestamp is never issued again for the
//! same application.
//!
//! # Examples
//!
//! ```no_run
//! use tessera_storage::{ApplicationId, KeyTimestamp, Zeroizing};
//! use tessera_storage::auth::{
//!     MemorySignatureSetStore, PrivateKeyDer, Signature, SignatureSet, SignatureSetStore,
//! };
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = MemorySignatureSetStore::new();
//! let app = ApplicationId::new("office").unwrap();
//! let ts = KeyTimestamp::now();
//!
//! let set = SignatureSet::builder()
//!     .timestamp(ts)
//!     .private_key(PrivateKeyDer::new(Zeroizing::new(vec![0; 48])))
//!     .identity_manager_signature(Signature::new("MCowBQYDK2VwAyEA"))
//!     .build();
//! store.create_signature_set(&app, set).await.unwrap();
//!
//! store.delete_signature_set(&app, ts).await.unwrap();
//! assert!(store.get_signature_set(&app, ts).await.unwrap().is_none());
//! # });
//! ```

pub mod audit;
pub mod audited_store;
mod metrics;
mod signature_set;
mod store;

pub use metrics::{LatencyPercentiles, RegistryErrorKind, RegistryMetrics, RegistryMetricsSnapshot};
pub use signature_set::{PrivateKeyDer, Signature, SignatureSet, SignatureSetView};
pub use store::{MemorySignatureSetStore, SignatureSetStore};
