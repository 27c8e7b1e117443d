//! Storage trait for signature-set lifecycle operations.
//!
//! [`SignatureSetStore`] abstracts persistence of signature sets so the
//! registry, the audit decorator and the token verifier share one interface.
//! [`MemorySignatureSetStore`] is the in-process implementation.
//!
//! # Lifecycle
//!
//! ```text
//! ┌─────────────┐  set_application_signature  ┌─────────────┐
//! │   Created   │────────────────────────────►│  Declared   │
//! │ (app sig    │                             │ (app sig    │
//! │   unset)    │                             │    set)     │
//! └──────┬──────┘                             └──────┬──────┘
//!        │            delete_signature_set           │
//!        └───────────────────┬───────────────────────┘
//!                            ▼
//!                     ┌─────────────┐
//!                     │   Deleted   │
//!                     │ (permanent, │
//!                     │  timestamp  │
//!                     │  retired)   │
//!                     └─────────────┘
//! ```
//!
//! Purging an application closes it: the store refuses new sets for it until
//! [`reopen_application`](SignatureSetStore::reopen_application) is called.
//!
//! # Usage
//!
//! ```no_run
//! use tessera_storage::{ApplicationId, StorageResult, KeyTimestamp};
//! use tessera_storage::auth::SignatureSetStore;
//!
//! async fn live<S: SignatureSetStore>(
//!     store: &S,
//!     app: &ApplicationId,
//! ) -> StorageResult<Vec<KeyTimestamp>> {
//!     store.list_signature_sets(app).await
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{
    auth::{
        audit::{application_resource, signature_set_resource},
        signature_set::{Signature, SignatureSet},
    },
    error::{StorageError, StorageResult},
    types::{ApplicationId, KeyTimestamp},
};

/// Persistence layer for signature sets, scoped per application.
///
/// # Consistency
///
/// Implementations must make every successful mutation visible to all
/// subsequent reads from any caller. Signature sets are a security
/// boundary: a `get` issued after `delete_signature_set` returned must not
/// observe the deleted set.
///
/// # Timestamp Uniqueness
///
/// Each application has a high-water mark, the greatest timestamp ever
/// stored for it. [`create_signature_set`](Self::create_signature_set)
/// accepts a set only if its timestamp is strictly greater, so timestamps
/// never collide and a deleted timestamp is never reissued.
#[async_trait]
pub trait SignatureSetStore: Send + Sync {
    /// Stores a new signature set.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Conflict`] if the timestamp does not advance
    /// past the application's high-water mark. The existing set is left
    /// untouched.
    ///
    /// Returns [`StorageError::NotFound`] if the application was purged and
    /// has not been reopened.
    async fn create_signature_set(
        &self,
        application: &ApplicationId,
        set: SignatureSet,
    ) -> StorageResult<()>;

    /// Lists the timestamps of all live signature sets, ascending.
    ///
    /// An application without signature sets yields an empty list.
    async fn list_signature_sets(
        &self,
        application: &ApplicationId,
    ) -> StorageResult<Vec<KeyTimestamp>>;

    /// Retrieves a live signature set.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(set))` if the set is live
    /// - `Ok(None)` if it never existed or was deleted
    async fn get_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> StorageResult<Option<SignatureSet>>;

    /// Retrieves the newest live signature set, if any.
    async fn latest_signature_set(
        &self,
        application: &ApplicationId,
    ) -> StorageResult<Option<SignatureSet>>;

    /// Records the signature the application declares for a set.
    ///
    /// Overwrites any earlier declaration. The identity-manager signature is
    /// not recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the set is not live.
    async fn set_application_signature(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
        signature: Signature,
    ) -> StorageResult<()>;

    /// Deletes a signature set.
    ///
    /// Idempotent: deleting a set that is not live succeeds and returns
    /// `false`. Returns `true` when a live set was removed.
    async fn delete_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> StorageResult<bool>;

    /// Deletes every signature set of an application, returning how many
    /// were removed. The high-water mark is retained.
    ///
    /// The application is closed atomically with the purge: a create racing
    /// with it either lands before and is removed, or fails with
    /// [`StorageError::NotFound`].
    async fn purge_application(&self, application: &ApplicationId) -> StorageResult<usize>;

    /// Accepts new sets for a purged application again. A no-op for an
    /// application that is open.
    async fn reopen_application(&self, application: &ApplicationId) -> StorageResult<()>;
}

#[async_trait]
impl<S: SignatureSetStore + ?Sized> SignatureSetStore for Arc<S> {
    async fn create_signature_set(
        &self,
        application: &ApplicationId,
        set: SignatureSet,
    ) -> StorageResult<()> {
        (**self).create_signature_set(application, set).await
    }

    async fn list_signature_sets(
        &self,
        application: &ApplicationId,
    ) -> StorageResult<Vec<KeyTimestamp>> {
        (**self).list_signature_sets(application).await
    }

    async fn get_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> StorageResult<Option<SignatureSet>> {
        (**self).get_signature_set(application, timestamp).await
    }

    async fn latest_signature_set(
        &self,
        application: &ApplicationId,
    ) -> StorageResult<Option<SignatureSet>> {
        (**self).latest_signature_set(application).await
    }

    async fn set_application_signature(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
        signature: Signature,
    ) -> StorageResult<()> {
        (**self).set_application_signature(application, timestamp, signature).await
    }

    async fn delete_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> StorageResult<bool> {
        (**self).delete_signature_set(application, timestamp).await
    }

    async fn purge_application(&self, application: &ApplicationId) -> StorageResult<usize> {
        (**self).purge_application(application).await
    }

    async fn reopen_application(&self, application: &ApplicationId) -> StorageResult<()> {
        (**self).reopen_application(application).await
    }
}

#[derive(Debug, Default)]
struct ApplicationShard {
    sets: BTreeMap<KeyTimestamp, SignatureSet>,
    high_water: Option<KeyTimestamp>,
    closed: bool,
}

type Shard = Arc<RwLock<ApplicationShard>>;

/// In-memory implementation of [`SignatureSetStore`].
///
/// # Locking
///
/// Signature sets live in one shard per application. The outer map lock is
/// held only long enough to find (or insert) a shard; mutations lock a
/// single shard exclusively, so writers for one application never block
/// readers or writers of another. Reads take shared locks and never block
/// each other. Both locks are [`parking_lot::RwLock`] and are never held
/// across an `.await`.
///
/// # Examples
///
/// ```
/// use tessera_storage::{ApplicationId, KeyTimestamp, Zeroizing};
/// use tessera_storage::auth::{
///     MemorySignatureSetStore, PrivateKeyDer, Signature, SignatureSet, SignatureSetStore,
/// };
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemorySignatureSetStore::new();
///     let app = ApplicationId::new("office-v1")?;
///     let ts: KeyTimestamp = "2024-01-15T10_30_00".parse()?;
///
///     let set = SignatureSet::builder()
///         .timestamp(ts)
///         .private_key(PrivateKeyDer::new(Zeroizing::new(vec![0; 48])))
///         .identity_manager_signature(Signature::new("pk"))
///         .build();
///     store.create_signature_set(&app, set).await?;
///
///     assert_eq!(store.list_signature_sets(&app).await?, vec![ts]);
///     Ok(())
/// }
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemorySignatureSetStore {
    shards: Arc<RwLock<HashMap<ApplicationId, Shard>>>,
}

impl MemorySignatureSetStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, application: &ApplicationId) -> Option<Shard> {
        self.shards.read().get(application).cloned()
    }

    fn shard_or_insert(&self, application: &ApplicationId) -> Shard {
        if let Some(shard) = self.shard(application) {
            return shard;
        }
        Arc::clone(self.shards.write().entry(application.clone()).or_default())
    }
}

#[async_trait]
impl SignatureSetStore for MemorySignatureSetStore {
    #[tracing::instrument(skip(self, set), fields(timestamp = %set.timestamp))]
    async fn create_signature_set(
        &self,
        application: &ApplicationId,
        set: SignatureSet,
    ) -> StorageResult<()> {
        let shard = self.shard_or_insert(application);
        let mut shard = shard.write();

        if shard.closed {
            return Err(StorageError::not_found(application_resource(application)));
        }
        if let Some(high_water) = shard.high_water
            && set.timestamp <= high_water
        {
            return Err(StorageError::conflict(format!(
                "timestamp {} does not advance past {high_water} for application {application}",
                set.timestamp
            )));
        }

        shard.high_water = Some(set.timestamp);
        shard.sets.insert(set.timestamp, set);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn list_signature_sets(
        &self,
        application: &ApplicationId,
    ) -> StorageResult<Vec<KeyTimestamp>> {
        let Some(shard) = self.shard(application) else {
            return Ok(Vec::new());
        };
        let timestamps = shard.read().sets.keys().copied().collect();
        Ok(timestamps)
    }

    #[tracing::instrument(skip(self))]
    async fn get_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> StorageResult<Option<SignatureSet>> {
        let Some(shard) = self.shard(application) else {
            return Ok(None);
        };
        let set = shard.read().sets.get(&timestamp).cloned();
        Ok(set)
    }

    #[tracing::instrument(skip(self))]
    async fn latest_signature_set(
        &self,
        application: &ApplicationId,
    ) -> StorageResult<Option<SignatureSet>> {
        let Some(shard) = self.shard(application) else {
            return Ok(None);
        };
        let latest = shard.read().sets.last_key_value().map(|(_, set)| set.clone());
        Ok(latest)
    }

    #[tracing::instrument(skip(self, signature))]
    async fn set_application_signature(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
        signature: Signature,
    ) -> StorageResult<()> {
        let not_found = || StorageError::not_found(signature_set_resource(application, timestamp));

        let shard = self.shard(application).ok_or_else(not_found)?;
        let mut shard = shard.write();
        let set = shard.sets.get_mut(&timestamp).ok_or_else(not_found)?;

        set.application_signature = Some(signature);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> StorageResult<bool> {
        let Some(shard) = self.shard(application) else {
            return Ok(false);
        };
        let removed = shard.write().sets.remove(&timestamp).is_some();
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    async fn purge_application(&self, application: &ApplicationId) -> StorageResult<usize> {
        let shard = self.shard_or_insert(application);
        let mut shard = shard.write();
        shard.closed = true;
        let removed = shard.sets.len();
        shard.sets.clear();
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    async fn reopen_application(&self, application: &ApplicationId) -> StorageResult<()> {
        if let Some(shard) = self.shard(application) {
            shard.write().closed = false;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use zeroize::Zeroizing;

    use super::*;
    use crate::auth::PrivateKeyDer;

    fn app(id: &str) -> ApplicationId {
        ApplicationId::new(id).unwrap()
    }

    fn ts(s: &str) -> KeyTimestamp {
        s.parse().unwrap()
    }

    fn make_set(timestamp: KeyTimestamp, public_key: &str) -> SignatureSet {
        SignatureSet::builder()
            .timestamp(timestamp)
            .private_key(PrivateKeyDer::new(Zeroizing::new(vec![1; 48])))
            .identity_manager_signature(Signature::new(public_key))
            .build()
    }

    #[tokio::test]
    async fn test_create_then_get_and_list() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");

        store.create_signature_set(&a, make_set(t1, "pk1")).await.unwrap();

        let got = store.get_signature_set(&a, t1).await.unwrap().expect("set exists");
        assert_eq!(got.identity_manager_signature, Signature::new("pk1"));
        assert!(got.application_signature.is_none());
        assert_eq!(store.list_signature_sets(&a).await.unwrap(), vec![t1]);
    }

    #[tokio::test]
    async fn test_list_unknown_application_is_empty() {
        let store = MemorySignatureSetStore::new();
        assert!(store.list_signature_sets(&app("ghost")).await.unwrap().is_empty());
        assert!(store.latest_signature_set(&app("ghost")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_ascending() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let stamps =
            [ts("2024-01-15T10_30_00"), ts("2024-01-15T10_30_02"), ts("2024-02-01T00_00_00")];
        for (i, stamp) in stamps.iter().enumerate() {
            store.create_signature_set(&a, make_set(*stamp, &format!("pk{i}"))).await.unwrap();
        }

        assert_eq!(store.list_signature_sets(&a).await.unwrap(), stamps.to_vec());
        let latest = store.latest_signature_set(&a).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, stamps[2]);
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_conflicts_without_overwrite() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");

        store.create_signature_set(&a, make_set(t1, "original")).await.unwrap();
        let err = store.create_signature_set(&a, make_set(t1, "intruder")).await.unwrap_err();

        assert!(err.is_conflict());
        let kept = store.get_signature_set(&a, t1).await.unwrap().unwrap();
        assert_eq!(kept.identity_manager_signature, Signature::new("original"));
    }

    #[tokio::test]
    async fn test_older_timestamp_conflicts() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");

        store.create_signature_set(&a, make_set(ts("2024-01-15T10_30_05"), "new")).await.unwrap();
        let err = store
            .create_signature_set(&a, make_set(ts("2024-01-15T10_30_04"), "old"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_deleted_timestamp_is_never_reissued() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");

        store.create_signature_set(&a, make_set(t1, "pk1")).await.unwrap();
        assert!(store.delete_signature_set(&a, t1).await.unwrap());

        let err = store.create_signature_set(&a, make_set(t1, "pk2")).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(store.get_signature_set(&a, t1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_applications_have_independent_high_water_marks() {
        let store = MemorySignatureSetStore::new();
        let t1 = ts("2024-01-15T10_30_00");

        store.create_signature_set(&app("a"), make_set(t1, "a1")).await.unwrap();
        store.create_signature_set(&app("b"), make_set(t1, "b1")).await.unwrap();

        assert_eq!(store.list_signature_sets(&app("a")).await.unwrap(), vec![t1]);
        assert_eq!(store.list_signature_sets(&app("b")).await.unwrap(), vec![t1]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");

        assert!(!store.delete_signature_set(&a, t1).await.unwrap());
        store.create_signature_set(&a, make_set(t1, "pk1")).await.unwrap();
        assert!(store.delete_signature_set(&a, t1).await.unwrap());
        assert!(!store.delete_signature_set(&a, t1).await.unwrap());
        assert!(store.list_signature_sets(&a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_leaves_sibling_untouched() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");
        let t2 = ts("2024-01-15T10_30_02");

        store.create_signature_set(&a, make_set(t1, "pk1")).await.unwrap();
        store.create_signature_set(&a, make_set(t2, "pk2")).await.unwrap();
        store.delete_signature_set(&a, t1).await.unwrap();

        assert_eq!(store.list_signature_sets(&a).await.unwrap(), vec![t2]);
        let t2_set = store.get_signature_set(&a, t2).await.unwrap().unwrap();
        assert_eq!(t2_set.identity_manager_signature, Signature::new("pk2"));
    }

    #[tokio::test]
    async fn test_set_application_signature() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");
        store.create_signature_set(&a, make_set(t1, "pk1")).await.unwrap();

        store.set_application_signature(&a, t1, Signature::new("declared")).await.unwrap();
        let got = store.get_signature_set(&a, t1).await.unwrap().unwrap();
        assert_eq!(got.application_signature, Some(Signature::new("declared")));
        assert_eq!(got.identity_manager_signature, Signature::new("pk1"));

        // A later declaration wins.
        store.set_application_signature(&a, t1, Signature::new("redeclared")).await.unwrap();
        let got = store.get_signature_set(&a, t1).await.unwrap().unwrap();
        assert_eq!(got.application_signature, Some(Signature::new("redeclared")));
    }

    #[tokio::test]
    async fn test_set_application_signature_on_missing_set_is_not_found() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");

        let err = store.set_application_signature(&a, t1, Signature::new("x")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: app:office/ts:2024-01-15T10_30_00");
    }

    #[tokio::test]
    async fn test_purge_application() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");
        store.create_signature_set(&a, make_set(t1, "pk1")).await.unwrap();
        store.create_signature_set(&a, make_set(ts("2024-01-15T10_30_01"), "pk2")).await.unwrap();

        assert_eq!(store.purge_application(&a).await.unwrap(), 2);
        assert!(store.list_signature_sets(&a).await.unwrap().is_empty());
        assert_eq!(store.purge_application(&app("ghost")).await.unwrap(), 0);

        // High-water mark survives the purge.
        store.reopen_application(&a).await.unwrap();
        let err = store.create_signature_set(&a, make_set(t1, "again")).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_purged_application_rejects_creates_until_reopened() {
        let store = MemorySignatureSetStore::new();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");
        let t2 = ts("2024-01-15T10_30_01");
        store.create_signature_set(&a, make_set(t1, "pk1")).await.unwrap();
        store.purge_application(&a).await.unwrap();

        let err = store.create_signature_set(&a, make_set(t2, "late")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: app:office");
        assert!(store.list_signature_sets(&a).await.unwrap().is_empty());

        store.reopen_application(&a).await.unwrap();
        store.create_signature_set(&a, make_set(t2, "pk2")).await.unwrap();
        assert_eq!(store.list_signature_sets(&a).await.unwrap(), vec![t2]);
    }

    #[tokio::test]
    async fn test_purge_closes_unknown_application() {
        let store = MemorySignatureSetStore::new();
        let ghost = app("ghost");

        assert_eq!(store.purge_application(&ghost).await.unwrap(), 0);
        let err = store
            .create_signature_set(&ghost, make_set(ts("2024-01-15T10_30_00"), "pk"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemorySignatureSetStore::new();
        let clone = store.clone();
        let a = app("office");
        let t1 = ts("2024-01-15T10_30_00");

        store.create_signature_set(&a, make_set(t1, "pk1")).await.unwrap();
        assert!(clone.get_signature_set(&a, t1).await.unwrap().is_some());
    }
}
