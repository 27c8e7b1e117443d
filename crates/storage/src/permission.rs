//! Permissions and per-user enablement flags.
//!
//! A permission names a permittable group of an application together with
//! the operations it allows. Each `(application, permission, user)` tuple
//! carries a boolean enablement flag that authorization checks consult.
//!
//! # Defaults
//!
//! A tuple that was never written reads as **disabled**. Access must be
//! granted explicitly.
//!
//! # Ownership
//!
//! Flags are owned by their permission: deleting a permission drops its
//! flags, and purging an application drops its permissions. Re-creating a
//! deleted permission therefore starts with every user disabled.
//!
//! A purged application is closed until
//! [`reopen_application`](PermissionStore::reopen_application): creates for
//! it fail with [`StorageError::NotFound`].

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    auth::audit::application_resource,
    error::{StorageError, StorageResult},
    types::{ApplicationId, PermittableGroupId, UserId},
};

/// Operation a permission allows on its permittable group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AllowedOperation {
    /// Read access.
    Read,
    /// Create or modify.
    Change,
    /// Delete.
    Delete,
}

impl fmt::Display for AllowedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("READ"),
            Self::Change => f.write_str("CHANGE"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

/// A permittable group granted to an application, with allowed operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
pub struct Permission {
    /// The group this permission grants.
    pub permittable_group_id: PermittableGroupId,
    /// Operations allowed on the group.
    #[builder(default)]
    #[serde(default)]
    pub allowed_operations: BTreeSet<AllowedOperation>,
}

impl Permission {
    /// Whether `operation` is allowed.
    #[must_use]
    pub fn allows(&self, operation: AllowedOperation) -> bool {
        self.allowed_operations.contains(&operation)
    }
}

/// Resource identifier for a permission of an application.
pub fn permission_resource(application: &ApplicationId, group: &PermittableGroupId) -> String {
    format!("app:{application}/perm:{group}")
}

/// Persistence of permissions and their enablement flags, scoped per
/// application.
///
/// User existence is not checked here; callers consult a
/// [`UserDirectory`](crate::UserDirectory) first.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Creates or replaces a permission. Returns `true` if it was new.
    ///
    /// Replacing keeps existing enablement flags.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the application was purged and
    /// has not been reopened.
    async fn create_permission(
        &self,
        application: &ApplicationId,
        permission: Permission,
    ) -> StorageResult<bool>;

    /// Lists an application's permissions ordered by group identifier.
    async fn list_permissions(&self, application: &ApplicationId) -> StorageResult<Vec<Permission>>;

    /// Retrieves one permission.
    async fn get_permission(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
    ) -> StorageResult<Option<Permission>>;

    /// Deletes a permission and all of its enablement flags.
    ///
    /// Idempotent; returns `false` if the permission did not exist.
    async fn delete_permission(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
    ) -> StorageResult<bool>;

    /// Writes the enablement flag for a user.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the permission does not exist;
    /// no flag is written in that case.
    async fn set_enabled(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
        enabled: bool,
    ) -> StorageResult<()>;

    /// Reads the enablement flag for a user, `false` if never written.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the permission does not exist.
    async fn get_enabled(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
    ) -> StorageResult<bool>;

    /// Whether any enablement record exists for the tuple.
    async fn has_enablement_record(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
    ) -> StorageResult<bool>;

    /// Drops every permission and flag of an application, returning the
    /// number of permissions removed, and closes the application.
    async fn purge_application(&self, application: &ApplicationId) -> StorageResult<usize>;

    /// Accepts new permissions for a purged application again.
    async fn reopen_application(&self, application: &ApplicationId) -> StorageResult<()>;
}

#[derive(Debug)]
struct PermissionEntry {
    permission: Permission,
    enabled: HashMap<UserId, bool>,
}

#[derive(Debug, Default)]
struct ApplicationPermissions {
    entries: BTreeMap<PermittableGroupId, PermissionEntry>,
    closed: bool,
}

type Shard = Arc<RwLock<ApplicationPermissions>>;

/// In-memory [`PermissionStore`] with one lock per application.
#[derive(Debug, Default, Clone)]
pub struct MemoryPermissionStore {
    shards: Arc<RwLock<HashMap<ApplicationId, Shard>>>,
}

impl MemoryPermissionStore {
    /// Creates an empty store.
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
impl PermissionStore for MemoryPermissionStore {
    #[tracing::instrument(skip(self, permission), fields(group = %permission.permittable_group_id))]
    async fn create_permission(
        &self,
        application: &ApplicationId,
        permission: Permission,
    ) -> StorageResult<bool> {
        let shard = self.shard_or_insert(application);
        let mut shard = shard.write();
        if shard.closed {
            return Err(StorageError::not_found(application_resource(application)));
        }
        match shard.entries.get_mut(&permission.permittable_group_id) {
            Some(entry) => {
                entry.permission = permission;
                Ok(false)
            },
            None => {
                let group = permission.permittable_group_id.clone();
                shard.entries.insert(group, PermissionEntry { permission, enabled: HashMap::new() });
                Ok(true)
            },
        }
    }

    #[tracing::instrument(skip(self))]
    async fn list_permissions(&self, application: &ApplicationId) -> StorageResult<Vec<Permission>> {
        let Some(shard) = self.shard(application) else {
            return Ok(Vec::new());
        };
        let permissions = shard.read().entries.values().map(|e| e.permission.clone()).collect();
        Ok(permissions)
    }

    #[tracing::instrument(skip(self))]
    async fn get_permission(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
    ) -> StorageResult<Option<Permission>> {
        let Some(shard) = self.shard(application) else {
            return Ok(None);
        };
        let permission = shard.read().entries.get(group).map(|e| e.permission.clone());
        Ok(permission)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_permission(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
    ) -> StorageResult<bool> {
        let Some(shard) = self.shard(application) else {
            return Ok(false);
        };
        let removed = shard.write().entries.remove(group).is_some();
        Ok(removed)
    }

    #[tracing::instrument(skip(self))]
    async fn set_enabled(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
        enabled: bool,
    ) -> StorageResult<()> {
        let not_found = || StorageError::not_found(permission_resource(application, group));

        let shard = self.shard(application).ok_or_else(not_found)?;
        let mut shard = shard.write();
        let entry = shard.entries.get_mut(group).ok_or_else(not_found)?;
        entry.enabled.insert(user.clone(), enabled);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_enabled(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
    ) -> StorageResult<bool> {
        let not_found = || StorageError::not_found(permission_resource(application, group));

        let shard = self.shard(application).ok_or_else(not_found)?;
        let shard = shard.read();
        let entry = shard.entries.get(group).ok_or_else(not_found)?;
        Ok(entry.enabled.get(user).copied().unwrap_or(false))
    }

    #[tracing::instrument(skip(self))]
    async fn has_enablement_record(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
    ) -> StorageResult<bool> {
        let Some(shard) = self.shard(application) else {
            return Ok(false);
        };
        let found = shard.read().entries.get(group).is_some_and(|e| e.enabled.contains_key(user));
        Ok(found)
    }

    #[tracing::instrument(skip(self))]
    async fn purge_application(&self, application: &ApplicationId) -> StorageResult<usize> {
        let shard = self.shard_or_insert(application);
        let mut shard = shard.write();
        shard.closed = true;
        let removed = shard.entries.len();
        shard.entries.clear();
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
    use super::*;

    fn app(id: &str) -> ApplicationId {
        ApplicationId::new(id).unwrap()
    }

    fn group(id: &str) -> PermittableGroupId {
        PermittableGroupId::new(id).unwrap()
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn permission(id: &str, ops: &[AllowedOperation]) -> Permission {
        Permission::builder()
            .permittable_group_id(group(id))
            .allowed_operations(ops.iter().copied().collect())
            .build()
    }

    #[tokio::test]
    async fn test_create_is_upsert() {
        let store = MemoryPermissionStore::new();
        let a = app("office");

        assert!(store.create_permission(&a, permission("docs", &[AllowedOperation::Read])).await.unwrap());
        store.set_enabled(&a, &group("docs"), &user("alice"), true).await.unwrap();

        let replaced = permission("docs", &[AllowedOperation::Read, AllowedOperation::Change]);
        assert!(!store.create_permission(&a, replaced.clone()).await.unwrap());

        assert_eq!(store.list_permissions(&a).await.unwrap(), vec![replaced]);
        assert!(store.get_enabled(&a, &group("docs"), &user("alice")).await.unwrap());
    }

    #[tokio::test]
    async fn test_enablement_defaults_to_disabled() {
        let store = MemoryPermissionStore::new();
        let a = app("office");
        store.create_permission(&a, permission("docs", &[])).await.unwrap();

        assert!(!store.get_enabled(&a, &group("docs"), &user("bob")).await.unwrap());
        assert!(!store.has_enablement_record(&a, &group("docs"), &user("bob")).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_enabled_on_missing_permission_writes_nothing() {
        let store = MemoryPermissionStore::new();
        let a = app("office");

        let err = store.set_enabled(&a, &group("docs"), &user("alice"), true).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: app:office/perm:docs");

        store.create_permission(&a, permission("other", &[])).await.unwrap();
        let err = store.set_enabled(&a, &group("docs"), &user("alice"), true).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.has_enablement_record(&a, &group("docs"), &user("alice")).await.unwrap());
        assert!(store.get_enabled(&a, &group("docs"), &user("alice")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_permission_drops_flags() {
        let store = MemoryPermissionStore::new();
        let a = app("office");
        store.create_permission(&a, permission("docs", &[AllowedOperation::Delete])).await.unwrap();
        store.set_enabled(&a, &group("docs"), &user("alice"), true).await.unwrap();

        assert!(store.delete_permission(&a, &group("docs")).await.unwrap());
        assert!(!store.delete_permission(&a, &group("docs")).await.unwrap());
        assert!(store.get_permission(&a, &group("docs")).await.unwrap().is_none());

        store.create_permission(&a, permission("docs", &[])).await.unwrap();
        assert!(!store.get_enabled(&a, &group("docs"), &user("alice")).await.unwrap());
    }

    #[tokio::test]
    async fn test_applications_are_isolated() {
        let store = MemoryPermissionStore::new();
        store.create_permission(&app("office"), permission("docs", &[])).await.unwrap();
        store.set_enabled(&app("office"), &group("docs"), &user("alice"), true).await.unwrap();

        assert!(store.list_permissions(&app("billing")).await.unwrap().is_empty());
        assert!(store.get_enabled(&app("billing"), &group("docs"), &user("alice")).await.is_err());
    }

    #[tokio::test]
    async fn test_purge_application() {
        let store = MemoryPermissionStore::new();
        let a = app("office");
        store.create_permission(&a, permission("docs", &[])).await.unwrap();
        store.create_permission(&a, permission("mail", &[])).await.unwrap();

        assert_eq!(store.purge_application(&a).await.unwrap(), 2);
        assert_eq!(store.purge_application(&a).await.unwrap(), 0);
        assert!(store.list_permissions(&a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purged_application_rejects_creates_until_reopened() {
        let store = MemoryPermissionStore::new();
        let a = app("office");
        store.create_permission(&a, permission("docs", &[])).await.unwrap();
        store.set_enabled(&a, &group("docs"), &user("alice"), true).await.unwrap();
        store.purge_application(&a).await.unwrap();

        let err = store.create_permission(&a, permission("docs", &[])).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: app:office");
        assert!(store.get_permission(&a, &group("docs")).await.unwrap().is_none());

        store.reopen_application(&a).await.unwrap();
        assert!(store.create_permission(&a, permission("docs", &[])).await.unwrap());
        assert!(!store.get_enabled(&a, &group("docs"), &user("alice")).await.unwrap());
    }

    #[test]
    fn test_permission_serde() {
        let p = permission("docs", &[AllowedOperation::Change, AllowedOperation::Read]);
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"permittable_group_id":"docs","allowed_operations":["READ","CHANGE"]}"#);
        assert!(p.allows(AllowedOperation::Read));
        assert!(!p.allows(AllowedOperation::Delete));
        assert_eq!(AllowedOperation::Change.to_string(), "CHANGE");
    }
}
