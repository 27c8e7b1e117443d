//! Per-user permission enablement.
//!
//! A flag per (application, permittable group, user). The flag only gates
//! access; it is independent of signature sets, and deleting a set leaves
//! every flag as it was.
//!
//! A tuple that was never written reads as disabled.

use std::sync::Arc;

use tessera_storage::{
    ApplicationId, ApplicationStore, PermissionStore, PermittableGroupId, UserDirectory, UserId,
    auth::audit::application_resource, permission_resource,
};

use crate::error::{IdentityError, Result};

/// Reads and writes enablement flags after checking that every part of the
/// tuple exists.
#[derive(Clone)]
pub struct EnablementRegistry {
    applications: Arc<dyn ApplicationStore>,
    permissions: Arc<dyn PermissionStore>,
    users: Arc<dyn UserDirectory>,
}

impl EnablementRegistry {
    /// Creates a registry over the given stores.
    #[must_use]
    pub fn new(
        applications: Arc<dyn ApplicationStore>,
        permissions: Arc<dyn PermissionStore>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self { applications, permissions, users }
    }

    /// Sets the flag for a user.
    ///
    /// Writing the same value twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns a not-found error, without writing anything, if the
    /// application, the permission or the user does not exist.
    #[tracing::instrument(skip(self), fields(application = %application, group = %group, user = %user))]
    pub async fn set_enabled(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
        enabled: bool,
    ) -> Result<()> {
        self.check_tuple(application, group, user).await?;
        self.permissions.set_enabled(application, group, user, enabled).await?;
        tracing::info!(enabled, "permission enablement changed");
        Ok(())
    }

    /// Reads the flag for a user; `false` if never set.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the application, the permission or the
    /// user does not exist.
    #[tracing::instrument(skip(self), fields(application = %application, group = %group, user = %user))]
    pub async fn get_enabled(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
    ) -> Result<bool> {
        self.check_tuple(application, group, user).await?;
        Ok(self.permissions.get_enabled(application, group, user).await?)
    }

    async fn check_tuple(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
    ) -> Result<()> {
        if !self.applications.application_exists(application).await? {
            return Err(IdentityError::not_found(application_resource(application)));
        }
        if self.permissions.get_permission(application, group).await?.is_none() {
            return Err(IdentityError::not_found(permission_resource(application, group)));
        }
        if !self.users.user_exists(user).await? {
            return Err(IdentityError::not_found(format!("user:{user}")));
        }
        Ok(())
    }
}

impl std::fmt::Debug for EnablementRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnablementRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tessera_storage::{
        MemoryApplicationStore, MemoryPermissionStore, MemoryUserDirectory,
        testutil::{app_id, group_id, make_permission, user_id},
    };

    use super::*;

    struct Fixture {
        registry: EnablementRegistry,
        permissions: MemoryPermissionStore,
    }

    async fn fixture() -> Fixture {
        let applications = MemoryApplicationStore::new();
        let permissions = MemoryPermissionStore::new();
        let users = MemoryUserDirectory::new();
        applications.register_application(&app_id("office")).await.unwrap();
        permissions
            .create_permission(&app_id("office"), make_permission("documents", &[]))
            .await
            .unwrap();
        users.register_user(user_id("alice"));

        let registry = EnablementRegistry::new(
            Arc::new(applications),
            Arc::new(permissions.clone()),
            Arc::new(users),
        );
        Fixture { registry, permissions }
    }

    #[tokio::test]
    async fn test_default_is_disabled() {
        let f = fixture().await;
        let enabled = f
            .registry
            .get_enabled(&app_id("office"), &group_id("documents"), &user_id("alice"))
            .await
            .unwrap();
        assert!(!enabled);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let f = fixture().await;
        let (app, group, alice) = (app_id("office"), group_id("documents"), user_id("alice"));

        f.registry.set_enabled(&app, &group, &alice, true).await.unwrap();
        assert!(f.registry.get_enabled(&app, &group, &alice).await.unwrap());

        f.registry.set_enabled(&app, &group, &alice, false).await.unwrap();
        f.registry.set_enabled(&app, &group, &alice, false).await.unwrap();
        assert!(!f.registry.get_enabled(&app, &group, &alice).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_parts_are_not_found_and_write_nothing() {
        let f = fixture().await;
        let cases = [
            (app_id("billing"), group_id("documents"), user_id("alice")),
            (app_id("office"), group_id("billing"), user_id("alice")),
            (app_id("office"), group_id("documents"), user_id("mallory")),
        ];
        for (app, group, user) in cases {
            let err = f.registry.set_enabled(&app, &group, &user, true).await.unwrap_err();
            assert!(err.is_not_found(), "{app}/{group}/{user}: {err}");
            assert!(!f.permissions.has_enablement_record(&app, &group, &user).await.unwrap());
        }
    }
}
