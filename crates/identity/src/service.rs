//! The identity service facade.
//!
//! [`IdentityService`] wires the stores, registries and the token verifier
//! together and exposes the operations a transport layer needs: the
//! synchronous queries, the mutations behind each command, login token
//! issuing and token verification.
//!
//! Every query on a missing entity fails with a not-found error
//! ([`IdentityError::kind`](crate::IdentityError::kind) is
//! [`ErrorKind::NotFound`](crate::ErrorKind::NotFound)).
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera_identity::{IdentityConfig, IdentityService};
//! use tessera_storage::{MemoryUserDirectory, UserId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let users = MemoryUserDirectory::new();
//! users.register_user(UserId::new("alice")?);
//!
//! let service = IdentityService::builder()
//!     .config(IdentityConfig::builder().identity_application("identity-v1").build())
//!     .users(Arc::new(users))
//!     .build()?;
//! service.bootstrap().await?;
//!
//! let token = service.issue_token(&UserId::new("alice")?).await?;
//! let verified = service.verify_token(&token).await?;
//! assert_eq!(verified.user.as_str(), "alice");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use chrono::Utc;
use tessera_authn::{TokenClaims, TokenVerifier, VerifiedToken, issue_token};
use tessera_storage::{
    ApplicationId, ApplicationStore, KeyTimestamp, MemoryApplicationStore, MemoryPermissionStore,
    Permission, PermissionStore, PermittableGroupId, UserDirectory, UserId,
    auth::{
        MemorySignatureSetStore, RegistryMetrics, Signature, SignatureSetStore, SignatureSetView,
        audit::{AuditLogger, TracingAuditLogger, application_resource},
        audited_store::AuditedSignatureSetStore,
    },
    permission_resource,
};

use crate::{
    config::IdentityConfig,
    enablement::EnablementRegistry,
    error::{IdentityError, Result},
    reconciler::SignatureReconciler,
    registry::SignatureSetRegistry,
};

/// Actor recorded in audit events emitted by the service.
pub const AUDIT_ACTOR: &str = "identity-service";

/// Signature-set rotation, signature reconciliation, permission enablement
/// and token handling for all applications.
pub struct IdentityService {
    config: IdentityConfig,
    identity_application: ApplicationId,
    applications: Arc<dyn ApplicationStore>,
    permissions: Arc<dyn PermissionStore>,
    users: Arc<dyn UserDirectory>,
    registry: SignatureSetRegistry,
    reconciler: SignatureReconciler,
    enablement: EnablementRegistry,
    verifier: TokenVerifier,
}

#[bon::bon]
impl IdentityService {
    /// Creates a service.
    ///
    /// Stores default to in-memory implementations and audit events go to
    /// `tracing`. Signature-set mutations and reads made through the service
    /// are audited; token verification reads the store directly.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Config`] if `config` does not validate.
    #[builder]
    pub fn new(
        config: IdentityConfig,
        users: Arc<dyn UserDirectory>,
        #[builder(default = Arc::new(MemorySignatureSetStore::new()))]
        signature_sets: Arc<dyn SignatureSetStore>,
        #[builder(default = Arc::new(MemoryApplicationStore::new()))]
        applications: Arc<dyn ApplicationStore>,
        #[builder(default = Arc::new(MemoryPermissionStore::new()))]
        permissions: Arc<dyn PermissionStore>,
        #[builder(default = Arc::new(TracingAuditLogger))]
        audit_logger: Arc<dyn AuditLogger>,
    ) -> Result<Self> {
        config.validate()?;
        let identity_application = config.identity_application_id()?;

        let audited: Arc<dyn SignatureSetStore> = Arc::new(AuditedSignatureSetStore::new(
            Arc::clone(&signature_sets),
            audit_logger,
            AUDIT_ACTOR,
        ));
        let registry = SignatureSetRegistry::new(audited, config.collision_retries)
            .with_self_application(identity_application.clone());
        let reconciler = SignatureReconciler::new(registry.clone());
        let enablement = EnablementRegistry::new(
            Arc::clone(&applications),
            Arc::clone(&permissions),
            Arc::clone(&users),
        );
        let verifier = TokenVerifier::new(
            signature_sets,
            Arc::clone(&permissions),
            config.decoding_key_cache_capacity,
        )
        .with_audience(config.token_audience.clone());

        Ok(Self {
            config,
            identity_application,
            applications,
            permissions,
            users,
            registry,
            reconciler,
            enablement,
            verifier,
        })
    }
}

impl IdentityService {
    /// Registers the identity application and makes sure it has a live
    /// signature set to sign login tokens with. Returns that set.
    ///
    /// Safe to call on every start.
    ///
    /// # Errors
    ///
    /// Propagates signature-set creation failures.
    #[tracing::instrument(skip(self), fields(application = %self.identity_application))]
    pub async fn bootstrap(&self) -> Result<SignatureSetView> {
        self.register_application(&self.identity_application).await?;
        match self.registry.signing_set(&self.identity_application).await {
            Ok(set) => Ok(set.view()),
            Err(e) if e.is_not_found() => {
                tracing::info!("no live signature set for the identity application, creating one");
                self.registry.create(&self.identity_application).await
            },
            Err(e) => Err(e),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    /// The identity manager's own application id.
    #[must_use]
    pub fn identity_application(&self) -> &ApplicationId {
        &self.identity_application
    }

    /// Signature-set registry metrics.
    #[must_use]
    pub fn metrics(&self) -> &RegistryMetrics {
        self.registry.metrics()
    }

    // -----------------------------------------------------------------------
    // Applications
    // -----------------------------------------------------------------------

    /// Registers an application. Returns `false` if it already existed.
    ///
    /// A previously deleted application is reopened in the signature-set and
    /// permission stores before it becomes visible as registered.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    #[tracing::instrument(skip(self))]
    pub async fn register_application(&self, application: &ApplicationId) -> Result<bool> {
        self.registry.reopen(application).await?;
        self.permissions.reopen_application(application).await?;
        Ok(self.applications.register_application(application).await?)
    }

    /// Lists registered applications, sorted.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn list_applications(&self) -> Result<Vec<ApplicationId>> {
        Ok(self.applications.list_applications().await?)
    }

    /// Deletes an application together with its signature sets,
    /// permissions and enablement flags. Returns `false` if it was not
    /// registered.
    ///
    /// The registration goes first so no new command passes the existence
    /// check. Purging then closes the application in both stores: a create
    /// already past the check either lands before the purge and is removed
    /// by it, or fails with not-found. Signature sets are purged before
    /// permissions, so tokens stop verifying before anything else changes.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    #[tracing::instrument(skip(self))]
    pub async fn delete_application(&self, application: &ApplicationId) -> Result<bool> {
        let existed = self.applications.delete_application(application).await?;
        let sets = self.registry.purge(application).await?;
        let permissions = self.permissions.purge_application(application).await?;
        tracing::info!(sets, permissions, existed, "application deleted");
        Ok(existed)
    }

    async fn require_application(&self, application: &ApplicationId) -> Result<()> {
        if self.applications.application_exists(application).await? {
            Ok(())
        } else {
            Err(IdentityError::not_found(application_resource(application)))
        }
    }

    // -----------------------------------------------------------------------
    // Signature sets
    // -----------------------------------------------------------------------

    /// Creates a signature set for a registered application.
    ///
    /// # Errors
    ///
    /// Not-found if the application is not registered; otherwise see
    /// [`SignatureSetRegistry::create`].
    pub async fn create_signature_set(&self, application: &ApplicationId) -> Result<SignatureSetView> {
        self.require_application(application).await?;
        self.registry.create(application).await
    }

    /// Lists the live signature-set timestamps of an application, ascending.
    ///
    /// # Errors
    ///
    /// Not-found if the application is not registered.
    pub async fn get_all_signature_sets(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<KeyTimestamp>> {
        self.require_application(application).await?;
        self.registry.list(application).await
    }

    /// Returns both signatures of a live signature set.
    ///
    /// # Errors
    ///
    /// Not-found if the set is not live.
    pub async fn get_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> Result<SignatureSetView> {
        self.reconciler.get_signature_set(application, timestamp).await
    }

    /// Deletes a signature set, revoking every token issued under it.
    /// Returns `false` if it was already gone.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn delete_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> Result<bool> {
        self.registry.delete(application, timestamp).await
    }

    /// Records the signature an application declares for a set.
    ///
    /// # Errors
    ///
    /// Not-found if the set is not live.
    pub async fn set_application_signature(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
        signature: Signature,
    ) -> Result<()> {
        self.reconciler.set_application_signature(application, timestamp, signature).await
    }

    /// Returns the signature an application declared for a set.
    ///
    /// # Errors
    ///
    /// Not-found if the set is not live or nothing was declared.
    pub async fn get_application_signature(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> Result<Signature> {
        self.reconciler.get_application_signature(application, timestamp).await
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    /// Creates or replaces a permission. Returns `true` if it is new.
    ///
    /// Replacing keeps the permission's enablement flags.
    ///
    /// # Errors
    ///
    /// Not-found if the application is not registered.
    #[tracing::instrument(skip(self, permission), fields(group = %permission.permittable_group_id))]
    pub async fn create_permission(
        &self,
        application: &ApplicationId,
        permission: Permission,
    ) -> Result<bool> {
        self.require_application(application).await?;
        Ok(self.permissions.create_permission(application, permission).await?)
    }

    /// Lists the permissions of an application, sorted by group.
    ///
    /// # Errors
    ///
    /// Not-found if the application is not registered.
    pub async fn get_all_permissions(&self, application: &ApplicationId) -> Result<Vec<Permission>> {
        self.require_application(application).await?;
        Ok(self.permissions.list_permissions(application).await?)
    }

    /// Returns one permission.
    ///
    /// # Errors
    ///
    /// Not-found if the application or the permission does not exist.
    pub async fn get_permission(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
    ) -> Result<Permission> {
        self.permissions
            .get_permission(application, group)
            .await?
            .ok_or_else(|| IdentityError::not_found(permission_resource(application, group)))
    }

    /// Deletes a permission and its enablement flags. Returns `false` if it
    /// did not exist.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    #[tracing::instrument(skip(self))]
    pub async fn delete_permission(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
    ) -> Result<bool> {
        Ok(self.permissions.delete_permission(application, group).await?)
    }

    /// Sets a user's enablement flag for a permission.
    ///
    /// # Errors
    ///
    /// Not-found if the application, the permission or the user does not
    /// exist; nothing is written in that case.
    pub async fn set_user_permission_enabled(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
        enabled: bool,
    ) -> Result<()> {
        self.enablement.set_enabled(application, group, user, enabled).await
    }

    /// Reads a user's enablement flag for a permission; `false` if never set.
    ///
    /// # Errors
    ///
    /// Not-found if the application, the permission or the user does not
    /// exist.
    pub async fn get_user_permission_enabled(
        &self,
        application: &ApplicationId,
        group: &PermittableGroupId,
        user: &UserId,
    ) -> Result<bool> {
        self.enablement.get_enabled(application, group, user).await
    }

    // -----------------------------------------------------------------------
    // Tokens
    // -----------------------------------------------------------------------

    /// Issues a login token for `user`, signed with the identity
    /// application's newest live signature set.
    ///
    /// # Errors
    ///
    /// Not-found if the user does not exist or the identity application has
    /// no live signature set.
    #[tracing::instrument(skip(self))]
    pub async fn issue_token(&self, user: &UserId) -> Result<String> {
        let claims = self.login_claims(user).await?;
        self.sign(claims).await
    }

    /// Issues a login token for `user` restricted to one permittable group
    /// of the identity application.
    ///
    /// # Errors
    ///
    /// As [`issue_token`](Self::issue_token), plus not-found if the identity
    /// application has no such permission.
    #[tracing::instrument(skip(self))]
    pub async fn issue_scoped_token(
        &self,
        user: &UserId,
        group: &PermittableGroupId,
    ) -> Result<String> {
        self.get_permission(&self.identity_application, group).await?;
        let claims = self.login_claims(user).await?.with_permittable_group(group);
        self.sign(claims).await
    }

    async fn login_claims(&self, user: &UserId) -> Result<TokenClaims> {
        if !self.users.user_exists(user).await? {
            return Err(IdentityError::not_found(format!("user:{user}")));
        }
        Ok(TokenClaims::new(
            &self.identity_application,
            user,
            self.config.token_audience.as_str(),
            Utc::now(),
            self.config.token_ttl,
        ))
    }

    async fn sign(&self, claims: TokenClaims) -> Result<String> {
        let set = self.registry.signing_set(&self.identity_application).await?;
        let token = issue_token(&set, &claims)?;
        tracing::debug!(timestamp = %set.timestamp, "token issued");
        Ok(token)
    }

    /// Verifies a token against the live signature sets.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Auth`]; a revoked signature set classifies as
    /// not-found.
    pub async fn verify_token(&self, token: &str) -> Result<VerifiedToken> {
        Ok(self.verifier.verify(token).await?)
    }

    /// Verifies a token and the user's enablement flag for `group`.
    ///
    /// # Errors
    ///
    /// [`IdentityError::Auth`], including `PermissionDisabled`.
    pub async fn verify_access(
        &self,
        token: &str,
        group: &PermittableGroupId,
    ) -> Result<VerifiedToken> {
        Ok(self.verifier.verify_access(token, group).await?)
    }
}

impl std::fmt::Debug for IdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityService")
            .field("identity_application", &self.identity_application)
            .field("registry", &self.registry)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}
