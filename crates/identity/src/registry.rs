//! Signature-set registry: key rotation per application.
//!
//! An application may hold any number of live signature sets. Rotation is
//! done by the caller: create a new set, start issuing tokens under it, then
//! delete the old one once its tokens are no longer needed. Deleting a set is
//! the revocation lever; every token referencing its timestamp fails
//! verification from then on.
//!
//! # Creation
//!
//! ```text
//! create(app)
//!   → generate key pair (blocking pool, no lock held)
//!   → stamp with the current second
//!   → single insert into the store
//!       Conflict? → wait for the next second, re-stamp, retry
//! ```
//!
//! The store rejects any timestamp that does not advance past the
//! application's high-water mark, so two sets can never share a timestamp
//! and a deleted timestamp is never reissued.

use std::{sync::Arc, time::Instant};

use chrono::Utc;
use fail::fail_point;
use tessera_authn::{KeyMaterial, signature_of};
use tessera_storage::{
    ApplicationId, KeyTimestamp,
    auth::{
        RegistryErrorKind, RegistryMetrics, SignatureSet, SignatureSetStore, SignatureSetView,
        audit::signature_set_resource,
    },
};

use crate::error::{IdentityError, Result};

/// Per-application signature-set lifecycle.
#[derive(Clone)]
pub struct SignatureSetRegistry {
    store: Arc<dyn SignatureSetStore>,
    metrics: RegistryMetrics,
    collision_retries: u32,
    self_application: Option<ApplicationId>,
}

impl SignatureSetRegistry {
    /// Creates a registry over `store`.
    ///
    /// `collision_retries` bounds how often a create waits for the next
    /// second after a timestamp collision before reporting
    /// [`IdentityError::Conflict`].
    #[must_use]
    pub fn new(store: Arc<dyn SignatureSetStore>, collision_retries: u32) -> Self {
        Self { store, metrics: RegistryMetrics::new(), collision_retries, self_application: None }
    }

    /// Marks `application` as the identity manager itself.
    ///
    /// Its signature sets are stored with the application signature already
    /// declared, equal to the identity-manager signature.
    #[must_use]
    pub fn with_self_application(mut self, application: ApplicationId) -> Self {
        self.self_application = Some(application);
        self
    }

    /// Registry metrics.
    #[must_use]
    pub fn metrics(&self) -> &RegistryMetrics {
        &self.metrics
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SignatureSetStore> {
        &self.store
    }

    /// Creates a signature set for `application`.
    ///
    /// Key generation runs on the blocking pool. If the caller stops polling
    /// mid-generation the key is discarded and nothing is stored.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::Conflict`] if no fresh timestamp was obtained
    ///   within the configured retries
    /// - [`IdentityError::Auth`] wrapping `KeyGeneration` if the entropy
    ///   source failed
    #[tracing::instrument(skip(self), fields(application = %application))]
    pub async fn create(&self, application: &ApplicationId) -> Result<SignatureSetView> {
        let start = Instant::now();

        let material = tokio::task::spawn_blocking(KeyMaterial::generate)
            .await
            .map_err(|e| IdentityError::fatal(format!("key generation task failed: {e}")))?
            .inspect_err(|e| {
                tracing::error!(error = %e, "key generation failed");
                self.metrics.record_error(RegistryErrorKind::Other);
            })?;

        fail_point!("registry-before-insert", |_| {
            Err(IdentityError::fatal("injected failure before signature set insert"))
        });

        // The identity-manager signature is the public half of the stored key.
        let signature = signature_of(&material.private_key).inspect_err(|e| {
            tracing::error!(error = %e, "generated key does not yield a signature");
            self.metrics.record_error(RegistryErrorKind::Other);
        })?;
        let declared =
            (self.self_application.as_ref() == Some(application)).then(|| signature.clone());

        let mut attempt = 0;
        loop {
            let set = SignatureSet::builder()
                .timestamp(KeyTimestamp::now())
                .private_key(material.private_key.clone())
                .identity_manager_signature(signature.clone())
                .maybe_application_signature(declared.clone())
                .build();
            let view = set.view();

            match self.store.create_signature_set(application, set).await {
                Ok(()) => {
                    self.metrics.record_create(start.elapsed());
                    tracing::info!(timestamp = %view.timestamp, "signature set created");
                    return Ok(view);
                },
                Err(e) if e.is_conflict() && attempt < self.collision_retries => {
                    attempt += 1;
                    self.metrics.record_error(RegistryErrorKind::Conflict);
                    tracing::debug!(
                        timestamp = %view.timestamp,
                        attempt,
                        "timestamp collision, waiting for the next second"
                    );
                    wait_for_next_second().await;
                },
                Err(e) => {
                    self.metrics.record_error(RegistryErrorKind::from(&e));
                    if e.is_conflict() {
                        tracing::warn!(attempts = attempt + 1, "no fresh timestamp available");
                        return Err(IdentityError::conflict(format!(
                            "no fresh timestamp for {} after {} attempts",
                            signature_set_resource(application, view.timestamp),
                            attempt + 1
                        )));
                    }
                    return Err(e.into());
                },
            }
        }
    }

    /// Lists live timestamps, ascending.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    #[tracing::instrument(skip(self), fields(application = %application))]
    pub async fn list(&self, application: &ApplicationId) -> Result<Vec<KeyTimestamp>> {
        let start = Instant::now();
        let timestamps = self.store.list_signature_sets(application).await.inspect_err(|e| {
            self.metrics.record_error(RegistryErrorKind::from(e));
        })?;
        self.metrics.record_list(start.elapsed());
        Ok(timestamps)
    }

    /// Returns the public view of a live signature set.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NotFound`] if no live set has `timestamp`.
    #[tracing::instrument(skip(self), fields(application = %application, timestamp = %timestamp))]
    pub async fn get(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> Result<SignatureSetView> {
        self.get_set(application, timestamp).await.map(|set| set.view())
    }

    /// Deletes a signature set. Returns `true` if a live set was removed.
    ///
    /// Deleting an absent set is a no-op, so redelivered delete commands are
    /// harmless.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    #[tracing::instrument(skip(self), fields(application = %application, timestamp = %timestamp))]
    pub async fn delete(&self, application: &ApplicationId, timestamp: KeyTimestamp) -> Result<bool> {
        let start = Instant::now();
        let existed =
            self.store.delete_signature_set(application, timestamp).await.inspect_err(|e| {
                self.metrics.record_error(RegistryErrorKind::from(e));
            })?;
        self.metrics.record_delete(start.elapsed());
        if existed {
            tracing::info!("signature set deleted");
        }
        Ok(existed)
    }

    /// Deletes every signature set of `application`.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    #[tracing::instrument(skip(self), fields(application = %application))]
    pub async fn purge(&self, application: &ApplicationId) -> Result<usize> {
        let removed = self.store.purge_application(application).await?;
        tracing::info!(removed, "signature sets purged");
        Ok(removed)
    }

    /// Lets a purged application receive signature sets again.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn reopen(&self, application: &ApplicationId) -> Result<()> {
        Ok(self.store.reopen_application(application).await?)
    }

    /// The newest live set, private key included, for signing tokens.
    pub(crate) async fn signing_set(&self, application: &ApplicationId) -> Result<SignatureSet> {
        self.store.latest_signature_set(application).await?.ok_or_else(|| {
            IdentityError::not_found(format!("app:{application}/latest signature set"))
        })
    }

    pub(crate) async fn get_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> Result<SignatureSet> {
        let start = Instant::now();
        let found = self.store.get_signature_set(application, timestamp).await.inspect_err(|e| {
            self.metrics.record_error(RegistryErrorKind::from(e));
        })?;
        self.metrics.record_get(start.elapsed());
        found.ok_or_else(|| {
            self.metrics.record_error(RegistryErrorKind::NotFound);
            IdentityError::not_found(signature_set_resource(application, timestamp))
        })
    }
}

impl std::fmt::Debug for SignatureSetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureSetRegistry")
            .field("collision_retries", &self.collision_retries)
            .field("self_application", &self.self_application)
            .finish_non_exhaustive()
    }
}

/// Sleeps until the wall clock has moved into the next second.
async fn wait_for_next_second() {
    let nanos = u64::from(Utc::now().timestamp_subsec_nanos());
    let remaining = 1_000_000_000u64.saturating_sub(nanos) + 1_000_000;
    tokio::time::sleep(std::time::Duration::from_nanos(remaining)).await;
}
