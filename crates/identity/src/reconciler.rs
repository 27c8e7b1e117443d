//! Signature reconciliation.
//!
//! Each signature set carries two signatures: the identity-manager
//! signature, computed from the set's own key pair, and the application
//! signature, which the owning application declares. They are expected to
//! match once the application has picked up the set, but nothing here
//! enforces it; [`signatures_match`] is the comparison callers and tests use.

use tessera_storage::{
    ApplicationId, KeyTimestamp,
    auth::{Signature, SignatureSetView, audit::signature_set_resource},
};

use crate::{
    error::{IdentityError, Result},
    registry::SignatureSetRegistry,
};

/// Whether a set's declared application signature equals its
/// identity-manager signature. An undeclared signature never matches.
#[must_use]
pub fn signatures_match(view: &SignatureSetView) -> bool {
    view.application_signature.as_ref() == Some(&view.identity_manager_signature)
}

/// Stores and reads application-declared signatures.
#[derive(Clone, Debug)]
pub struct SignatureReconciler {
    registry: SignatureSetRegistry,
}

impl SignatureReconciler {
    /// Creates a reconciler over the registry's store.
    #[must_use]
    pub fn new(registry: SignatureSetRegistry) -> Self {
        Self { registry }
    }

    /// Records the signature `application` declares for a set.
    ///
    /// A later declaration overwrites an earlier one. The identity-manager
    /// signature is left as computed.
    ///
    /// # Errors
    ///
    /// - [`IdentityError::Validation`] if the signature is blank; nothing is
    ///   written
    /// - a not-found error if the set is not live
    #[tracing::instrument(skip(self, signature), fields(application = %application, timestamp = %timestamp))]
    pub async fn set_application_signature(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
        signature: Signature,
    ) -> Result<()> {
        if signature.public_key.trim().is_empty() {
            return Err(IdentityError::validation("signature", "must not be blank"));
        }
        self.registry.store().set_application_signature(application, timestamp, signature).await?;
        tracing::info!("application signature declared");
        Ok(())
    }

    /// Returns the signature `application` declared for a set.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NotFound`] if the set is not live or no
    /// signature has been declared for it yet.
    #[tracing::instrument(skip(self), fields(application = %application, timestamp = %timestamp))]
    pub async fn get_application_signature(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> Result<Signature> {
        let view = self.registry.get(application, timestamp).await?;
        view.application_signature.ok_or_else(|| {
            IdentityError::not_found(format!(
                "{}/application signature",
                signature_set_resource(application, timestamp)
            ))
        })
    }

    /// Returns both signatures of a set for comparison.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NotFound`] if the set is not live.
    pub async fn get_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> Result<SignatureSetView> {
        self.registry.get(application, timestamp).await
    }
}
