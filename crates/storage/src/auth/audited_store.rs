//! Audit-logging decorator for [`SignatureSetStore`] implementations.
//!
//! Wraps any store to emit an [`AuditEvent`] for every mutation and every
//! single-set read, without modifying the underlying store.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use super::{
    audit::{
        AuditAction, AuditEvent, AuditLogger, AuditResult, application_resource,
        signature_set_resource,
    },
    signature_set::{Signature, SignatureSet},
    store::SignatureSetStore,
};
use crate::{
    error::StorageResult,
    types::{ApplicationId, KeyTimestamp},
};

/// Decorator that adds audit logging to any [`SignatureSetStore`].
///
/// # Usage
///
/// ```no_run
/// use tessera_storage::auth::audited_store::AuditedSignatureSetStore;
/// use tessera_storage::auth::audit::TracingAuditLogger;
/// use tessera_storage::auth::MemorySignatureSetStore;
///
/// let store = MemorySignatureSetStore::new();
/// let audited = AuditedSignatureSetStore::new(store, TracingAuditLogger, "system");
/// ```
pub struct AuditedSignatureSetStore<S, L> {
    inner: S,
    logger: L,
    actor: Arc<str>,
}

impl<S, L> AuditedSignatureSetStore<S, L>
where
    S: SignatureSetStore,
    L: AuditLogger,
{
    /// Creates a new audited store wrapping the given store and logger.
    pub fn new(inner: S, logger: L, actor: impl Into<Arc<str>>) -> Self {
        Self { inner, logger, actor: actor.into() }
    }

    /// Returns a reference to the inner store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn emit(
        &self,
        action: AuditAction,
        resource: String,
        result: AuditResult,
        metadata: HashMap<String, String>,
    ) {
        let event = AuditEvent::builder()
            .actor(self.actor.to_string())
            .action(action)
            .resource(resource)
            .result(result)
            .metadata(metadata)
            .build();
        self.logger.log(&event).await;
    }

    fn result_from<T>(res: &StorageResult<T>) -> AuditResult {
        match res {
            Ok(_) => AuditResult::Success,
            Err(e) => AuditResult::Failure(e.to_string()),
        }
    }
}

#[async_trait]
impl<S, L> SignatureSetStore for AuditedSignatureSetStore<S, L>
where
    S: SignatureSetStore,
    L: AuditLogger,
{
    async fn create_signature_set(
        &self,
        application: &ApplicationId,
        set: SignatureSet,
    ) -> StorageResult<()> {
        let resource = signature_set_resource(application, set.timestamp);
        let res = self.inner.create_signature_set(application, set).await;
        self.emit(
            AuditAction::CreateSignatureSet,
            resource,
            Self::result_from(&res),
            HashMap::new(),
        )
        .await;
        res
    }

    async fn list_signature_sets(
        &self,
        application: &ApplicationId,
    ) -> StorageResult<Vec<KeyTimestamp>> {
        // Listing exposes no key material; not individually audited.
        self.inner.list_signature_sets(application).await
    }

    async fn get_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> StorageResult<Option<SignatureSet>> {
        let res = self.inner.get_signature_set(application, timestamp).await;
        let mut metadata = HashMap::new();
        if let Ok(ref opt) = res {
            metadata.insert("found".to_owned(), opt.is_some().to_string());
        }
        self.emit(
            AuditAction::AccessSignatureSet,
            signature_set_resource(application, timestamp),
            Self::result_from(&res),
            metadata,
        )
        .await;
        res
    }

    async fn latest_signature_set(
        &self,
        application: &ApplicationId,
    ) -> StorageResult<Option<SignatureSet>> {
        let res = self.inner.latest_signature_set(application).await;
        let resource = match &res {
            Ok(Some(set)) => signature_set_resource(application, set.timestamp),
            _ => application_resource(application),
        };
        self.emit(AuditAction::AccessSignatureSet, resource, Self::result_from(&res), HashMap::new())
            .await;
        res
    }

    async fn set_application_signature(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
        signature: Signature,
    ) -> StorageResult<()> {
        let res = self.inner.set_application_signature(application, timestamp, signature).await;
        self.emit(
            AuditAction::DeclareApplicationSignature,
            signature_set_resource(application, timestamp),
            Self::result_from(&res),
            HashMap::new(),
        )
        .await;
        res
    }

    async fn delete_signature_set(
        &self,
        application: &ApplicationId,
        timestamp: KeyTimestamp,
    ) -> StorageResult<bool> {
        let res = self.inner.delete_signature_set(application, timestamp).await;
        let mut metadata = HashMap::new();
        if let Ok(existed) = res {
            metadata.insert("existed".to_owned(), existed.to_string());
        }
        self.emit(
            AuditAction::DeleteSignatureSet,
            signature_set_resource(application, timestamp),
            Self::result_from(&res),
            metadata,
        )
        .await;
        res
    }

    async fn purge_application(&self, application: &ApplicationId) -> StorageResult<usize> {
        let res = self.inner.purge_application(application).await;
        let mut metadata = HashMap::new();
        if let Ok(count) = res {
            metadata.insert("set_count".to_owned(), count.to_string());
        }
        self.emit(
            AuditAction::PurgeApplication,
            application_resource(application),
            Self::result_from(&res),
            metadata,
        )
        .await;
        res
    }

    async fn reopen_application(&self, application: &ApplicationId) -> StorageResult<()> {
        let res = self.inner.reopen_application(application).await;
        self.emit(
            AuditAction::ReopenApplication,
            application_resource(application),
            Self::result_from(&res),
            HashMap::new(),
        )
        .await;
        res
    }
}
