//! Registry of known applications.
//!
//! Applications are registered by an external provisioning step and
//! identified by caller-supplied identifiers. This store only records which
//! identifiers exist; signature sets and permissions hang off the identifier
//! in their own stores.

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{error::StorageResult, types::ApplicationId};

/// Persistence of the set of registered applications.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Registers an application. Returns `false` if it was already known.
    async fn register_application(&self, application: &ApplicationId) -> StorageResult<bool>;

    /// Lists registered applications in ascending identifier order.
    async fn list_applications(&self) -> StorageResult<Vec<ApplicationId>>;

    /// Whether the application is registered.
    async fn application_exists(&self, application: &ApplicationId) -> StorageResult<bool>;

    /// Removes an application. Returns `false` if it was not registered.
    ///
    /// Cascading to signature sets and permissions is the caller's job.
    async fn delete_application(&self, application: &ApplicationId) -> StorageResult<bool>;
}

/// In-memory [`ApplicationStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryApplicationStore {
    applications: Arc<RwLock<BTreeSet<ApplicationId>>>,
}

impl MemoryApplicationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    #[tracing::instrument(skip(self))]
    async fn register_application(&self, application: &ApplicationId) -> StorageResult<bool> {
        Ok(self.applications.write().insert(application.clone()))
    }

    #[tracing::instrument(skip(self))]
    async fn list_applications(&self) -> StorageResult<Vec<ApplicationId>> {
        Ok(self.applications.read().iter().cloned().collect())
    }

    #[tracing::instrument(skip(self))]
    async fn application_exists(&self, application: &ApplicationId) -> StorageResult<bool> {
        Ok(self.applications.read().contains(application))
    }

    #[tracing::instrument(skip(self))]
    async fn delete_application(&self, application: &ApplicationId) -> StorageResult<bool> {
        Ok(self.applications.write().remove(application))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn app(id: &str) -> ApplicationId {
        ApplicationId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let store = MemoryApplicationStore::new();
        assert!(store.register_application(&app("office")).await.unwrap());
        assert!(!store.register_application(&app("office")).await.unwrap());
        assert_eq!(store.list_applications().await.unwrap(), vec![app("office")]);
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = MemoryApplicationStore::new();
        for id in ["zeta", "identity", "billing"] {
            store.register_application(&app(id)).await.unwrap();
        }
        let listed = store.list_applications().await.unwrap();
        assert_eq!(listed, vec![app("billing"), app("identity"), app("zeta")]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryApplicationStore::new();
        store.register_application(&app("office")).await.unwrap();

        assert!(store.delete_application(&app("office")).await.unwrap());
        assert!(!store.application_exists(&app("office")).await.unwrap());
        assert!(!store.delete_application(&app("office")).await.unwrap());
    }
}
