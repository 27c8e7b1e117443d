//! User directory seam.
//!
//! Users, credentials and roles are owned by an external directory. The
//! identity core only needs to know whether a user exists before writing an
//! enablement flag or issuing a token for them.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{error::StorageResult, types::UserId};

/// Read-only view of the external user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether `user` exists.
    async fn user_exists(&self, user: &UserId) -> StorageResult<bool>;
}

#[async_trait]
impl<D: UserDirectory + ?Sized> UserDirectory for Arc<D> {
    async fn user_exists(&self, user: &UserId) -> StorageResult<bool> {
        (**self).user_exists(user).await
    }
}

/// In-memory [`UserDirectory`] for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MemoryUserDirectory {
    users: Arc<RwLock<HashSet<UserId>>>,
}

impl MemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user. Returns `false` if already present.
    pub fn register_user(&self, user: UserId) -> bool {
        self.users.write().insert(user)
    }

    /// Removes a user. Returns `false` if absent.
    pub fn remove_user(&self, user: &UserId) -> bool {
        self.users.write().remove(user)
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn user_exists(&self, user: &UserId) -> StorageResult<bool> {
        Ok(self.users.read().contains(user))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_remove() {
        let directory = MemoryUserDirectory::new();
        let alice = UserId::new("alice").unwrap();

        assert!(!directory.user_exists(&alice).await.unwrap());
        assert!(directory.register_user(alice.clone()));
        assert!(!directory.register_user(alice.clone()));
        assert!(directory.user_exists(&alice).await.unwrap());

        let shared: Arc<dyn UserDirectory> = Arc::new(directory.clone());
        assert!(shared.user_exists(&alice).await.unwrap());

        assert!(directory.remove_user(&alice));
        assert!(!shared.user_exists(&alice).await.unwrap());
    }
}
