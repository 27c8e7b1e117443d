//! Token verification against live signature sets.
//!
//! # Architecture
//!
//! ```text
//! JWT arrives → decode header + claims (unverified)
//!              → validate algorithm and kid shape
//!              → signature set still live? (store lookup, no caching)
//!              → decoding key for its public key (memoized)
//!              → verify signature, exp and aud
//!              → enablement flag for (iss, group, sub), when scoped access is asked for
//! ```
//!
//! The existence lookup is never cached: deleting a signature set must reject
//! every verification that starts after the delete returns. Only the
//! conversion from public key to [`DecodingKey`] is memoized, keyed by the
//! public key itself, so a deleted and re-created set can never be served a
//! stale key.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{PUBLIC_KEY_LENGTH, VerifyingKey};
use fail::fail_point;
use jsonwebtoken::DecodingKey;
use moka::future::Cache;
use tessera_storage::{
    ApplicationId, KeyTimestamp, PermissionStore, PermittableGroupId, StorageError, UserId,
    Zeroizing,
    auth::{Signature, SignatureSetStore},
};

use crate::{
    error::AuthError,
    token::{TokenClaims, decode_token_claims, decode_token_header, key_timestamp, verify_signature},
    validation::validate_algorithm,
};

/// Default maximum number of memoized decoding keys.
pub const DEFAULT_DECODING_KEY_CACHE_CAPACITY: u64 = 10_000;

/// A token whose signature set is live and whose signature checks out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedToken {
    /// Application whose signature set signed the token.
    pub application: ApplicationId,
    /// Timestamp of that signature set.
    pub timestamp: KeyTimestamp,
    /// User named by the token.
    pub user: UserId,
    /// The verified claims.
    pub claims: TokenClaims,
}

/// Verifies tokens issued under signature sets.
///
/// Cloning is cheap; clones share the stores and the decoding-key cache.
#[derive(Clone)]
pub struct TokenVerifier {
    signature_sets: Arc<dyn SignatureSetStore>,
    permissions: Arc<dyn PermissionStore>,
    audience: Option<String>,
    decoding_keys: Cache<String, Arc<DecodingKey>>,
}

impl TokenVerifier {
    /// Creates a verifier reading from the given stores.
    ///
    /// `cache_capacity` bounds the number of memoized decoding keys.
    #[must_use]
    pub fn new(
        signature_sets: Arc<dyn SignatureSetStore>,
        permissions: Arc<dyn PermissionStore>,
        cache_capacity: u64,
    ) -> Self {
        Self {
            signature_sets,
            permissions,
            audience: None,
            decoding_keys: Cache::builder().max_capacity(cache_capacity).build(),
        }
    }

    /// Requires tokens to carry this audience.
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Verifies a token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidTokenFormat`] or [`AuthError::MissingClaim`] for
    ///   malformed tokens
    /// - [`AuthError::UnsupportedAlgorithm`] for anything but EdDSA
    /// - [`AuthError::SignatureSetNotFound`] if the signing set is not live
    /// - [`AuthError::InvalidSignature`], [`AuthError::TokenExpired`] or
    ///   [`AuthError::InvalidAudience`] from cryptographic verification
    /// - [`AuthError::KeyStorageError`] if the store lookup fails
    #[tracing::instrument(skip(self, token))]
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        let header = decode_token_header(token)?;
        let alg_str = format!("{:?}", header.alg);
        validate_algorithm(&alg_str)?;
        let timestamp = key_timestamp(&header)?;

        let unverified = decode_token_claims(token)?;
        let application = unverified.application()?;
        let user = unverified.user()?;

        fail_point!("verifier-before-signature-set-lookup", |_| {
            Err(AuthError::key_storage_error(StorageError::internal(
                "injected failure before signature set lookup",
            )))
        });
        let set = self
            .signature_sets
            .get_signature_set(&application, timestamp)
            .await?
            .ok_or_else(|| {
                tracing::debug!(%application, %timestamp, "token references a signature set that is not live");
                AuthError::signature_set_not_found(application.as_str(), timestamp.to_string())
            })?;

        let key = self.decoding_key(&set.identity_manager_signature).await?;
        let claims = verify_signature(token, &key, self.audience.as_deref())?;

        Ok(VerifiedToken { application, timestamp, user, claims })
    }

    /// Verifies a token and checks that its user may act in `group`.
    ///
    /// A token scoped to a group (`pgi` claim) is only honored for that
    /// group. The enablement flag is read from the issuing application's
    /// permission.
    ///
    /// # Errors
    ///
    /// Everything [`verify`](Self::verify) returns, plus:
    /// - [`AuthError::InvalidScope`] if the token is scoped to another group
    /// - [`AuthError::PermissionDisabled`] if the user's flag is off
    /// - [`AuthError::KeyStorageError`] wrapping [`StorageError::NotFound`]
    ///   if the application has no such permission
    #[tracing::instrument(skip(self, token))]
    pub async fn verify_access(
        &self,
        token: &str,
        group: &PermittableGroupId,
    ) -> Result<VerifiedToken, AuthError> {
        let verified = self.verify(token).await?;

        if let Some(scoped) = verified.claims.permittable_group()?
            && &scoped != group
        {
            return Err(AuthError::invalid_scope(format!(
                "token is scoped to '{scoped}', requested '{group}'"
            )));
        }

        let enabled =
            self.permissions.get_enabled(&verified.application, group, &verified.user).await?;
        if !enabled {
            return Err(AuthError::permission_disabled(
                verified.application.as_str(),
                group.as_str(),
                verified.user.as_str(),
            ));
        }

        Ok(verified)
    }

    /// Number of memoized decoding keys.
    pub async fn cached_key_count(&self) -> u64 {
        self.decoding_keys.run_pending_tasks().await;
        self.decoding_keys.entry_count()
    }

    async fn decoding_key(&self, signature: &Signature) -> Result<Arc<DecodingKey>, AuthError> {
        if let Some(key) = self.decoding_keys.get(&signature.public_key).await {
            tracing::trace!("decoding key cache hit");
            return Ok(key);
        }

        let key = Arc::new(to_decoding_key(signature)?);
        self.decoding_keys.insert(signature.public_key.clone(), Arc::clone(&key)).await;
        Ok(key)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("audience", &self.audience)
            .field("cached_keys", &self.decoding_keys.entry_count())
            .finish_non_exhaustive()
    }
}

/// Converts a signature (base64url Ed25519 public key) to a decoding key.
fn to_decoding_key(signature: &Signature) -> Result<DecodingKey, AuthError> {
    let public_key_bytes: Zeroizing<Vec<u8>> = Zeroizing::new(
        URL_SAFE_NO_PAD
            .decode(signature.public_key.as_bytes())
            .map_err(|e| AuthError::invalid_public_key(format!("base64 decode: {e}")))?,
    );

    if public_key_bytes.len() != PUBLIC_KEY_LENGTH {
        return Err(AuthError::invalid_public_key(format!(
            "expected {PUBLIC_KEY_LENGTH} bytes, got {}",
            public_key_bytes.len()
        )));
    }

    let key_bytes: Zeroizing<[u8; PUBLIC_KEY_LENGTH]> = Zeroizing::new(
        public_key_bytes[..PUBLIC_KEY_LENGTH]
            .try_into()
            .map_err(|_| AuthError::invalid_public_key("failed to convert bytes"))?,
    );

    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| AuthError::invalid_public_key(format!("invalid Ed25519 key: {e}")))?;

    DecodingKey::from_ed_components(&signature.public_key)
        .map_err(|e| AuthError::invalid_public_key(e.to_string()))
}
