//! Signature-set types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::types::KeyTimestamp;

/// Public half of a key pair, as exchanged between the identity manager and
/// applications.
///
/// Holds the raw 32-byte Ed25519 public key encoded as base64url without
/// padding (43 characters, RFC 7515 conventions). Two signatures are equal
/// exactly when they name the same key pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signature {
    /// Ed25519 public key, base64url-encoded without padding.
    pub public_key: String,
}

impl Signature {
    /// Wraps an already-encoded public key.
    #[must_use]
    pub fn new(public_key: impl Into<String>) -> Self {
        Self { public_key: public_key.into() }
    }
}

/// PKCS#8 DER encoding of an Ed25519 private key.
///
/// Scrubbed from memory on drop. `Debug` never prints the bytes and the type
/// deliberately implements neither `Serialize` nor `Display`.
#[derive(Clone)]
pub struct PrivateKeyDer(Zeroizing<Vec<u8>>);

impl PrivateKeyDer {
    /// Takes ownership of DER bytes.
    #[must_use]
    pub fn new(der: Zeroizing<Vec<u8>>) -> Self {
        Self(der)
    }

    /// Borrows the DER bytes, e.g. for building a token encoding key.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PrivateKeyDer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyDer([REDACTED])")
    }
}

/// A timestamped key pair plus its two recorded signature values.
///
/// # Lifecycle
///
/// - Created with `application_signature == None`.
/// - `application_signature` is set by an explicit declaration and may be
///   overwritten by a later one.
/// - Deleted irreversibly; the timestamp is never reissued for the same
///   application.
///
/// The private key never leaves the store except to sign tokens, so this
/// type is not serializable. Use [`SignatureSetView`] for anything that
/// crosses a boundary.
#[derive(Clone, Debug, bon::Builder)]
pub struct SignatureSet {
    /// Creation time; unique and strictly increasing per application.
    pub timestamp: KeyTimestamp,

    /// Private half of the key pair.
    pub private_key: PrivateKeyDer,

    /// Signature computed from this set's own key pair.
    pub identity_manager_signature: Signature,

    /// Signature declared by the owning application, if any.
    pub application_signature: Option<Signature>,

    /// Wall-clock instant the set was stored.
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
}

impl SignatureSet {
    /// Returns the public projection of this set.
    #[must_use]
    pub fn view(&self) -> SignatureSetView {
        SignatureSetView {
            timestamp: self.timestamp,
            identity_manager_signature: self.identity_manager_signature.clone(),
            application_signature: self.application_signature.clone(),
        }
    }
}

/// Public projection of a [`SignatureSet`]: both signatures, no private key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSetView {
    /// Creation time of the set.
    pub timestamp: KeyTimestamp,
    /// Signature computed from the set's own key pair.
    pub identity_manager_signature: Signature,
    /// Signature declared by the owning application, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_signature: Option<Signature>,
}
