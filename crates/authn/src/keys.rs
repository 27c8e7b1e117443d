//! Ed25519 key material generation.
//!
//! Produces the key pair behind a signature set: the private half as PKCS#8
//! DER (what [`jsonwebtoken::EncodingKey::from_ed_der`] consumes) and the
//! public half as a [`Signature`], the base64url form that both the identity
//! manager and applications exchange.
//!
//! Entropy comes from the operating system. A failing entropy source is
//! reported as [`AuthError::KeyGeneration`] and is not retried.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::{SECRET_KEY_LENGTH, SigningKey};
use fail::fail_point;
use rand_core::{OsRng, RngCore};
use tessera_storage::auth::{PrivateKeyDer, Signature};
use zeroize::Zeroizing;

use crate::error::AuthError;

/// PKCS#8 v1 prefix for an Ed25519 private key (RFC 8410). The 32-byte seed
/// follows.
const PKCS8_ED25519_PREFIX: [u8; 16] = [
    0x30, 0x2e, // SEQUENCE, 46 bytes
    0x02, 0x01, 0x00, // INTEGER version 0
    0x30, 0x05, // SEQUENCE, 5 bytes (algorithm identifier)
    0x06, 0x03, 0x2b, 0x65, 0x70, // OID 1.3.101.112 (Ed25519)
    0x04, 0x22, // OCTET STRING, 34 bytes
    0x04, 0x20, // OCTET STRING, 32 bytes (the seed)
];

/// Length of an encoded Ed25519 PKCS#8 private key.
pub const PKCS8_ED25519_LEN: usize = PKCS8_ED25519_PREFIX.len() + SECRET_KEY_LENGTH;

/// A freshly generated key pair.
#[derive(Debug)]
pub struct KeyMaterial {
    /// Private key, PKCS#8 DER.
    pub private_key: PrivateKeyDer,
    /// Public key as a signature value.
    pub signature: Signature,
}

impl KeyMaterial {
    /// Generates a key pair from operating-system entropy.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyGeneration`] if the entropy source fails.
    pub fn generate() -> Result<Self, AuthError> {
        fail_point!("key-generation-entropy", |_| {
            Err(AuthError::key_generation("injected entropy failure"))
        });

        let mut seed = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
        OsRng
            .try_fill_bytes(&mut seed[..])
            .map_err(|e| AuthError::key_generation(format!("entropy source failed: {e}")))?;
        Ok(Self::from_seed(&seed))
    }

    /// Derives the key pair for a known seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);

        let mut der = Zeroizing::new(Vec::with_capacity(PKCS8_ED25519_LEN));
        der.extend_from_slice(&PKCS8_ED25519_PREFIX);
        der.extend_from_slice(seed);

        Self {
            private_key: PrivateKeyDer::new(der),
            signature: signature_of_signing_key(&signing_key),
        }
    }
}

fn signature_of_signing_key(signing_key: &SigningKey) -> Signature {
    Signature::new(URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes()))
}

/// Recomputes the signature of a stored private key.
///
/// This is how the identity-manager signature is derived from a signature
/// set's own key material.
///
/// # Errors
///
/// Returns [`AuthError::InvalidPublicKey`] if `private_key` is not an
/// Ed25519 PKCS#8 v1 encoding.
pub fn signature_of(private_key: &PrivateKeyDer) -> Result<Signature, AuthError> {
    let der = private_key.as_bytes();
    let seed = der
        .strip_prefix(&PKCS8_ED25519_PREFIX[..])
        .ok_or_else(|| AuthError::invalid_public_key("private key is not Ed25519 PKCS#8"))?;
    let seed: Zeroizing<[u8; SECRET_KEY_LENGTH]> =
        Zeroizing::new(seed.try_into().map_err(|_| {
            AuthError::invalid_public_key(format!(
                "expected {SECRET_KEY_LENGTH}-byte seed, got {}",
                seed.len()
            ))
        })?);
    Ok(signature_of_signing_key(&SigningKey::from_bytes(&seed)))
}
