//! Access tokens signed by signature sets.
//!
//! Tokens are EdDSA JWTs. The header `kid` is the [`KeyTimestamp`] of the
//! signature set whose private key signed the token, and `iss` names the
//! application owning that set, so a verifier can find the exact key without
//! trying every live set.
//!
//! ```json
//! // header
//! { "alg": "EdDSA", "typ": "JWT", "kid": "2024-01-15T10_30_00" }
//! // claims
//! {
//!   "iss": "identity-v1",
//!   "sub": "alice",
//!   "aud": "tessera",
//!   "iat": 1705314600,
//!   "exp": 1705318200,
//!   "pgi": "documents"
//! }
//! ```
//!
//! # Example
//!
//! ```no_run
//! // Requires a stored signature set with a real Ed25519 key.
//! use tessera_authn::token::{decode_token_claims, decode_token_header};
//!
//! # fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let header = decode_token_header(token)?;
//! let claims = decode_token_claims(token)?;
//! println!("kid {:?} issued by {}", header.kid, claims.iss);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use tessera_storage::{
    ApplicationId, KeyTimestamp, PermittableGroupId, StorageError, UserId, auth::SignatureSet,
};

use crate::error::AuthError;

/// Token claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer: the application whose signature set signed the token.
    pub iss: String,
    /// Subject: the user identifier.
    pub sub: String,
    /// Audience.
    pub aud: String,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Expiration time (seconds since epoch).
    pub exp: u64,
    /// Permittable group the token is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pgi: Option<String>,
}

impl TokenClaims {
    /// Builds claims for `user`, valid for `ttl` from `issued_at`.
    #[must_use]
    pub fn new(
        application: &ApplicationId,
        user: &UserId,
        audience: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let iat = u64::try_from(issued_at.timestamp()).unwrap_or(0);
        Self {
            iss: application.to_string(),
            sub: user.to_string(),
            aud: audience.into(),
            iat,
            exp: iat.saturating_add(ttl.as_secs()),
            pgi: None,
        }
    }

    /// Restricts the token to one permittable group.
    #[must_use]
    pub fn with_permittable_group(mut self, group: &PermittableGroupId) -> Self {
        self.pgi = Some(group.to_string());
        self
    }

    /// Parses `iss` as an application identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTokenFormat`] if `iss` is not a valid
    /// identifier.
    pub fn application(&self) -> Result<ApplicationId, AuthError> {
        ApplicationId::new(self.iss.as_str()).map_err(claim_error("iss"))
    }

    /// Parses `sub` as a user identifier.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTokenFormat`] if `sub` is not a valid
    /// identifier.
    pub fn user(&self) -> Result<UserId, AuthError> {
        UserId::new(self.sub.as_str()).map_err(claim_error("sub"))
    }

    /// Parses `pgi`, if present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTokenFormat`] if `pgi` is present but not
    /// a valid identifier.
    pub fn permittable_group(&self) -> Result<Option<PermittableGroupId>, AuthError> {
        self.pgi
            .as_deref()
            .map(|g| PermittableGroupId::new(g).map_err(claim_error("pgi")))
            .transpose()
    }
}

fn claim_error(claim: &'static str) -> impl Fn(StorageError) -> AuthError {
    move |e| AuthError::invalid_token_format(format!("claim '{claim}' is invalid: {e}"))
}

/// Signs `claims` with a signature set's private key.
///
/// The header `kid` is the set's timestamp.
///
/// # Errors
///
/// Returns an error if the private key cannot be used for EdDSA signing.
pub fn issue_token(set: &SignatureSet, claims: &TokenClaims) -> Result<String, AuthError> {
    let mut header = Header::new(Algorithm::EdDSA);
    header.kid = Some(set.timestamp.to_string());

    let encoding_key = EncodingKey::from_ed_der(set.private_key.as_bytes());
    jsonwebtoken::encode(&header, claims, &encoding_key).map_err(AuthError::from)
}

/// Decodes the token header without verification.
///
/// # Errors
///
/// Returns an error if the header cannot be decoded.
pub fn decode_token_header(token: &str) -> Result<Header, AuthError> {
    decode_header(token)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to decode JWT header: {e}")))
}

/// Decodes the token claims without verification.
///
/// Used to find the signing application before any key is loaded.
///
/// # Errors
///
/// Returns an error if:
/// - The token does not have exactly 3 parts
/// - The payload cannot be base64-decoded or parsed as claims
/// - `iss`, `sub` or `aud` is empty
pub fn decode_token_claims(token: &str) -> Result<TokenClaims, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::invalid_token_format("JWT must have 3 parts separated by dots"));
    }

    let payload_bytes = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|e| {
        AuthError::invalid_token_format(format!("Failed to decode JWT payload: {e}"))
    })?;

    let claims: TokenClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to parse JWT claims: {e}")))?;

    if claims.iss.is_empty() {
        return Err(AuthError::missing_claim("iss"));
    }
    if claims.sub.is_empty() {
        return Err(AuthError::missing_claim("sub"));
    }
    if claims.aud.is_empty() {
        return Err(AuthError::missing_claim("aud"));
    }

    Ok(claims)
}

/// Verifies the token signature and expiry against a decoding key.
///
/// `audience` is enforced when given.
///
/// # Errors
///
/// Returns [`AuthError::InvalidSignature`], [`AuthError::TokenExpired`] or
/// [`AuthError::InvalidAudience`] when the respective check fails.
pub fn verify_signature(
    token: &str,
    key: &DecodingKey,
    audience: Option<&str>,
) -> Result<TokenClaims, AuthError> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    validation.validate_exp = true;
    validation.validate_nbf = false;
    validation.leeway = 0;
    match audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<TokenClaims>(token, key, &validation)?;
    Ok(token_data.claims)
}

/// Returns the `kid` header as a key timestamp.
///
/// # Errors
///
/// Returns [`AuthError::InvalidTokenFormat`] if the header has no `kid` or
/// it is not a key timestamp.
pub fn key_timestamp(header: &Header) -> Result<KeyTimestamp, AuthError> {
    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| AuthError::invalid_token_format("JWT header missing 'kid' field"))?;
    crate::validation::parse_kid(kid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::TimeZone;
    use tessera_storage::auth::SignatureSet;

    use super::*;
    use crate::keys::KeyMaterial;

    fn make_set(ts: &str) -> (SignatureSet, DecodingKey) {
        let material = KeyMaterial::generate().unwrap();
        let decoding = DecodingKey::from_ed_components(&material.signature.public_key).unwrap();
        let set = SignatureSet::builder()
            .timestamp(ts.parse().unwrap())
            .private_key(material.private_key)
            .identity_manager_signature(material.signature)
            .build();
        (set, decoding)
    }

    fn claims(ttl: Duration) -> TokenClaims {
        TokenClaims::new(
            &ApplicationId::new("identity-v1").unwrap(),
            &UserId::new("alice").unwrap(),
            "tessera",
            Utc::now(),
            ttl,
        )
    }

    #[test]
    fn test_claims_new() {
        let issued = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let c = TokenClaims::new(
            &ApplicationId::new("office").unwrap(),
            &UserId::new("bob").unwrap(),
            "aud",
            issued,
            Duration::from_secs(3600),
        );
        assert_eq!(c.iat, 1_705_314_600);
        assert_eq!(c.exp, 1_705_318_200);
        assert_eq!(c.application().unwrap().as_str(), "office");
        assert_eq!(c.user().unwrap().as_str(), "bob");
        assert!(c.permittable_group().unwrap().is_none());
    }

    #[test]
    fn test_issue_sets_kid_and_round_trips() {
        let (set, decoding) = make_set("2024-01-15T10_30_00");
        let group = PermittableGroupId::new("documents").unwrap();
        let original = claims(Duration::from_secs(600)).with_permittable_group(&group);

        let token = issue_token(&set, &original).unwrap();

        let header = decode_token_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);
        assert_eq!(key_timestamp(&header).unwrap(), set.timestamp);
        assert_eq!(decode_token_claims(&token).unwrap(), original);

        let verified = verify_signature(&token, &decoding, Some("tessera")).unwrap();
        assert_eq!(verified.permittable_group().unwrap(), Some(group));
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let (set, _) = make_set("2024-01-15T10_30_00");
        let (_, other_decoding) = make_set("2024-01-15T10_30_01");
        let token = issue_token(&set, &claims(Duration::from_secs(600))).unwrap();

        let result = verify_signature(&token, &other_decoding, None);
        assert!(matches!(result, Err(AuthError::InvalidSignature)), "got {result:?}");
    }

    #[test]
    fn test_verify_rejects_expired() {
        let (set, decoding) = make_set("2024-01-15T10_30_00");
        let mut expired = claims(Duration::from_secs(600));
        expired.iat -= 7200;
        expired.exp = expired.iat + 60;
        let token = issue_token(&set, &expired).unwrap();

        let result = verify_signature(&token, &decoding, None);
        assert!(matches!(result, Err(AuthError::TokenExpired)), "got {result:?}");
    }

    #[test]
    fn test_verify_rejects_wrong_audience() {
        let (set, decoding) = make_set("2024-01-15T10_30_00");
        let token = issue_token(&set, &claims(Duration::from_secs(600))).unwrap();

        let result = verify_signature(&token, &decoding, Some("someone-else"));
        assert!(matches!(result, Err(AuthError::InvalidAudience { .. })), "got {result:?}");
    }

    #[test]
    fn test_decode_claims_malformed_parts() {
        assert!(decode_token_claims("only.two").is_err());
        assert!(decode_token_claims("too.many.parts.here").is_err());
        assert!(decode_token_header("not.a.jwt").is_err());
    }

    #[test]
    fn test_decode_claims_requires_issuer() {
        let payload = URL_SAFE_NO_PAD.encode(br#"{"iss":"","sub":"a","aud":"b","iat":1,"exp":2}"#);
        let token = format!("e30.{payload}.sig");
        assert!(matches!(decode_token_claims(&token), Err(AuthError::MissingClaim { .. })));
    }

    #[test]
    fn test_invalid_identifier_claims_are_rejected() {
        let mut c = claims(Duration::from_secs(60));
        c.sub = "ali ce".to_owned();
        c.pgi = Some("docs/*".to_owned());
        assert!(matches!(c.user(), Err(AuthError::InvalidTokenFormat { .. })));
        assert!(matches!(c.permittable_group(), Err(AuthError::InvalidTokenFormat { .. })));
    }

    #[test]
    fn test_key_timestamp_requires_kid() {
        let header = Header::new(Algorithm::EdDSA);
        assert!(matches!(key_timestamp(&header), Err(AuthError::InvalidTokenFormat { .. })));
    }
}
