//! Signed token verification and claims extraction.
//!
//! Tokens are compact JWS structures (`header.payload.signature`). A token is
//! trusted only after its signature checks out against the pinned
//! [`SignerCertificate`] and its `exp`/`nbf` window, where stated, contains the
//! current time.

use std::collections::HashMap;
use std::str::FromStr;

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{alphabet, Engine};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::{Deserialize, Serialize};

use trustline_core::{normalize, NormalizedClaims};

use crate::error::{AuthError, ExpiryReason, Result};
use crate::signer::SignerCertificate;

/// Base64url that tolerates both padded and unpadded segments.
const SEGMENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Claim key under which the token subject is normalized.
const SUBJECT_CLAIM: &str = "subject";

/// Verified claims extracted from a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenClaims {
    /// The `sub` claim, empty if absent.
    pub subject: String,
    /// Identity-provider category that produced the claims.
    pub realm: String,
    /// Free-form identity attributes.
    pub data: HashMap<String, String>,
    /// The `iss` claim, uninterpreted.
    pub issuer: Option<String>,
    /// The `aud` claim, uninterpreted.
    pub audience: Audience,
    /// When the token expires, if stated.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the token becomes valid, if stated.
    pub not_before: Option<DateTime<Utc>>,
    /// When the token was issued, if stated.
    pub issued_at: Option<DateTime<Utc>>,
}

impl TokenClaims {
    /// Flatten the subject and data attributes into normalized claims.
    #[must_use]
    pub fn normalized(&self) -> NormalizedClaims {
        flatten(&self.subject, &self.data)
    }
}

/// Audience claim that can be either a string or array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience.
    Single(String),
    /// Several audiences.
    Multiple(Vec<String>),
    /// No audience claim.
    #[default]
    None,
}

impl Audience {
    /// Returns `true` if `value` is one of the audiences.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::Single(s) => s == value,
            Self::Multiple(v) => v.iter().any(|s| s == value),
            Self::None => false,
        }
    }
}

/// Raw payload of a token before any checks.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Audience,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    realm: Option<String>,
    #[serde(default)]
    data: Option<HashMap<String, String>>,
}

impl RawClaims {
    fn normalized(&self) -> NormalizedClaims {
        let empty = HashMap::new();
        flatten(
            self.sub.as_deref().unwrap_or_default(),
            self.data.as_ref().unwrap_or(&empty),
        )
    }
}

/// Only the algorithm is read from the header before verification.
#[derive(Debug, Deserialize)]
struct RawHeader {
    alg: String,
}

/// Verifies tokens against a pinned signer certificate.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    signer: SignerCertificate,
}

impl TokenVerifier {
    /// Create a verifier pinned to the given signer.
    #[must_use]
    pub const fn new(signer: SignerCertificate) -> Self {
        Self { signer }
    }

    /// The pinned signer certificate.
    #[must_use]
    pub const fn signer(&self) -> &SignerCertificate {
        &self.signer
    }

    /// Verify a token and return its structured claims.
    ///
    /// # Errors
    ///
    /// Returns `Decode` for a malformed token, `Signature` for a rejected
    /// algorithm or signature, and `Expiry` if the current time is outside the
    /// token's validity window.
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as of `now`.
    ///
    /// # Errors
    ///
    /// Same as [`TokenVerifier::verify`].
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims> {
        let algorithm = self.check_algorithm(token)?;

        let mut validation = Validation::new(algorithm);
        validation.algorithms = self.signer.algorithms().to_vec();
        // Temporal claims are checked below without leeway.
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;

        let token_data = decode::<RawClaims>(token, self.signer.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => {
                    AuthError::Signature("signature does not match signer certificate".to_string())
                }
                ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidRsaKey(_) => AuthError::Signature(e.to_string()),
                _ => AuthError::Decode(e.to_string()),
            })?;

        let claims = token_data.claims;
        let now_secs = now.timestamp();

        if claims.exp.is_some_and(|exp| exp <= now_secs) {
            return Err(AuthError::Expiry(ExpiryReason::Expired));
        }
        if claims.nbf.is_some_and(|nbf| nbf > now_secs) {
            return Err(AuthError::Expiry(ExpiryReason::NotYetValid));
        }

        Ok(TokenClaims {
            subject: claims.sub.unwrap_or_default(),
            realm: claims.realm.unwrap_or_default(),
            data: claims.data.unwrap_or_default(),
            issuer: claims.iss,
            audience: claims.aud,
            expires_at: claims.exp.map(|t| timestamp("exp", t)).transpose()?,
            not_before: claims.nbf.map(|t| timestamp("nbf", t)).transpose()?,
            issued_at: claims.iat.map(|t| timestamp("iat", t)).transpose()?,
        })
    }

    /// Verify a token and return its normalized `@auth:` claims.
    ///
    /// # Errors
    ///
    /// Same as [`TokenVerifier::verify`].
    pub fn verify_signature(&self, token: &str) -> Result<NormalizedClaims> {
        self.verify(token).map(|claims| claims.normalized())
    }

    /// Reject unsigned tokens and algorithms outside the signer's key family.
    fn check_algorithm(&self, token: &str) -> Result<Algorithm> {
        let [header, _, _] = segments(token)?;
        let header: RawHeader = decode_segment(header, "header")?;

        if header.alg.eq_ignore_ascii_case("none") {
            return Err(AuthError::Signature(
                "unsigned tokens are not accepted".to_string(),
            ));
        }

        let algorithm = Algorithm::from_str(&header.alg).map_err(|_| {
            AuthError::Signature(format!("unsupported signing algorithm '{}'", header.alg))
        })?;

        if !self.signer.algorithms().contains(&algorithm) {
            tracing::debug!(alg = %header.alg, "Token algorithm does not match signer key");
            return Err(AuthError::Signature(format!(
                "signing algorithm '{}' does not match signer certificate",
                header.alg
            )));
        }

        Ok(algorithm)
    }
}

/// Decode a token's claims **without verifying its signature**.
///
/// The result is untrusted: anyone can mint a token with arbitrary claims, so
/// the output must never be used to authorize anything. It exists for display
/// and debugging only. No temporal checks are made either.
///
/// # Errors
///
/// Returns `Decode` if the token is not a structurally valid compact JWS.
pub fn unsafe_claims(token: &str) -> Result<NormalizedClaims> {
    let [_, payload, _] = segments(token)?;
    let claims: RawClaims = decode_segment(payload, "payload")?;
    Ok(claims.normalized())
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// # Errors
///
/// Returns `MissingHeader` if no header was supplied and `InvalidHeader` if it
/// is not exactly `Bearer <token>`.
pub fn extract_bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    match header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(AuthError::InvalidHeader),
    }
}

fn flatten(subject: &str, data: &HashMap<String, String>) -> NormalizedClaims {
    let mut attributes: HashMap<&str, &str> = data
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if !subject.is_empty() {
        attributes.insert(SUBJECT_CLAIM, subject);
    }
    normalize(attributes)
}

fn segments(token: &str) -> Result<[&str; 3]> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok([header, payload, signature]),
        _ => Err(AuthError::Decode(
            "token must have three dot-separated segments".to_string(),
        )),
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str, name: &str) -> Result<T> {
    let bytes = SEGMENT_ENGINE
        .decode(segment)
        .map_err(|e| AuthError::Decode(format!("invalid base64 in token {name}: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Decode(format!("invalid token {name}: {e}")))
}

fn timestamp(claim: &str, secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::Decode(format!("invalid {claim} timestamp")))
}
