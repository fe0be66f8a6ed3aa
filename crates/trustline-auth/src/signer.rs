//! Pinned signer certificates.
//!
//! Tokens are verified against the public key of a single pinned certificate.
//! The certificate is never used to open a connection and its validity period
//! and issuer are not checked here; only its key matters.

use std::fmt;

use jsonwebtoken::{Algorithm, DecodingKey};
use x509_parser::parse_x509_certificate;
use x509_parser::pem::parse_x509_pem;

use crate::error::{AuthError, CredentialField, Result};

const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
const OID_ED25519: &str = "1.3.101.112";

/// Uncompressed SEC1 point lengths.
const P256_POINT_LEN: usize = 65;
const P384_POINT_LEN: usize = 97;

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// A certificate whose public key verifies token signatures.
#[derive(Clone)]
pub struct SignerCertificate {
    der: Vec<u8>,
    key: DecodingKey,
    algorithms: Vec<Algorithm>,
}

impl SignerCertificate {
    /// Load a signer certificate from a PEM `CERTIFICATE` block.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error if the input is not a PEM certificate or its key
    /// type is unsupported.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let (_, block) =
            parse_x509_pem(pem).map_err(|e| signer_error(format!("invalid PEM: {e}")))?;
        if block.label != "CERTIFICATE" {
            return Err(signer_error(format!(
                "expected a CERTIFICATE block, found '{}'",
                block.label
            )));
        }
        Self::from_der(&block.contents)
    }

    /// Load a signer certificate from DER bytes.
    ///
    /// # Errors
    ///
    /// Returns a `Parse` error if the certificate cannot be parsed or its key
    /// type is unsupported.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = parse_x509_certificate(der)
            .map_err(|e| signer_error(format!("invalid certificate: {e}")))?;

        let spki = cert.public_key();
        let key_bits: &[u8] = &spki.subject_public_key.data;
        let oid = spki.algorithm.algorithm.to_id_string();

        let (key, algorithms) = match oid.as_str() {
            OID_EC_PUBLIC_KEY => match key_bits.len() {
                P256_POINT_LEN => (DecodingKey::from_ec_der(key_bits), vec![Algorithm::ES256]),
                P384_POINT_LEN => (DecodingKey::from_ec_der(key_bits), vec![Algorithm::ES384]),
                other => {
                    return Err(signer_error(format!(
                        "unsupported elliptic curve point length {other}"
                    )));
                }
            },
            OID_RSA_ENCRYPTION => (DecodingKey::from_rsa_der(key_bits), RSA_ALGORITHMS.to_vec()),
            OID_ED25519 => (DecodingKey::from_ed_der(key_bits), vec![Algorithm::EdDSA]),
            other => {
                tracing::warn!(oid = other, "Unsupported signer key type");
                return Err(signer_error(format!("unsupported public key algorithm {other}")));
            }
        };

        tracing::debug!(?algorithms, "Loaded signer certificate");

        Ok(Self {
            der: der.to_vec(),
            key,
            algorithms,
        })
    }

    /// The signing algorithms this certificate's key can verify.
    #[must_use]
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    /// The DER encoding of the certificate.
    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub(crate) const fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SignerCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerCertificate")
            .field("der_len", &self.der.len())
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

fn signer_error(reason: String) -> AuthError {
    AuthError::parse(CredentialField::SignerCertificate, reason)
}
