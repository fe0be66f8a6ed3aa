//! Application credential bundles.
//!
//! A bundle is a JSON document holding three base64-encoded PEM blobs: a
//! client certificate, its private key and the CA chain that anchors the
//! issuing service. Parsing it yields a mutual-TLS client configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rustls::pki_types::pem::{self, PemObject};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use serde::Deserialize;

use crate::error::{AuthError, CredentialField, Result};

/// Wire form of a bundle.
#[derive(Deserialize)]
struct RawBundle {
    certificate: String,
    #[serde(rename = "certificateKey")]
    certificate_key: String,
    #[serde(rename = "certificateAuthority")]
    certificate_authority: String,
}

/// Decoded PEM material from an application credential bundle.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    certificate: Vec<u8>,
    certificate_key: Vec<u8>,
    certificate_authority: Vec<u8>,
}

impl CredentialBundle {
    /// Parse a JSON bundle into its PEM material and a TLS client configuration.
    ///
    /// # Errors
    ///
    /// Returns `Decode` if the JSON is malformed, and a `Parse` error naming the
    /// offending field if any base64, PEM or key material is invalid.
    pub fn parse(bytes: &[u8]) -> Result<(Self, TlsClientConfig)> {
        let raw: RawBundle = serde_json::from_slice(bytes)
            .map_err(|e| AuthError::Decode(format!("invalid credential bundle: {e}")))?;

        let bundle = Self {
            certificate: decode_field(CredentialField::Certificate, &raw.certificate)?,
            certificate_key: decode_field(CredentialField::CertificateKey, &raw.certificate_key)?,
            certificate_authority: decode_field(
                CredentialField::CertificateAuthority,
                &raw.certificate_authority,
            )?,
        };

        let tls = bundle.tls_config()?;
        Ok((bundle, tls))
    }

    /// PEM bytes of the client certificate.
    #[must_use]
    pub fn certificate_pem(&self) -> &[u8] {
        &self.certificate
    }

    /// PEM bytes of the client private key.
    #[must_use]
    pub fn certificate_key_pem(&self) -> &[u8] {
        &self.certificate_key
    }

    /// PEM bytes of the CA chain.
    #[must_use]
    pub fn certificate_authority_pem(&self) -> &[u8] {
        &self.certificate_authority
    }

    fn tls_config(&self) -> Result<TlsClientConfig> {
        let chain = certificates(&self.certificate)
            .map_err(|reason| AuthError::parse(CredentialField::Certificate, reason))?;
        let key = private_key(&self.certificate_key)?;

        let mut roots = RootCertStore::empty();
        let authorities = certificates(&self.certificate_authority)
            .map_err(|reason| AuthError::parse(CredentialField::CertificateAuthority, reason))?;
        for authority in authorities {
            roots
                .add(authority)
                .map_err(|e| AuthError::parse(CredentialField::CertificateAuthority, e.to_string()))?;
        }
        let roots = Arc::new(roots);

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| AuthError::Internal(format!("TLS provider: {e}")))?
            .with_root_certificates(Arc::clone(&roots))
            .with_client_auth_cert(chain.clone(), key)
            .map_err(|e| AuthError::parse(CredentialField::Certificate, e.to_string()))?;

        tracing::debug!(
            chain_len = chain.len(),
            roots = roots.len(),
            "Parsed credential bundle"
        );

        Ok(TlsClientConfig {
            chain,
            roots,
            config: Arc::new(config),
        })
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("certificate", &String::from_utf8_lossy(&self.certificate))
            .field("certificate_key", &"[REDACTED]")
            .field(
                "certificate_authority",
                &String::from_utf8_lossy(&self.certificate_authority),
            )
            .finish()
    }
}

/// Mutual-TLS client configuration built from a bundle.
#[derive(Clone)]
pub struct TlsClientConfig {
    chain: Vec<CertificateDer<'static>>,
    roots: Arc<RootCertStore>,
    config: Arc<ClientConfig>,
}

impl TlsClientConfig {
    /// The client certificate chain, leaf first.
    #[must_use]
    pub fn certificate_chain(&self) -> &[CertificateDer<'static>] {
        &self.chain
    }

    /// Trust anchors taken from the bundle's CA field.
    #[must_use]
    pub fn root_store(&self) -> &RootCertStore {
        &self.roots
    }

    /// The rustls client configuration presenting the client certificate.
    #[must_use]
    pub fn client_config(&self) -> Arc<ClientConfig> {
        Arc::clone(&self.config)
    }

    /// Build an HTTP client that authenticates with the bundle's certificate.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the client cannot be constructed.
    pub fn http_client(&self, timeout: Duration) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .use_preconfigured_tls(ClientConfig::clone(&self.config))
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("HTTP client: {e}")))
    }
}

impl fmt::Debug for TlsClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsClientConfig")
            .field("chain_len", &self.chain.len())
            .field("roots", &self.roots.len())
            .finish_non_exhaustive()
    }
}

fn decode_field(field: CredentialField, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| AuthError::undecodable(field, e.to_string()))
}

fn certificates(pem_bytes: &[u8]) -> std::result::Result<Vec<CertificateDer<'static>>, String> {
    let certs = CertificateDer::pem_slice_iter(pem_bytes)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    if certs.is_empty() {
        return Err("failed to find any PEM data in certificate input".to_string());
    }
    Ok(certs)
}

fn private_key(pem_bytes: &[u8]) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_slice(pem_bytes).map_err(|e| {
        let reason = match e {
            pem::Error::NoItemsFound => format!(
                "could not read key data from bytes: '{}'",
                String::from_utf8_lossy(pem_bytes).trim()
            ),
            other => other.to_string(),
        };
        AuthError::parse(CredentialField::Certificate, reason)
    })
}
