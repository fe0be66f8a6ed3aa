//! Token and credential error types.

use std::fmt;

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while verifying tokens or loading credential material.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token or bundle is structurally malformed.
    #[error("malformed input: {0}")]
    Decode(String),

    /// Credential material could not be decoded or parsed.
    #[error("unable to {stage} {}: {reason}", .field.short_name())]
    Parse {
        /// The credential field that failed.
        field: CredentialField,
        /// Whether the base64 layer or the PEM/DER layer failed.
        stage: ParseStage,
        /// Underlying cause.
        reason: String,
    },

    /// The token signature or signing algorithm was rejected.
    #[error("invalid signature: {0}")]
    Signature(String),

    /// The token is outside its temporal validity window.
    #[error("token not valid at this time: {0}")]
    Expiry(ExpiryReason),

    /// No `Authorization` header was supplied.
    #[error("missing authorization header")]
    MissingHeader,

    /// The `Authorization` header is not a bearer credential.
    #[error("invalid authorization header")]
    InvalidHeader,

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub(crate) fn parse(field: CredentialField, reason: impl Into<String>) -> Self {
        Self::Parse {
            field,
            stage: ParseStage::Parse,
            reason: reason.into(),
        }
    }

    pub(crate) fn undecodable(field: CredentialField, reason: impl Into<String>) -> Self {
        Self::Parse {
            field,
            stage: ParseStage::Decode,
            reason: reason.into(),
        }
    }

    /// Returns the credential field named by a `Parse` error.
    #[must_use]
    pub const fn field(&self) -> Option<CredentialField> {
        match self {
            Self::Parse { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Returns `true` if this error indicates the client should retry with a new token.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::Expiry(ExpiryReason::Expired))
    }

    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Decode(_)
            | Self::Signature(_)
            | Self::Expiry(_)
            | Self::MissingHeader
            | Self::InvalidHeader => 401,
            Self::Parse {
                field: CredentialField::SignerCertificate,
                ..
            }
            | Self::Internal(_) => 500,
            Self::Parse { .. } => 400,
        }
    }
}

/// Credential material a `Parse` error can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    /// The bundle's client certificate.
    Certificate,
    /// The bundle's client private key.
    CertificateKey,
    /// The bundle's CA chain.
    CertificateAuthority,
    /// The certificate pinned for token verification.
    SignerCertificate,
}

impl CredentialField {
    /// The field name as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::CertificateKey => "certificateKey",
            Self::CertificateAuthority => "certificateAuthority",
            Self::SignerCertificate => "signerCertificate",
        }
    }

    /// Short human name used in error messages.
    #[must_use]
    pub const fn short_name(self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::CertificateKey => "key",
            Self::CertificateAuthority => "ca",
            Self::SignerCertificate => "signer certificate",
        }
    }
}

impl fmt::Display for CredentialField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which layer of credential material failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    /// The base64 transport encoding.
    Decode,
    /// The PEM/DER content.
    Parse,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode => f.write_str("decode"),
            Self::Parse => f.write_str("parse"),
        }
    }
}

/// Why a token failed its temporal checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    /// `exp` is not in the future.
    Expired,
    /// `nbf` is in the future.
    NotYetValid,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expired => f.write_str("token expired"),
            Self::NotYetValid => f.write_str("token not yet valid"),
        }
    }
}
