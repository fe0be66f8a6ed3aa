//! Token verification and credential bundles for trustline.
//!
//! This crate covers the two cryptographic trust paths:
//!
//! - Signed identity tokens verified against a pinned signer certificate
//! - Application credential bundles parsed into a mutual-TLS client config
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐
//! │  Bearer header   │────▶│  TokenVerifier   │──▶ NormalizedClaims
//! └──────────────────┘     └────────┬─────────┘
//!                                   │ public key
//!                          ┌────────▼──────────┐
//!                          │ SignerCertificate │
//!                          └───────────────────┘
//!
//! ┌──────────────────┐     ┌──────────────────┐
//! │  Bundle JSON     │────▶│ CredentialBundle │──▶ TlsClientConfig
//! └──────────────────┘     └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use trustline_auth::{extract_bearer_token, SignerCertificate, TokenVerifier};
//!
//! # fn example(header: Option<&str>, pem: &[u8]) -> trustline_auth::Result<()> {
//! let verifier = TokenVerifier::new(SignerCertificate::from_pem(pem)?);
//! let token = extract_bearer_token(header)?;
//! let claims = verifier.verify_signature(token)?;
//!
//! for claim in &claims {
//!     println!("{claim}");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bundle;
pub mod error;
pub mod signer;
pub mod token;

pub use bundle::{CredentialBundle, TlsClientConfig};
pub use error::{AuthError, CredentialField, ExpiryReason, ParseStage, Result};
pub use signer::SignerCertificate;
pub use token::{extract_bearer_token, unsafe_claims, Audience, TokenClaims, TokenVerifier};
