//! Core types for trustline.
//!
//! This crate provides the canonical claim representation shared by every
//! trust-establishment component: the LDAP authenticator, the token verifier,
//! and the outer issuance client.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod claims;

pub use claims::{normalize, NormalizedClaims, CLAIM_PREFIX};
