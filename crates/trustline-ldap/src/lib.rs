//! LDAP directory authentication for trustline.
//!
//! Given validated [`LdapInfo`], [`LdapAuthenticator`] runs the
//! bind/search/rebind exchange against a directory and returns the
//! authenticated user's attributes, ready for
//! [`trustline_core::normalize`].
//!
//! # Example
//!
//! ```no_run
//! use trustline_ldap::{LdapAuthenticator, LdapAuthenticatorConfig, LdapInfo};
//!
//! # async fn example(metadata: serde_json::Map<String, serde_json::Value>) -> trustline_ldap::Result<()> {
//! let info = LdapInfo::from_metadata(Some(&metadata))?;
//! let authenticator = LdapAuthenticator::from_config(LdapAuthenticatorConfig::default());
//!
//! let attributes = authenticator.authenticate(&info).await?;
//! let claims = trustline_core::normalize(&attributes);
//! println!("{claims}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod authenticator;
pub mod directory;
pub mod dn;
pub mod error;
pub mod info;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use authenticator::{LdapAuthenticator, LdapAuthenticatorConfig};
pub use directory::{Directory, DirectoryEntry, DirectoryError, DirectorySession, Ldap3Directory};
pub use dn::DistinguishedName;
pub use error::{BindPrincipal, LdapError, MetadataIssue, Result};
pub use info::{LdapInfo, LdapKey};
