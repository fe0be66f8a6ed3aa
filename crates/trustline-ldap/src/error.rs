//! Directory authentication error types.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// A result type using `LdapError`.
pub type Result<T> = std::result::Result<T, LdapError>;

/// Errors that can occur while authenticating against a directory.
#[derive(Debug, Error)]
pub enum LdapError {
    /// No metadata map was supplied at all.
    #[error("metadata must be provided")]
    NoMetadata,

    /// A metadata entry is missing or has the wrong type.
    #[error("metadata {issue} '{field}'")]
    Validation {
        /// The offending metadata key.
        field: String,
        /// What is wrong with it.
        issue: MetadataIssue,
    },

    /// The directory could not be reached or the connection failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// The directory rejected a bind.
    #[error("{principal} bind rejected: {reason}")]
    Authentication {
        /// Which credentials were rejected.
        principal: BindPrincipal,
        /// Server-supplied reason.
        reason: String,
    },

    /// The user search did not return exactly one entry.
    #[error("user does not exist or too many entries returned ({0} entries)")]
    AmbiguousResult(usize),

    /// The entry's distinguished name is malformed.
    #[error("invalid distinguished name: {0}")]
    Parse(String),

    /// The directory rejected the search request.
    #[error("directory search failed: {0}")]
    Directory(String),

    /// The whole exchange did not finish before its deadline.
    #[error("directory authentication timed out after {0:?}")]
    Timeout(Duration),
}

impl LdapError {
    /// Returns the metadata key named by a `Validation` error.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Returns `true` if the end user's own credentials were rejected.
    #[must_use]
    pub const fn is_bad_credentials(&self) -> bool {
        matches!(
            self,
            Self::Authentication {
                principal: BindPrincipal::User,
                ..
            } | Self::AmbiguousResult(_)
        )
    }
}

/// What is wrong with a metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataIssue {
    /// The key is absent.
    Missing,
    /// The value is not a string.
    NotString,
    /// The value is not a list of strings.
    NotStringList,
}

impl fmt::Display for MetadataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("must contain the key"),
            Self::NotString => f.write_str("must be a string for key"),
            Self::NotStringList => f.write_str("must be a list of strings for key"),
        }
    }
}

/// Whose credentials a bind presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindPrincipal {
    /// The service account from `bindDN`/`bindPassword`.
    ServiceAccount,
    /// The end user being authenticated.
    User,
}

impl fmt::Display for BindPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount => f.write_str("service account"),
            Self::User => f.write_str("user"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages() {
        let err = LdapError::Validation {
            field: "bindDN".to_string(),
            issue: MetadataIssue::Missing,
        };
        assert_eq!(err.to_string(), "metadata must contain the key 'bindDN'");
        assert_eq!(err.field(), Some("bindDN"));

        let err = LdapError::Validation {
            field: "ignoredKeys".to_string(),
            issue: MetadataIssue::NotStringList,
        };
        assert_eq!(
            err.to_string(),
            "metadata must be a list of strings for key 'ignoredKeys'"
        );
    }

    #[test]
    fn bad_credentials() {
        let user = LdapError::Authentication {
            principal: BindPrincipal::User,
            reason: "rc=49".to_string(),
        };
        let service = LdapError::Authentication {
            principal: BindPrincipal::ServiceAccount,
            reason: "rc=49".to_string(),
        };
        assert!(user.is_bad_credentials());
        assert!(!service.is_bad_credentials());
        assert!(LdapError::AmbiguousResult(0).is_bad_credentials());
        assert_eq!(service.to_string(), "service account bind rejected: rc=49");
    }
}
