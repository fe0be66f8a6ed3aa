//! Directory access capability and its `ldap3` implementation.
//!
//! The authenticator only needs four operations: dial, bind, search and close.
//! Keeping them behind traits lets tests script a directory in memory.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use thiserror::Error;
use tokio::task::JoinHandle;

/// A single entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// The entry's distinguished name.
    pub dn: String,
    /// Attribute values keyed by attribute name.
    pub attributes: HashMap<String, Vec<String>>,
}

/// Errors reported by a directory transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// The directory could not be reached.
    #[error("directory unreachable: {0}")]
    Unreachable(String),

    /// The directory answered with a non-success result code.
    #[error("operation rejected: {0}")]
    Rejected(String),

    /// The connection failed mid-operation.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Something that can open directory sessions.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Open a session to `address` (`host:port`).
    async fn dial(&self, address: &str) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// One open connection to a directory.
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind with a DN and password.
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError>;

    /// Whole-subtree search under `base_dn`, returning every user attribute.
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError>;

    /// Release the connection. Never fails.
    async fn close(&mut self);
}

/// Plain `ldap://` directory access over `ldap3`.
#[derive(Debug, Clone)]
pub struct Ldap3Directory {
    connect_timeout: Duration,
}

impl Ldap3Directory {
    /// Create a directory client with the given dial timeout.
    #[must_use]
    pub const fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Directory for Ldap3Directory {
    async fn dial(&self, address: &str) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let url = format!("ldap://{address}");
        let settings = LdapConnSettings::new().set_conn_timeout(self.connect_timeout);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| DirectoryError::Unreachable(e.to_string()))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(error = %e, "LDAP connection driver error");
            }
        });

        tracing::debug!(%address, "Connected to directory");
        Ok(Box::new(Ldap3Session { ldap, driver }))
    }
}

/// An `ldap3` connection plus the task driving it.
struct Ldap3Session {
    ldap: Ldap,
    driver: JoinHandle<()>,
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.ldap
            .simple_bind(dn, password)
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?
            .success()
            .map(|_| ())
            .map_err(|e| DirectoryError::Rejected(e.to_string()))
    }

    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let (entries, _) = self
            .ldap
            .search(base_dn, Scope::Subtree, filter, Vec::<&str>::new())
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Rejected(e.to_string()))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry {
                dn: entry.dn,
                attributes: entry.attrs,
            })
            .collect())
    }

    async fn close(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            tracing::debug!(error = %e, "LDAP unbind failed");
        }
        self.driver.abort();
    }
}

impl Drop for Ldap3Session {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
