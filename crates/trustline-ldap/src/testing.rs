//! Scripted in-memory directory for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::directory::{Directory, DirectoryEntry, DirectoryError, DirectorySession};

/// Build a directory entry from borrowed attribute values.
#[must_use]
pub fn entry(dn: &str, attributes: &[(&str, &[&str])]) -> DirectoryEntry {
    DirectoryEntry {
        dn: dn.to_string(),
        attributes: attributes
            .iter()
            .map(|(name, values)| {
                (
                    (*name).to_string(),
                    values.iter().map(|v| (*v).to_string()).collect(),
                )
            })
            .collect(),
    }
}

/// A directory whose answers are fixed up front.
///
/// Binds succeed only for registered `(dn, password)` accounts. Searches
/// return every scripted entry regardless of base or filter, and the filter
/// is recorded for inspection.
///
/// Clones share their counters, so keep one clone to inspect after handing
/// the other to an authenticator.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDirectory {
    accounts: HashMap<String, String>,
    entries: Vec<DirectoryEntry>,
    dial_error: Option<DirectoryError>,
    search_error: Option<DirectoryError>,
    hang_on_search: bool,
    stats: Arc<Stats>,
}

#[derive(Debug, Default)]
struct Stats {
    dials: AtomicUsize,
    closes: AtomicUsize,
    drops: AtomicUsize,
    filters: Mutex<Vec<String>>,
    binds: Mutex<Vec<String>>,
}

impl ScriptedDirectory {
    /// An empty directory with no accounts or entries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept binds for `dn` with `password`.
    #[must_use]
    pub fn with_account(mut self, dn: &str, password: &str) -> Self {
        self.accounts.insert(dn.to_string(), password.to_string());
        self
    }

    /// Return `entry` from searches.
    #[must_use]
    pub fn with_entry(mut self, entry: DirectoryEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Fail every dial with `error`.
    #[must_use]
    pub fn failing_dial(mut self, error: DirectoryError) -> Self {
        self.dial_error = Some(error);
        self
    }

    /// Fail every search with `error`.
    #[must_use]
    pub fn failing_search(mut self, error: DirectoryError) -> Self {
        self.search_error = Some(error);
        self
    }

    /// Never answer searches.
    #[must_use]
    pub fn hanging_search(mut self) -> Self {
        self.hang_on_search = true;
        self
    }

    /// Number of sessions opened.
    #[must_use]
    pub fn dials(&self) -> usize {
        self.stats.dials.load(Ordering::SeqCst)
    }

    /// Number of explicit `close` calls.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.stats.closes.load(Ordering::SeqCst)
    }

    /// Sessions opened but not yet dropped.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.dials() - self.stats.drops.load(Ordering::SeqCst)
    }

    /// Every search filter received, in order.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.stats.filters.lock().clone()
    }

    /// Every DN a bind was attempted for, in order.
    #[must_use]
    pub fn binds(&self) -> Vec<String> {
        self.stats.binds.lock().clone()
    }
}

#[async_trait]
impl Directory for ScriptedDirectory {
    async fn dial(&self, _address: &str) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        if let Some(error) = &self.dial_error {
            return Err(error.clone());
        }
        self.stats.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            directory: self.clone(),
        }))
    }
}

struct ScriptedSession {
    directory: ScriptedDirectory,
}

#[async_trait]
impl DirectorySession for ScriptedSession {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<(), DirectoryError> {
        self.directory.stats.binds.lock().push(dn.to_string());
        match self.directory.accounts.get(dn) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(DirectoryError::Rejected(
                "LDAP Result Code 49 \"Invalid Credentials\"".to_string(),
            )),
        }
    }

    async fn search(
        &mut self,
        _base_dn: &str,
        filter: &str,
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.directory.stats.filters.lock().push(filter.to_string());
        if self.directory.hang_on_search {
            std::future::pending::<()>().await;
        }
        if let Some(error) = &self.directory.search_error {
            return Err(error.clone());
        }
        Ok(self.directory.entries.clone())
    }

    async fn close(&mut self) {
        self.directory.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.directory.stats.drops.fetch_add(1, Ordering::SeqCst);
    }
}
