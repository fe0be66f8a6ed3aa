//! The directory authentication exchange.
//!
//! One call opens one connection and runs the full sequence against it:
//!
//! ```text
//! dial ──▶ bind (service account) ──▶ search uid ──▶ bind (user DN) ──▶ attributes
//! ```
//!
//! The connection is closed on every exit path, and dropping the returned
//! future (cancellation or deadline) tears it down as well.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};

use crate::directory::{Directory, DirectoryEntry, DirectoryError, DirectorySession, Ldap3Directory};
use crate::dn::DistinguishedName;
use crate::error::{BindPrincipal, LdapError, Result};
use crate::info::LdapInfo;

/// Attributes never copied into the result.
const RESERVED_ATTRIBUTES: [&str; 2] = ["userPassword", "objectClass"];

/// Configuration for the authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapAuthenticatorConfig {
    /// Budget for the whole exchange, in seconds.
    #[serde(default = "LdapAuthenticatorConfig::default_timeout")]
    pub timeout_seconds: u64,

    /// Budget for establishing the TCP connection, in seconds.
    #[serde(default = "LdapAuthenticatorConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl LdapAuthenticatorConfig {
    const fn default_timeout() -> u64 {
        10
    }

    const fn default_connect_timeout() -> u64 {
        5
    }

    /// Get the exchange timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for LdapAuthenticatorConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: Self::default_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
        }
    }
}

/// Authenticates end users against a directory and extracts their attributes.
#[derive(Debug, Clone)]
pub struct LdapAuthenticator<D = Ldap3Directory> {
    directory: D,
    config: LdapAuthenticatorConfig,
}

impl LdapAuthenticator<Ldap3Directory> {
    /// Create an authenticator that talks plain LDAP over `ldap3`.
    #[must_use]
    pub const fn from_config(config: LdapAuthenticatorConfig) -> Self {
        Self {
            directory: Ldap3Directory::new(config.connect_timeout()),
            config,
        }
    }
}

impl<D: Directory> LdapAuthenticator<D> {
    /// Create an authenticator over an arbitrary directory.
    #[must_use]
    pub const fn new(directory: D, config: LdapAuthenticatorConfig) -> Self {
        Self { directory, config }
    }

    /// The authenticator's configuration.
    #[must_use]
    pub const fn config(&self) -> &LdapAuthenticatorConfig {
        &self.config
    }

    /// Authenticate `info.username` with `info.password` and return the
    /// user's attributes, within the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`LdapAuthenticator::authenticate_until`].
    pub async fn authenticate(&self, info: &LdapInfo) -> Result<BTreeMap<String, String>> {
        self.authenticate_until(info, Instant::now() + self.config.timeout())
            .await
    }

    /// Authenticate as [`LdapAuthenticator::authenticate`], giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// - `Connection` if the directory cannot be reached or drops the connection
    /// - `Authentication` if the service account or the user bind is rejected
    /// - `Directory` if the search is rejected
    /// - `AmbiguousResult` if the search does not match exactly one entry
    /// - `Parse` if the entry's DN is malformed
    /// - `Timeout` if `deadline` passes first
    pub async fn authenticate_until(
        &self,
        info: &LdapInfo,
        deadline: Instant,
    ) -> Result<BTreeMap<String, String>> {
        let budget = deadline.saturating_duration_since(Instant::now());
        if let Ok(result) = timeout_at(deadline, self.exchange(info)).await {
            result
        } else {
            tracing::warn!(address = %info.address, ?budget, "Directory authentication timed out");
            Err(LdapError::Timeout(budget))
        }
    }

    async fn exchange(&self, info: &LdapInfo) -> Result<BTreeMap<String, String>> {
        let mut session = self
            .directory
            .dial(&info.address)
            .await
            .map_err(|e| LdapError::Connection(e.to_string()))?;

        let result = run(session.as_mut(), info).await;
        session.close().await;
        result
    }
}

async fn run(
    session: &mut dyn DirectorySession,
    info: &LdapInfo,
) -> Result<BTreeMap<String, String>> {
    session
        .bind(&info.bind_dn, &info.bind_password)
        .await
        .map_err(|e| bind_error(BindPrincipal::ServiceAccount, e))?;

    tracing::debug!(
        configured_filter = %info.user_query_string(),
        "Searching directory by uid"
    );
    let filter = format!("(&(uid={}))", ldap3::ldap_escape(info.username.as_str()));
    let mut entries = session
        .search(&info.base_dn, &filter)
        .await
        .map_err(|e| match e {
            DirectoryError::Rejected(reason) => LdapError::Directory(reason),
            other => LdapError::Connection(other.to_string()),
        })?;

    let entry = match entries.len() {
        1 => entries.remove(0),
        count => {
            tracing::debug!(count, "User search did not match exactly one entry");
            return Err(LdapError::AmbiguousResult(count));
        }
    };

    // An empty password would be an unauthenticated bind, which servers accept.
    if info.password.is_empty() {
        return Err(LdapError::Authentication {
            principal: BindPrincipal::User,
            reason: "empty password".to_string(),
        });
    }
    session
        .bind(&entry.dn, &info.password)
        .await
        .map_err(|e| bind_error(BindPrincipal::User, e))?;

    tracing::debug!(dn = %entry.dn, "User bind succeeded");
    attributes(&entry, info)
}

/// Flatten an authenticated entry into string attributes.
fn attributes(entry: &DirectoryEntry, info: &LdapInfo) -> Result<BTreeMap<String, String>> {
    let dn = DistinguishedName::parse(&entry.dn)?;
    let mut attributes = BTreeMap::new();

    if let Some(unit) = dn.values_of("ou").next() {
        attributes.insert("organizationalUnit".to_string(), unit.to_string());
    }

    let organization = dn.values_of("dc").collect::<Vec<_>>().join(".");
    if !organization.is_empty() {
        attributes.insert("organization".to_string(), organization);
    }

    attributes.insert("dn".to_string(), entry.dn.replace(' ', "_"));

    for (name, values) in &entry.attributes {
        if RESERVED_ATTRIBUTES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
            || info.is_ignored(name)
        {
            continue;
        }
        if let Some(value) = values.first().filter(|v| !v.is_empty()) {
            attributes.insert(name.clone(), value.replace(' ', "_"));
        }
    }

    Ok(attributes)
}

fn bind_error(principal: BindPrincipal, error: DirectoryError) -> LdapError {
    match error {
        DirectoryError::Rejected(reason) => {
            tracing::debug!(%principal, "Bind rejected");
            LdapError::Authentication { principal, reason }
        }
        other => LdapError::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::testing::{entry, ScriptedDirectory};

    const SERVICE_DN: &str = "cn=admin,dc=example,dc=com";
    const USER_DN: &str = "uid=lskywalker,ou=rebels,ou=alliance,dc=example,dc=com";

    fn info() -> LdapInfo {
        LdapInfo {
            address: "ldap.example.com:389".to_string(),
            bind_dn: SERVICE_DN.to_string(),
            bind_password: "admin-secret".to_string(),
            bind_search_filter: "uid={USERNAME}".to_string(),
            subject_key: "uid".to_string(),
            ignored_keys: HashSet::from(["comment".to_string()]),
            base_dn: "dc=example,dc=com".to_string(),
            conn_security_protocol: "TLS".to_string(),
            username: "lskywalker".to_string(),
            password: "use-the-force".to_string(),
        }
    }

    fn luke() -> DirectoryEntry {
        entry(
            USER_DN,
            &[
                ("uid", &["lskywalker"]),
                ("cn", &["Luke Skywalker", "Luke"]),
                ("mail", &["luke@example.com"]),
                ("userPassword", &["{SSHA}hash"]),
                ("objectClass", &["inetOrgPerson"]),
                ("comment", &["farm boy"]),
                ("description", &[""]),
                ("seeAlso", &[]),
            ],
        )
    }

    fn directory() -> ScriptedDirectory {
        ScriptedDirectory::new()
            .with_account(SERVICE_DN, "admin-secret")
            .with_account(USER_DN, "use-the-force")
            .with_entry(luke())
    }

    fn authenticator(directory: &ScriptedDirectory) -> LdapAuthenticator<ScriptedDirectory> {
        LdapAuthenticator::new(directory.clone(), LdapAuthenticatorConfig::default())
    }

    #[tokio::test]
    async fn successful_authentication() {
        let directory = directory();
        let attributes = authenticator(&directory)
            .authenticate(&info())
            .await
            .unwrap();

        let expected: BTreeMap<String, String> = [
            ("cn", "Luke_Skywalker"),
            (
                "dn",
                "uid=lskywalker,ou=rebels,ou=alliance,dc=example,dc=com",
            ),
            ("mail", "luke@example.com"),
            ("organization", "example.com"),
            ("organizationalUnit", "rebels"),
            ("uid", "lskywalker"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(attributes, expected);

        assert_eq!(directory.binds(), [SERVICE_DN, USER_DN]);
        assert_eq!(directory.filters(), ["(&(uid=lskywalker))"]);
        assert_eq!(directory.closes(), 1);
        assert_eq!(directory.open_sessions(), 0);
    }

    #[tokio::test]
    async fn normalized_result() {
        let attributes = authenticator(&directory())
            .authenticate(&info())
            .await
            .unwrap();
        let claims = trustline_core::normalize(&attributes);
        assert_eq!(claims.first().map(String::as_str), Some("@auth:cn=Luke_Skywalker"));
        assert!(claims.contains("organization", "example.com"));
    }

    #[tokio::test]
    async fn dn_spaces_become_underscores() {
        let dn = "cn=Luke Skywalker,ou=Rebel Alliance,dc=example,dc=com";
        let directory = ScriptedDirectory::new()
            .with_account(SERVICE_DN, "admin-secret")
            .with_account(dn, "use-the-force")
            .with_entry(entry(dn, &[]));

        let attributes = authenticator(&directory)
            .authenticate(&info())
            .await
            .unwrap();
        assert_eq!(
            attributes["dn"],
            "cn=Luke_Skywalker,ou=Rebel_Alliance,dc=example,dc=com"
        );
        assert_eq!(attributes["organizationalUnit"], "Rebel Alliance");
    }

    #[tokio::test]
    async fn username_is_escaped_in_filter() {
        let directory = directory();
        let mut info = info();
        info.username = "*)(uid=*".to_string();

        let _ = authenticator(&directory).authenticate(&info).await;
        assert_eq!(directory.filters(), [r"(&(uid=\2a\29\28uid=\2a))"]);
    }

    #[tokio::test]
    async fn no_or_many_entries_is_ambiguous() {
        let empty = ScriptedDirectory::new().with_account(SERVICE_DN, "admin-secret");
        let err = authenticator(&empty).authenticate(&info()).await.unwrap_err();
        assert!(matches!(err, LdapError::AmbiguousResult(0)));
        assert_eq!(empty.closes(), 1);

        let twice = directory().with_entry(luke());
        let err = authenticator(&twice).authenticate(&info()).await.unwrap_err();
        assert!(matches!(err, LdapError::AmbiguousResult(2)));
        assert_eq!(twice.binds(), [SERVICE_DN]);
        assert_eq!(twice.closes(), 1);
    }

    #[tokio::test]
    async fn wrong_user_password() {
        let directory = directory();
        let mut info = info();
        info.password = "wrong".to_string();

        let err = authenticator(&directory).authenticate(&info).await.unwrap_err();
        assert!(matches!(
            err,
            LdapError::Authentication {
                principal: BindPrincipal::User,
                ..
            }
        ));
        assert_eq!(directory.closes(), 1);
    }

    #[tokio::test]
    async fn empty_user_password_is_rejected() {
        let directory = directory();
        let mut info = info();
        info.password = String::new();

        let err = authenticator(&directory).authenticate(&info).await.unwrap_err();
        assert!(err.is_bad_credentials());
        assert_eq!(directory.binds(), [SERVICE_DN]);
    }

    #[tokio::test]
    async fn wrong_service_password() {
        let directory = directory();
        let mut info = info();
        info.bind_password = "wrong".to_string();

        let err = authenticator(&directory).authenticate(&info).await.unwrap_err();
        assert!(matches!(
            err,
            LdapError::Authentication {
                principal: BindPrincipal::ServiceAccount,
                ..
            }
        ));
        assert!(directory.filters().is_empty());
        assert_eq!(directory.closes(), 1);
    }

    #[tokio::test]
    async fn unreachable_directory() {
        let directory = directory()
            .failing_dial(DirectoryError::Unreachable("connection refused".to_string()));

        let err = authenticator(&directory).authenticate(&info()).await.unwrap_err();
        assert!(matches!(err, LdapError::Connection(_)));
        assert_eq!(directory.dials(), 0);
    }

    #[tokio::test]
    async fn rejected_search() {
        let directory = directory()
            .failing_search(DirectoryError::Rejected("no such object".to_string()));
        let err = authenticator(&directory).authenticate(&info()).await.unwrap_err();
        assert!(matches!(err, LdapError::Directory(_)));
        assert_eq!(directory.closes(), 1);

        let directory = self::directory()
            .failing_search(DirectoryError::Transport("reset by peer".to_string()));
        let err = authenticator(&directory).authenticate(&info()).await.unwrap_err();
        assert!(matches!(err, LdapError::Connection(_)));
    }

    #[tokio::test]
    async fn malformed_dn() {
        let dn = "not a dn";
        let directory = ScriptedDirectory::new()
            .with_account(SERVICE_DN, "admin-secret")
            .with_account(dn, "use-the-force")
            .with_entry(entry(dn, &[]));

        let err = authenticator(&directory).authenticate(&info()).await.unwrap_err();
        assert!(matches!(err, LdapError::Parse(_)));
        assert_eq!(directory.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_releases_connection() {
        let directory = directory().hanging_search();
        let authenticator = authenticator(&directory);

        let deadline = Instant::now() + Duration::from_secs(3);
        let err = authenticator
            .authenticate_until(&info(), deadline)
            .await
            .unwrap_err();

        assert!(matches!(err, LdapError::Timeout(d) if d == Duration::from_secs(3)));
        assert_eq!(directory.dials(), 1);
        assert_eq!(directory.open_sessions(), 0);
    }

    #[test]
    fn default_config() {
        let config = LdapAuthenticatorConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));

        let config: LdapAuthenticatorConfig =
            serde_json::from_str(r#"{"timeout_seconds": 2}"#).unwrap();
        assert_eq!(config.timeout_seconds, 2);
        assert_eq!(config.connect_timeout_seconds, 5);
    }
}
