//! Directory connection information.
//!
//! Callers hand over a loosely typed metadata map (usually decoded from JSON).
//! [`LdapInfo::from_metadata`] checks it against a single key schema and
//! produces a typed value; [`LdapInfo::to_metadata`] goes the other way using
//! the same schema.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LdapError, MetadataIssue, Result};

/// Placeholder substituted by [`LdapInfo::user_query_string`].
pub const USERNAME_PLACEHOLDER: &str = "{USERNAME}";

/// Metadata keys, in the order they are validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LdapKey {
    /// Directory `host:port`.
    Address,
    /// Service account DN.
    BindDn,
    /// Service account password.
    BindPassword,
    /// Search filter template.
    BindSearchFilter,
    /// Attribute expected to hold the username.
    SubjectKey,
    /// Attributes excluded from the result.
    IgnoredKeys,
    /// Declared transport security.
    ConnSecurityProtocol,
    /// End-user name.
    Username,
    /// End-user password.
    Password,
    /// Search root.
    BaseDn,
}

impl LdapKey {
    /// Every key, in validation order.
    pub const ALL: [Self; 10] = [
        Self::Address,
        Self::BindDn,
        Self::BindPassword,
        Self::BindSearchFilter,
        Self::SubjectKey,
        Self::IgnoredKeys,
        Self::ConnSecurityProtocol,
        Self::Username,
        Self::Password,
        Self::BaseDn,
    ];

    /// The key as it appears in metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Address => "LDAPAddress",
            Self::BindDn => "bindDN",
            Self::BindPassword => "bindPassword",
            Self::BindSearchFilter => "bindSearchFilter",
            Self::SubjectKey => "subjectKey",
            Self::IgnoredKeys => "ignoredKeys",
            Self::ConnSecurityProtocol => "connSecurityProtocol",
            Self::Username => "username",
            Self::Password => "password",
            Self::BaseDn => "baseDN",
        }
    }
}

impl fmt::Display for LdapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to authenticate one user against one directory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapInfo {
    /// Directory `host:port`.
    pub address: String,
    /// Service account DN.
    #[serde(rename = "bindDN")]
    pub bind_dn: String,
    /// Service account password.
    #[serde(rename = "bindPassword")]
    pub bind_password: String,
    /// Search filter template containing `{USERNAME}`.
    #[serde(rename = "bindSearchFilter")]
    pub bind_search_filter: String,
    /// Attribute expected to hold the username.
    #[serde(rename = "subjectKey")]
    pub subject_key: String,
    /// Attributes excluded from the result.
    #[serde(rename = "ignoredKeys")]
    pub ignored_keys: HashSet<String>,
    /// Search root.
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    /// Declared transport security. Stored only; the connection is always plain.
    #[serde(rename = "connSecurityProtocol")]
    pub conn_security_protocol: String,
    /// End-user name.
    pub username: String,
    /// End-user password.
    pub password: String,
}

impl LdapInfo {
    /// Build connection information from a metadata map.
    ///
    /// # Errors
    ///
    /// Returns `NoMetadata` if `metadata` is `None`, and a `Validation` error
    /// naming the first key (in [`LdapKey::ALL`] order) that is missing or has
    /// the wrong type.
    pub fn from_metadata(metadata: Option<&Map<String, Value>>) -> Result<Self> {
        let metadata = metadata.ok_or(LdapError::NoMetadata)?;
        let text = |key: LdapKey| string_value(metadata, key);

        // Field initializers run in order, so the first failing key is reported.
        Ok(Self {
            address: text(LdapKey::Address)?,
            bind_dn: text(LdapKey::BindDn)?,
            bind_password: text(LdapKey::BindPassword)?,
            bind_search_filter: text(LdapKey::BindSearchFilter)?,
            subject_key: text(LdapKey::SubjectKey)?,
            ignored_keys: string_set(metadata, LdapKey::IgnoredKeys)?,
            conn_security_protocol: text(LdapKey::ConnSecurityProtocol)?,
            username: text(LdapKey::Username)?,
            password: text(LdapKey::Password)?,
            base_dn: text(LdapKey::BaseDn)?,
        })
    }

    /// Convert back into a metadata map accepted by [`LdapInfo::from_metadata`].
    #[must_use]
    pub fn to_metadata(&self) -> Map<String, Value> {
        LdapKey::ALL
            .into_iter()
            .map(|key| (key.as_str().to_string(), self.value(key)))
            .collect()
    }

    /// The search filter with every `{USERNAME}` replaced by the username.
    #[must_use]
    pub fn user_query_string(&self) -> String {
        self.bind_search_filter
            .replace(USERNAME_PLACEHOLDER, &self.username)
    }

    /// Returns `true` if `attribute` must be left out of the result.
    #[must_use]
    pub fn is_ignored(&self, attribute: &str) -> bool {
        self.ignored_keys.contains(attribute)
    }

    fn value(&self, key: LdapKey) -> Value {
        let text = match key {
            LdapKey::Address => &self.address,
            LdapKey::BindDn => &self.bind_dn,
            LdapKey::BindPassword => &self.bind_password,
            LdapKey::BindSearchFilter => &self.bind_search_filter,
            LdapKey::SubjectKey => &self.subject_key,
            LdapKey::ConnSecurityProtocol => &self.conn_security_protocol,
            LdapKey::Username => &self.username,
            LdapKey::Password => &self.password,
            LdapKey::BaseDn => &self.base_dn,
            LdapKey::IgnoredKeys => {
                let mut keys: Vec<&String> = self.ignored_keys.iter().collect();
                keys.sort_unstable();
                return Value::from(keys.into_iter().cloned().collect::<Vec<_>>());
            }
        };
        Value::String(text.clone())
    }
}

impl fmt::Debug for LdapInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapInfo")
            .field("address", &self.address)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &"[REDACTED]")
            .field("bind_search_filter", &self.bind_search_filter)
            .field("subject_key", &self.subject_key)
            .field("ignored_keys", &self.ignored_keys)
            .field("base_dn", &self.base_dn)
            .field("conn_security_protocol", &self.conn_security_protocol)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn lookup(metadata: &Map<String, Value>, key: LdapKey) -> Result<&Value> {
    metadata
        .get(key.as_str())
        .ok_or_else(|| invalid(key, MetadataIssue::Missing))
}

fn string_value(metadata: &Map<String, Value>, key: LdapKey) -> Result<String> {
    match lookup(metadata, key)? {
        Value::String(s) => Ok(s.clone()),
        _ => Err(invalid(key, MetadataIssue::NotString)),
    }
}

fn string_set(metadata: &Map<String, Value>, key: LdapKey) -> Result<HashSet<String>> {
    let Value::Array(items) = lookup(metadata, key)? else {
        return Err(invalid(key, MetadataIssue::NotStringList));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(key, MetadataIssue::NotStringList))
        })
        .collect()
}

fn invalid(key: LdapKey, issue: MetadataIssue) -> LdapError {
    LdapError::Validation {
        field: key.as_str().to_string(),
        issue,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn metadata() -> Map<String, Value> {
        let Value::Object(map) = json!({
            "LDAPAddress": "123:123",
            "bindDN": "cn=admin,dc=toto,dc=com",
            "bindPassword": "toto",
            "bindSearchFilter": "uid={USERNAME}",
            "subjectKey": "uid",
            "ignoredKeys": ["comment"],
            "connSecurityProtocol": "TLS",
            "username": "lskywalker",
            "password": "secret",
            "baseDN": "ou=zoupla,dc=toto,dc=com",
        }) else {
            unreachable!()
        };
        map
    }

    #[test]
    fn valid_metadata() {
        let info = LdapInfo::from_metadata(Some(&metadata())).unwrap();
        assert_eq!(info.address, "123:123");
        assert_eq!(info.bind_dn, "cn=admin,dc=toto,dc=com");
        assert_eq!(info.bind_password, "toto");
        assert_eq!(info.bind_search_filter, "uid={USERNAME}");
        assert_eq!(info.subject_key, "uid");
        assert!(info.is_ignored("comment"));
        assert_eq!(info.conn_security_protocol, "TLS");
        assert_eq!(info.username, "lskywalker");
        assert_eq!(info.password, "secret");
        assert_eq!(info.base_dn, "ou=zoupla,dc=toto,dc=com");
    }

    #[test]
    fn missing_metadata() {
        assert!(matches!(
            LdapInfo::from_metadata(None),
            Err(LdapError::NoMetadata)
        ));
    }

    #[test]
    fn each_missing_key_is_named() {
        for key in LdapKey::ALL {
            let mut map = metadata();
            map.remove(key.as_str());
            let err = LdapInfo::from_metadata(Some(&map)).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("metadata must contain the key '{key}'")
            );
        }
    }

    #[test]
    fn first_missing_key_wins() {
        let mut map = metadata();
        map.remove("baseDN");
        map.remove("bindPassword");
        map.remove("username");
        let err = LdapInfo::from_metadata(Some(&map)).unwrap_err();
        assert_eq!(err.field(), Some("bindPassword"));
    }

    #[test]
    fn wrong_types() {
        let mut map = metadata();
        map.insert("LDAPAddress".to_string(), json!(123));
        let err = LdapInfo::from_metadata(Some(&map)).unwrap_err();
        assert_eq!(err.to_string(), "metadata must be a string for key 'LDAPAddress'");

        for bad in [json!(""), json!([1, 2]), Value::Null] {
            let mut map = metadata();
            map.insert("ignoredKeys".to_string(), bad);
            let err = LdapInfo::from_metadata(Some(&map)).unwrap_err();
            assert_eq!(
                err.to_string(),
                "metadata must be a list of strings for key 'ignoredKeys'"
            );
        }
    }

    #[test]
    fn metadata_round_trip() {
        let info = LdapInfo::from_metadata(Some(&metadata())).unwrap();
        let map = info.to_metadata();
        assert_eq!(map, metadata());
        assert_eq!(LdapInfo::from_metadata(Some(&map)).unwrap(), info);
    }

    #[test]
    fn json_field_names() {
        let info = LdapInfo::from_metadata(Some(&metadata())).unwrap();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["address"], "123:123");
        assert_eq!(json["bindDN"], "cn=admin,dc=toto,dc=com");
        assert_eq!(json["ignoredKeys"], json!(["comment"]));
        assert_eq!(json["connSecurityProtocol"], "TLS");

        let back: LdapInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }

    #[test]
    fn query_string_replaces_every_placeholder() {
        let mut info = LdapInfo::from_metadata(Some(&metadata())).unwrap();
        info.bind_search_filter = "uid={USERNAME},khg={USERNAME}".to_string();
        assert_eq!(info.user_query_string(), "uid=lskywalker,khg=lskywalker");
    }

    #[test]
    fn debug_redacts_passwords() {
        let info = LdapInfo::from_metadata(Some(&metadata())).unwrap();
        let rendered = format!("{info:?}");
        assert!(!rendered.contains("toto\""));
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("lskywalker"));
    }
}
