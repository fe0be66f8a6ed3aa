//! Claim normalization.
//!
//! Identity attributes arrive as string maps whose iteration order depends on
//! where they came from (a directory entry, a token payload). Authorization
//! decisions must not, so every producer flattens its attributes into a sorted
//! sequence of `@auth:key=value` strings.

use std::fmt;
use std::ops::Deref;

use serde::{de, Deserialize, Deserializer, Serialize};

/// Prefix carried by every normalized claim.
pub const CLAIM_PREFIX: &str = "@auth:";

/// A deterministic, sorted sequence of `@auth:key=value` claims.
///
/// Deserialization re-sorts its input and rejects entries without the
/// `@auth:` prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NormalizedClaims(Vec<String>);

impl NormalizedClaims {
    /// Return an empty claim set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Return the claims as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Consume the claims, returning the underlying sorted vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Returns `true` if the exact claim `@auth:key=value` is present.
    #[must_use]
    pub fn contains(&self, key: &str, value: &str) -> bool {
        let wanted = render(key, value);
        self.0.iter().any(|claim| *claim == wanted)
    }
}

impl<'de> Deserialize<'de> for NormalizedClaims {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut claims = Vec::<String>::deserialize(deserializer)?;
        if let Some(bad) = claims.iter().find(|c| !c.starts_with(CLAIM_PREFIX)) {
            return Err(de::Error::custom(format!(
                "claim '{bad}' does not start with '{CLAIM_PREFIX}'"
            )));
        }
        claims.sort_unstable();
        Ok(Self(claims))
    }
}

impl Deref for NormalizedClaims {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl IntoIterator for NormalizedClaims {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a NormalizedClaims {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for NormalizedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

impl From<NormalizedClaims> for Vec<String> {
    fn from(claims: NormalizedClaims) -> Self {
        claims.0
    }
}

/// Flatten key/value attributes into sorted `@auth:key=value` claims.
///
/// Any iterable of string-like pairs is accepted, so both `HashMap` and
/// `BTreeMap` (owned or borrowed) work. Empty input yields empty claims.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use trustline_core::normalize;
///
/// let attrs = HashMap::from([("uid", "lskywalker"), ("ou", "rebels")]);
/// let claims = normalize(&attrs);
/// assert_eq!(claims.as_slice(), ["@auth:ou=rebels", "@auth:uid=lskywalker"]);
/// ```
pub fn normalize<I, K, V>(attributes: I) -> NormalizedClaims
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut claims: Vec<String> = attributes
        .into_iter()
        .map(|(key, value)| render(key.as_ref(), value.as_ref()))
        .collect();
    claims.sort_unstable();
    NormalizedClaims(claims)
}

fn render(key: &str, value: &str) -> String {
    format!("{CLAIM_PREFIX}{key}={value}")
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::*;

    #[test]
    fn normalizes_and_sorts() {
        let attrs = HashMap::from([
            ("d2".to_string(), "v2".to_string()),
            ("subject".to_string(), "subject".to_string()),
            ("d1".to_string(), "v1".to_string()),
        ]);

        let claims = normalize(&attrs);
        assert_eq!(
            claims.as_slice(),
            ["@auth:d1=v1", "@auth:d2=v2", "@auth:subject=subject"]
        );
    }

    #[test]
    fn empty_input_yields_empty_claims() {
        let attrs: HashMap<String, String> = HashMap::new();
        let claims = normalize(&attrs);
        assert!(claims.is_empty());
        assert_eq!(claims, NormalizedClaims::empty());

        let none: Option<(&str, &str)> = None;
        assert!(normalize(none).is_empty());
    }

    #[test]
    fn order_independent() {
        let pairs = [
            ("organization", "example.com"),
            ("uid", "lskywalker"),
            ("dn", "uid=lskywalker,dc=example,dc=com"),
            ("cn", "Luke_Skywalker"),
        ];

        let forward = normalize(pairs);
        let mut reversed = pairs;
        reversed.reverse();
        let backward = normalize(reversed);
        let from_btree = normalize(pairs.iter().copied().collect::<BTreeMap<_, _>>());

        assert_eq!(forward, backward);
        assert_eq!(forward, from_btree);
    }

    #[test]
    fn sorts_by_full_string() {
        let claims = normalize([("a.b", "1"), ("a", "2")]);
        // '.' sorts before '='
        assert_eq!(claims.as_slice(), ["@auth:a.b=1", "@auth:a=2"]);
    }

    #[test]
    fn contains_exact_claim() {
        let claims = normalize([("uid", "lskywalker"), ("ou", "rebels")]);
        assert!(claims.contains("uid", "lskywalker"));
        assert!(!claims.contains("uid", "hsolo"));
    }

    #[test]
    fn serializes_as_array() {
        let claims = normalize([("uid", "lskywalker")]);
        let json = serde_json::to_string(&claims).unwrap();
        assert_eq!(json, r#"["@auth:uid=lskywalker"]"#);
    }

    #[test]
    fn deserializing_restores_order() {
        let claims: NormalizedClaims =
            serde_json::from_str(r#"["@auth:uid=lskywalker", "@auth:ou=rebels"]"#).unwrap();
        assert_eq!(claims, normalize([("uid", "lskywalker"), ("ou", "rebels")]));

        let err = serde_json::from_str::<NormalizedClaims>(r#"["@auth:a=1", "b=2"]"#).unwrap_err();
        assert!(err.to_string().contains("'b=2'"), "{err}");
    }
}
