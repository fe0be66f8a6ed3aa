//! Subcommand implementations. Each returns the text to print on stdout.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use trustline_auth::{
    extract_bearer_token, unsafe_claims, CredentialBundle, SignerCertificate, TokenVerifier,
};
use trustline_ldap::{LdapAuthenticator, LdapAuthenticatorConfig, LdapInfo};

/// Authenticate with the metadata in `path` and list the resulting claims.
pub async fn ldap(path: &Path, timeout_seconds: Option<u64>) -> anyhow::Result<String> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read metadata from {}", path.display()))?;
    let metadata: Value = serde_json::from_slice(&raw)
        .with_context(|| format!("Invalid JSON in {}", path.display()))?;
    let info = LdapInfo::from_metadata(metadata.as_object())?;

    let config = ldap_config(timeout_seconds);
    tracing::debug!(
        address = %info.address,
        timeout_seconds = config.timeout_seconds,
        "Authenticating against directory"
    );

    let attributes = LdapAuthenticator::from_config(config)
        .authenticate(&info)
        .await
        .with_context(|| format!("Authentication of '{}' failed", info.username))?;

    Ok(lines(&trustline_core::normalize(&attributes)))
}

/// Authenticator settings, with an explicit timeout overriding the default.
fn ldap_config(timeout_seconds: Option<u64>) -> LdapAuthenticatorConfig {
    let mut config = LdapAuthenticatorConfig::default();
    if let Some(timeout_seconds) = timeout_seconds {
        config.timeout_seconds = timeout_seconds;
    }
    config
}

/// Pick the token out of `--token` or `--header`.
pub fn token_argument<'a>(
    token: Option<&'a str>,
    header: Option<&'a str>,
) -> anyhow::Result<&'a str> {
    match (token, header) {
        (Some(token), _) => Ok(token),
        (None, header) => Ok(extract_bearer_token(header)?),
    }
}

/// Verify `token` against the signer certificate in `cert`.
pub fn verify(token: &str, cert: &Path, structured: bool) -> anyhow::Result<String> {
    let pem = std::fs::read(cert)
        .with_context(|| format!("Failed to read signer certificate {}", cert.display()))?;
    let verifier = TokenVerifier::new(SignerCertificate::from_pem(&pem)?);

    let claims = verifier.verify(token).context("Token rejected")?;
    if structured {
        Ok(serde_json::to_string_pretty(&claims)?)
    } else {
        Ok(lines(&claims.normalized()))
    }
}

/// Decode `token` without verification.
pub fn claims(token: &str) -> anyhow::Result<String> {
    tracing::warn!("Claims are decoded WITHOUT signature verification and must not be trusted");
    eprintln!("warning: token signature NOT verified");
    Ok(lines(&unsafe_claims(token)?))
}

/// Parse the bundle in `path` and describe what it contains.
pub fn bundle(path: &Path) -> anyhow::Result<String> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read bundle from {}", path.display()))?;
    let (_, tls) = CredentialBundle::parse(&raw)?;

    let mut out = String::new();
    writeln!(out, "client certificates: {}", tls.certificate_chain().len())?;
    write!(out, "trust anchors: {}", tls.root_store().len())?;
    Ok(out)
}

fn lines<'a, I>(claims: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    claims
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn ldap_timeout_falls_back_to_config_default() {
        assert_eq!(
            ldap_config(None).timeout(),
            LdapAuthenticatorConfig::default().timeout()
        );
        assert_eq!(ldap_config(Some(3)).timeout_seconds, 3);
    }

    #[test]
    fn bundle_without_certificate_reports_parse_error() {
        // certificate is base64 of "woops"
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"certificate":"d29vcHM=","certificateKey":"","certificateAuthority":""}"#,
        )
        .unwrap();

        let err = bundle(file.path()).unwrap_err();
        assert!(
            err.to_string().contains("failed to find any PEM data"),
            "{err}"
        );
    }

    #[test]
    fn token_from_header() {
        assert_eq!(token_argument(None, Some("Bearer abc")).unwrap(), "abc");
        assert_eq!(token_argument(Some("xyz"), None).unwrap(), "xyz");
        assert!(token_argument(None, Some("Basic abc")).is_err());
        assert!(token_argument(None, None).is_err());
    }

    #[test]
    fn claims_listing() {
        let claims = trustline_core::normalize([("b", "2"), ("a", "1")]);
        assert_eq!(lines(&claims), "@auth:a=1\n@auth:b=2");
    }
}
