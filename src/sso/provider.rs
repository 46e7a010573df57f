// ABOUTME: SSO protocol selection, per-organization provider configuration, and URL validation
// ABOUTME: Closed protocol set selected by tag; metadata hosts checked against an exact allow-list
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use super::error::SsoError;
use super::mapping::AttributeMapping;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;
use uuid::Uuid;

/// Supported federation protocols
///
/// A closed set selected by configuration tag, never by runtime probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SsoProtocolKind {
    /// SAML 2.0 (redirect binding + ACS POST)
    Saml2,
    /// OpenID Connect (authorization code flow)
    Oidc,
}

impl std::fmt::Display for SsoProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Saml2 => write!(f, "saml2"),
            Self::Oidc => write!(f, "oidc"),
        }
    }
}

/// Per-organization identity provider configuration
///
/// Secrets are stored encrypted; decryption happens only inside the SSO
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoProviderConfig {
    /// Organization this configuration belongs to
    pub organization_id: Uuid,
    /// Provider label shown to users (e.g. "okta", "azure_ad")
    pub provider: String,
    /// Which protocol implementation handles this provider
    pub protocol: SsoProtocolKind,
    /// OIDC issuer expected in ID tokens
    pub issuer: Option<String>,
    /// OIDC discovery document URL
    pub discovery_url: Option<String>,
    /// OIDC client id registered with the IdP
    pub client_id: Option<String>,
    /// OIDC client secret, encrypted at rest
    pub encrypted_client_secret: Option<String>,
    /// SAML IdP entity id
    pub idp_entity_id: Option<String>,
    /// SAML IdP single sign-on URL
    pub idp_sso_url: Option<String>,
    /// SAML IdP signing certificate (PEM)
    pub idp_certificate_pem: Option<String>,
    /// SAML IdP metadata URL
    pub metadata_url: Option<String>,
    /// Custom attribute mapping applied after protocol defaults
    pub attribute_mapping: Option<AttributeMapping>,
    /// Inactive configurations refuse authentication
    pub is_active: bool,
}

/// Redirect the caller to the IdP to begin authentication
#[derive(Debug, Clone, Serialize)]
pub struct SsoRedirect {
    /// Fully constructed IdP URL
    pub redirect_url: String,
    /// State correlating the eventual callback, single use
    pub state: String,
    /// Protocol that produced the redirect
    pub protocol: SsoProtocolKind,
}

/// Identity asserted by the IdP after callback verification
#[derive(Debug, Clone)]
pub struct VerifiedAssertion {
    /// Primary subject identifier asserted by the IdP (NameID / `sub`)
    pub subject: String,
    /// Raw attributes or claims from the assertion
    pub attributes: HashMap<String, Value>,
}

/// Pending state bridging initiate and callback, stored in the shared cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSsoState {
    /// Organization that initiated the flow
    pub organization_id: Uuid,
    /// Protocol the flow uses
    pub protocol: SsoProtocolKind,
    /// Where to send the user after login
    pub return_url: Option<String>,
    /// OIDC nonce minted at initiate time
    pub nonce: Option<String>,
    /// When the flow was initiated
    pub created_at: DateTime<Utc>,
}

/// Validate a metadata/discovery URL against the exact-host allow-list
///
/// The scheme must be https and the host must equal one of the allowed
/// hosts exactly. Suffix tricks such as
/// `login.microsoftonline.com.attacker.com` never match because the
/// comparison is equality, not containment.
///
/// # Errors
///
/// Returns [`SsoError::Validation`] for unparseable URLs or scheme/host
/// violations, and [`SsoError::Configuration`] when no allow-list is
/// configured (fail closed)
pub fn validate_metadata_url(raw: &str, allowed_hosts: &[String]) -> Result<Url, SsoError> {
    let url = Url::parse(raw)
        .map_err(|e| SsoError::Validation(format!("Invalid metadata URL: {e}")))?;

    if url.scheme() != "https" {
        return Err(SsoError::Validation(
            "Metadata URLs must use https".into(),
        ));
    }

    let Some(host) = url.host_str() else {
        return Err(SsoError::Validation("Metadata URL has no host".into()));
    };

    if allowed_hosts.is_empty() {
        return Err(SsoError::Configuration(
            "No allowed metadata hosts configured".into(),
        ));
    }

    let host = host.to_lowercase();
    if !allowed_hosts.iter().any(|allowed| *allowed == host) {
        return Err(SsoError::Validation(format!(
            "Metadata host '{host}' is not on the allow-list"
        )));
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist() -> Vec<String> {
        vec!["login.microsoftonline.com".into()]
    }

    #[test]
    fn test_valid_host() {
        assert!(validate_metadata_url(
            "https://login.microsoftonline.com/.well-known/openid-configuration",
            &allowlist(),
        )
        .is_ok());
    }

    #[test]
    fn test_subdomain_bypass_rejected() {
        assert!(validate_metadata_url(
            "https://login.microsoftonline.com.attacker.com/oidc",
            &allowlist(),
        )
        .is_err());
    }

    #[test]
    fn test_http_rejected() {
        assert!(validate_metadata_url(
            "http://login.microsoftonline.com/.well-known/openid-configuration",
            &allowlist(),
        )
        .is_err());
    }

    #[test]
    fn test_wrong_host_rejected() {
        assert!(
            validate_metadata_url("https://login.example.com/config", &allowlist()).is_err()
        );
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(validate_metadata_url("not-a-valid-url", &allowlist()).is_err());
        assert!(validate_metadata_url("", &allowlist()).is_err());
    }

    #[test]
    fn test_empty_allowlist_fails_closed() {
        assert!(matches!(
            validate_metadata_url("https://login.microsoftonline.com/x", &[]),
            Err(SsoError::Configuration(_))
        ));
    }
}
