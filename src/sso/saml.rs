// ABOUTME: SAML 2.0 protocol implementation for federated login
// ABOUTME: Builds AuthnRequests and hands response verification to a vetted-library boundary
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! SAML 2.0 federation.
//!
//! Signature and encryption handling is delegated to an
//! [`AssertionVerifier`] implementation backed by a vetted XML-dsig
//! library; this module owns request construction, certificate
//! validity-window checks, and attribute extraction around that boundary.
//! Without a configured verifier every response is rejected (fail closed).

use super::error::SsoError;
use super::provider::{SsoProviderConfig, VerifiedAssertion};
use crate::crypto::random::generate_random_string;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use std::sync::Arc;
use url::Url;

/// Boundary for SAML response verification
///
/// Implementations must verify the XML signature against the IdP
/// certificate and extract the subject NameID and attribute statements.
pub trait AssertionVerifier: Send + Sync {
    /// Verify a base64-encoded `SAMLResponse` and extract the assertion
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Authentication`] for rejected assertions and
    /// [`SsoError::Certificate`] for signature/certificate failures
    fn verify(
        &self,
        saml_response_b64: &str,
        certificate_pem: Option<&str>,
    ) -> Result<VerifiedAssertion, SsoError>;
}

/// Default verifier used when no XML-dsig integration is configured:
/// rejects everything rather than accepting unsigned assertions
pub struct RejectAllVerifier;

impl AssertionVerifier for RejectAllVerifier {
    fn verify(
        &self,
        _saml_response_b64: &str,
        _certificate_pem: Option<&str>,
    ) -> Result<VerifiedAssertion, SsoError> {
        Err(SsoError::Certificate(
            "No SAML assertion verifier configured".into(),
        ))
    }
}

/// SAML 2.0 protocol handler
pub struct Saml2Protocol {
    verifier: Arc<dyn AssertionVerifier>,
}

impl Saml2Protocol {
    /// Create a handler around an assertion verifier
    #[must_use]
    pub fn new(verifier: Arc<dyn AssertionVerifier>) -> Self {
        Self { verifier }
    }

    /// Build the IdP redirect beginning a SAML flow
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Configuration`] when the IdP SSO URL is missing
    /// or invalid
    pub fn initiate(
        &self,
        config: &SsoProviderConfig,
        acs_url: &str,
        state: &str,
    ) -> Result<String, SsoError> {
        let sso_url = config.idp_sso_url.as_deref().ok_or_else(|| {
            SsoError::Configuration("SAML configuration is missing the IdP SSO URL".into())
        })?;

        let request_id = format!(
            "_janua-{}",
            generate_random_string(16)
                .map_err(|e| SsoError::Configuration(format!("RNG failure: {e}")))?
        );

        let authn_request = build_authn_request(
            &request_id,
            config.idp_entity_id.as_deref().unwrap_or_default(),
            acs_url,
        );
        let encoded = general_purpose::STANDARD.encode(authn_request);

        let mut url = Url::parse(sso_url)
            .map_err(|e| SsoError::Configuration(format!("Invalid IdP SSO URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("SAMLRequest", &encoded)
            .append_pair("RelayState", state);

        Ok(url.to_string())
    }

    /// Verify an ACS callback and extract the asserted identity
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Certificate`] when the configured IdP
    /// certificate is outside its validity window or verification fails,
    /// and [`SsoError::Authentication`] when the assertion is rejected
    pub fn handle_callback(
        &self,
        config: &SsoProviderConfig,
        saml_response_b64: &str,
    ) -> Result<VerifiedAssertion, SsoError> {
        if saml_response_b64.trim().is_empty() {
            return Err(SsoError::Validation("Missing SAMLResponse".into()));
        }

        if let Some(pem) = config.idp_certificate_pem.as_deref() {
            check_certificate_validity(pem)?;
        }

        self.verifier
            .verify(saml_response_b64, config.idp_certificate_pem.as_deref())
    }
}

/// Minimal AuthnRequest document (HTTP-POST binding payload)
fn build_authn_request(request_id: &str, idp_entity_id: &str, acs_url: &str) -> String {
    let issue_instant = Utc::now().to_rfc3339();
    format!(
        r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{request_id}" Version="2.0" IssueInstant="{issue_instant}" Destination="{idp_entity_id}" AssertionConsumerServiceURL="{acs_url}" ProtocolBinding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"><saml:Issuer>{acs_url}</saml:Issuer></samlp:AuthnRequest>"#
    )
}

/// Parse the IdP signing certificate and check its validity window
///
/// # Errors
///
/// Returns [`SsoError::Certificate`] for unparseable or expired
/// certificates
pub fn check_certificate_validity(pem: &str) -> Result<(), SsoError> {
    let (_, parsed) = x509_parser::pem::parse_x509_pem(pem.as_bytes())
        .map_err(|e| SsoError::Certificate(format!("Unparseable IdP certificate PEM: {e}")))?;

    let cert = parsed
        .parse_x509()
        .map_err(|e| SsoError::Certificate(format!("Unparseable IdP certificate: {e}")))?;

    if !cert.validity().is_valid() {
        return Err(SsoError::Certificate(
            "IdP signing certificate is outside its validity window".into(),
        ));
    }

    Ok(())
}
