// ABOUTME: OpenID Connect federation via discovery and the authorization code flow
// ABOUTME: Discovery hosts are allow-listed and every fetch carries a hard timeout
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! OIDC federation against external identity providers.
//!
//! The ID token is accepted from the direct TLS response of the token
//! endpoint (OIDC Core 3.1.3.7 permits skipping signature validation in
//! that case); issuer, audience, expiry, and nonce are still checked.

use super::error::SsoError;
use super::provider::{validate_metadata_url, SsoProviderConfig, VerifiedAssertion};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// OIDC discovery document fields the flow needs
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier
    pub issuer: String,
    /// Authorization endpoint URL
    pub authorization_endpoint: String,
    /// Token endpoint URL
    pub token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    id_token: String,
    #[allow(dead_code)]
    access_token: Option<String>,
}

/// OIDC protocol handler
pub struct OidcProtocol {
    http: reqwest::Client,
    allowed_hosts: Vec<String>,
}

impl OidcProtocol {
    /// Create a handler with the configured allow-list and fetch timeout
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Configuration`] if the HTTP client cannot be
    /// constructed
    pub fn new(allowed_hosts: Vec<String>, timeout_secs: u64) -> Result<Self, SsoError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SsoError::Configuration(format!("HTTP client setup failed: {e}")))?;

        Ok(Self {
            http,
            allowed_hosts,
        })
    }

    /// Fetch and parse the provider's discovery document
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Metadata`] for fetch, timeout, or parse
    /// failures; URL violations surface from the allow-list check
    pub async fn fetch_discovery(&self, url: &str) -> Result<DiscoveryDocument, SsoError> {
        let url = validate_metadata_url(url, &self.allowed_hosts)?;

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SsoError::Metadata(format!("Discovery fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SsoError::Metadata(format!(
                "Discovery endpoint returned {}",
                response.status()
            )));
        }

        response
            .json::<DiscoveryDocument>()
            .await
            .map_err(|e| SsoError::Metadata(format!("Unparseable discovery document: {e}")))
    }

    /// Build the IdP authorization redirect beginning an OIDC flow
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Configuration`] when discovery URL or client id
    /// are missing, or [`SsoError::Metadata`] when discovery fails
    pub async fn initiate(
        &self,
        config: &SsoProviderConfig,
        redirect_uri: &str,
        state: &str,
        nonce: &str,
    ) -> Result<String, SsoError> {
        let discovery_url = config.discovery_url.as_deref().ok_or_else(|| {
            SsoError::Configuration("OIDC configuration is missing the discovery URL".into())
        })?;
        let client_id = config.client_id.as_deref().ok_or_else(|| {
            SsoError::Configuration("OIDC configuration is missing the client id".into())
        })?;

        let discovery = self.fetch_discovery(discovery_url).await?;

        let mut url = Url::parse(&discovery.authorization_endpoint).map_err(|e| {
            SsoError::Metadata(format!("Invalid authorization endpoint in discovery: {e}"))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", "openid email profile")
            .append_pair("state", state)
            .append_pair("nonce", nonce);

        Ok(url.to_string())
    }

    /// Exchange an authorization code at the IdP token endpoint and return
    /// the verified ID-token claims
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Authentication`] when the exchange is refused or
    /// the ID token fails its claim checks, [`SsoError::Metadata`] when the
    /// endpoint is unreachable
    pub async fn exchange_code(
        &self,
        config: &SsoProviderConfig,
        token_endpoint: &str,
        code: &str,
        redirect_uri: &str,
        client_secret: Option<&str>,
        expected_nonce: Option<&str>,
    ) -> Result<VerifiedAssertion, SsoError> {
        let client_id = config.client_id.as_deref().ok_or_else(|| {
            SsoError::Configuration("OIDC configuration is missing the client id".into())
        })?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", client_id),
        ];
        if let Some(secret) = client_secret {
            form.push(("client_secret", secret));
        }

        let response = self
            .http
            .post(token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| SsoError::Metadata(format!("Token endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(SsoError::Authentication(format!(
                "IdP token endpoint refused the code exchange ({})",
                response.status()
            )));
        }

        let tokens = response
            .json::<TokenEndpointResponse>()
            .await
            .map_err(|e| SsoError::Authentication(format!("Unparseable token response: {e}")))?;

        let claims = decode_id_token_claims(&tokens.id_token)?;
        validate_id_token_claims(&claims, config, client_id, expected_nonce)?;

        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        Ok(VerifiedAssertion {
            subject,
            attributes: claims,
        })
    }
}

/// Decode the payload segment of an ID token without signature validation
fn decode_id_token_claims(id_token: &str) -> Result<HashMap<String, Value>, SsoError> {
    let mut segments = id_token.split('.');
    let (Some(_header), Some(payload)) = (segments.next(), segments.next()) else {
        return Err(SsoError::Authentication("Malformed ID token".into()));
    };

    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| SsoError::Authentication(format!("Malformed ID token payload: {e}")))?;

    serde_json::from_slice(&decoded)
        .map_err(|e| SsoError::Authentication(format!("Unparseable ID token claims: {e}")))
}

fn validate_id_token_claims(
    claims: &HashMap<String, Value>,
    config: &SsoProviderConfig,
    client_id: &str,
    expected_nonce: Option<&str>,
) -> Result<(), SsoError> {
    if let Some(expected_issuer) = config.issuer.as_deref() {
        let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or("");
        if issuer != expected_issuer {
            return Err(SsoError::Authentication(
                "ID token issuer mismatch".into(),
            ));
        }
    }

    let audience_ok = match claims.get("aud") {
        Some(Value::String(aud)) => aud == client_id,
        Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(client_id)),
        _ => false,
    };
    if !audience_ok {
        return Err(SsoError::Authentication(
            "ID token audience mismatch".into(),
        ));
    }

    let exp = claims.get("exp").and_then(Value::as_i64).unwrap_or(0);
    if exp <= chrono::Utc::now().timestamp() {
        return Err(SsoError::Authentication("ID token has expired".into()));
    }

    if let Some(expected) = expected_nonce {
        let nonce = claims.get("nonce").and_then(Value::as_str).unwrap_or("");
        if nonce != expected {
            return Err(SsoError::Authentication("ID token nonce mismatch".into()));
        }
    }

    Ok(())
}
