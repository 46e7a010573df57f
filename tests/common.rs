// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides common resource, user, and OAuth client creation helpers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Janua Identity
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

//! Shared test utilities for `janua_server` integration tests.

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use janua_server::config::environment::ServerConfig;
use janua_server::models::{OAuthClient, User};
use janua_server::resources::ServerResources;
use janua_server::store::IdentityStore;
use janua_server::sso::error::SsoError;
use janua_server::sso::provider::VerifiedAssertion;
use janua_server::sso::saml::AssertionVerifier;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Once};

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Standard test resources: in-memory store and cache, ephemeral secrets
pub async fn create_test_resources() -> Arc<ServerResources> {
    init_test_logging();
    let config = Arc::new(ServerConfig::for_testing());
    Arc::new(
        ServerResources::new(config)
            .await
            .expect("Failed to build test resources"),
    )
}

/// Test resources with a custom SAML assertion verifier
pub async fn create_test_resources_with_verifier(
    verifier: Arc<dyn AssertionVerifier>,
) -> Arc<ServerResources> {
    init_test_logging();
    let config = Arc::new(ServerConfig::for_testing());
    Arc::new(
        ServerResources::new_with_verifier(config, verifier)
            .await
            .expect("Failed to build test resources"),
    )
}

/// Create and persist a test user
pub async fn create_test_user(resources: &ServerResources, email: &str) -> User {
    let user = User::new(
        email.to_owned(),
        bcrypt::hash("correct horse battery staple", 4).unwrap(),
        Some("Test User".to_owned()),
    );
    resources.store.create_user(&user).await.unwrap();
    user
}

/// Register a confidential OAuth client; returns the client and its
/// plaintext secret
pub async fn register_test_client(
    resources: &ServerResources,
    client_id: &str,
    redirect_uri: &str,
) -> (OAuthClient, String) {
    let secret = format!("secret-{client_id}");
    let client = OAuthClient {
        client_id: client_id.to_owned(),
        client_secret_hash: Some(bcrypt::hash(&secret, 4).unwrap()),
        name: format!("Test client {client_id}"),
        redirect_uris: vec![redirect_uri.to_owned()],
        is_confidential: true,
        is_active: true,
        allowed_scopes: Some("openid email profile".to_owned()),
        created_at: Utc::now(),
        last_used_at: None,
    };
    resources.store.create_oauth_client(&client).await.unwrap();
    (client, secret)
}

/// A PKCE verifier and its S256 challenge
pub fn pkce_pair() -> (String, String) {
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk".to_owned();
    let digest = Sha256::digest(verifier.as_bytes());
    let challenge = general_purpose::URL_SAFE_NO_PAD.encode(digest);
    (verifier, challenge)
}

/// Assertion verifier that accepts everything and returns fixed attributes
pub struct StaticAssertionVerifier {
    /// Attributes the stub asserts
    pub attributes: HashMap<String, Value>,
}

impl StaticAssertionVerifier {
    /// Stub asserting the given email through the standard SAML URN
    pub fn asserting_email(email: &str) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert(
            "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress".to_owned(),
            Value::Array(vec![Value::String(email.to_owned())]),
        );
        attributes.insert(
            "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name".to_owned(),
            Value::String("Asserted User".to_owned()),
        );
        Self { attributes }
    }
}

impl AssertionVerifier for StaticAssertionVerifier {
    fn verify(
        &self,
        _saml_response_b64: &str,
        _certificate_pem: Option<&str>,
    ) -> Result<VerifiedAssertion, SsoError> {
        Ok(VerifiedAssertion {
            subject: "asserted-subject".to_owned(),
            attributes: self.attributes.clone(),
        })
    }
}

/// Decode a JWT payload without verification (test inspection only)
pub fn decode_jwt_payload(token: &str) -> Value {
    let payload = token.split('.').nth(1).expect("JWT has no payload");
    let decoded = general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .expect("JWT payload is not base64url");
    serde_json::from_slice(&decoded).expect("JWT payload is not JSON")
}
