// ABOUTME: Shared server resources bundle with Arc-based dependency wiring
// ABOUTME: Builds the store, cache, token service, and decision engines from configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use crate::cache::{Cache, CacheConfig};
use crate::config::environment::{Environment, ServerConfig};
use crate::crypto::secrets::SecretCipher;
use crate::errors::{AppError, AppResult};
use crate::oauth2::OAuth2AuthorizationServer;
use crate::policy::PolicyEngine;
use crate::rbac::RbacEngine;
use crate::risk::RiskAssessmentService;
use crate::sso::provisioning::StoreProvisioner;
use crate::sso::saml::{AssertionVerifier, RejectAllVerifier, Saml2Protocol};
use crate::sso::{oidc::OidcProtocol, SsoOrchestrator};
use crate::store::{self, Store};
use crate::tokens::{generate_jwt_secret, TokenManager};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use std::time::Duration;

/// Everything the HTTP layer needs, shared once via `Arc`
pub struct ServerResources {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Identity store
    pub store: Store,
    /// Shared cache
    pub cache: Arc<Cache>,
    /// Token service
    pub tokens: Arc<TokenManager>,
    /// OAuth2 authorization server
    pub oauth2: Arc<OAuth2AuthorizationServer>,
    /// SSO orchestrator
    pub sso: Arc<SsoOrchestrator>,
    /// RBAC engine
    pub rbac: Arc<RbacEngine>,
    /// Policy decision engine
    pub policy: Arc<PolicyEngine>,
    /// Risk assessment engine
    pub risk: Arc<RiskAssessmentService>,
}

impl ServerResources {
    /// Build all resources from configuration with the fail-closed SAML
    /// verifier
    ///
    /// # Errors
    ///
    /// Returns an error if any backend fails to initialize
    pub async fn new(config: Arc<ServerConfig>) -> AppResult<Self> {
        Self::new_with_verifier(config, Arc::new(RejectAllVerifier)).await
    }

    /// Build all resources with an explicit SAML assertion verifier
    ///
    /// # Errors
    ///
    /// Returns an error if any backend fails to initialize
    pub async fn new_with_verifier(
        config: Arc<ServerConfig>,
        assertion_verifier: Arc<dyn AssertionVerifier>,
    ) -> AppResult<Self> {
        let cache = Arc::new(
            Cache::from_config(CacheConfig {
                max_entries: config.cache.max_entries,
                redis_url: config.cache.redis_url.clone(),
                cleanup_interval: Duration::from_secs(config.cache.cleanup_interval_secs),
                // Background tasks conflict with per-test runtimes
                enable_background_cleanup: config.environment != Environment::Testing,
            })
            .await?,
        );

        let store = store::from_config(&config.database_url).await?;

        let jwt_secret = match config.auth.jwt_secret.as_deref() {
            Some(encoded) => general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| AppError::config(format!("JWT_SECRET is not valid base64: {e}")))?,
            None => {
                tracing::warn!("JWT_SECRET not set, generating an ephemeral secret");
                generate_jwt_secret()?.to_vec()
            }
        };

        let tokens = Arc::new(TokenManager::new(jwt_secret, &config.auth, cache.clone()));

        let secrets = match config.sso.secret_encryption_key.as_deref() {
            Some(encoded) => SecretCipher::from_base64(encoded)
                .map_err(|e| AppError::config(format!("Invalid SSO secret key: {e}")))?,
            None => {
                tracing::warn!("SSO_SECRET_ENCRYPTION_KEY not set, generating an ephemeral key");
                SecretCipher::new(SecretCipher::generate_key()?)
            }
        };

        let saml = Saml2Protocol::new(assertion_verifier);
        let oidc = OidcProtocol::new(
            config.sso.allowed_metadata_hosts.clone(),
            config.sso.metadata_timeout_secs,
        )
        .map_err(|e| AppError::config(e.to_string()))?;

        let sso = Arc::new(SsoOrchestrator::new(
            store.clone(),
            cache.clone(),
            tokens.clone(),
            secrets,
            Arc::new(StoreProvisioner::new(store.clone())),
            saml,
            oidc,
            config.sso.callback_base_url.clone(),
        ));

        let oauth2 = Arc::new(OAuth2AuthorizationServer::new(
            store.clone(),
            cache.clone(),
            tokens.clone(),
            config.oauth2_server.clone(),
        ));

        let rbac = Arc::new(RbacEngine::new(store.clone(), cache.clone()));
        let policy = Arc::new(PolicyEngine::new(store.clone(), cache.clone()));
        let risk = Arc::new(RiskAssessmentService::new(store.clone()));

        Ok(Self {
            config,
            store,
            cache,
            tokens,
            oauth2,
            sso,
            rbac,
            policy,
            risk,
        })
    }
}
