// ABOUTME: SSO orchestrator federating external identity providers into local sessions
// ABOUTME: Protocol-agnostic flow: resolve config, delegate to protocol, map attributes, JIT provision
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! # SSO Orchestrator
//!
//! Resolves per-organization IdP configuration, delegates to the matching
//! protocol implementation ([`saml::Saml2Protocol`] or
//! [`oidc::OidcProtocol`]), maps asserted attributes into a local profile,
//! hands the profile to the user-provisioning collaborator, and finally
//! issues internal tokens through the token service.
//!
//! IdP secrets are stored encrypted; this module is the only place they
//! are decrypted.

/// SSO failure taxonomy
pub mod error;
/// Attribute mapping with transforms
pub mod mapping;
/// OIDC federation
pub mod oidc;
/// Protocol selection and provider configuration
pub mod provider;
/// JIT user provisioning boundary
pub mod provisioning;
/// SAML 2.0 federation
pub mod saml;

use crate::cache::{Cache, CacheKey};
use crate::constants::limits::{SSO_SESSION_EXPIRY_HOURS, SSO_STATE_TTL_SECS};
use crate::crypto::random::generate_random_string;
use crate::crypto::secrets::SecretCipher;
use crate::models::SsoSession;
use crate::store::{IdentityStore, Store};
use crate::tokens::TokenManager;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use error::SsoError;
use mapping::{map_oidc_claims, map_saml_attributes, MappedProfile};
use oidc::OidcProtocol;
use provider::{PendingSsoState, SsoProtocolKind, SsoProviderConfig, SsoRedirect};
use provisioning::UserProvisioner;
use saml::Saml2Protocol;

/// Outcome of a successful federated login
#[derive(Debug, Clone, Serialize)]
pub struct SsoLoginResult {
    /// Authenticated local user
    pub user_id: Uuid,
    /// User email
    pub email: String,
    /// Federated session id
    pub session_id: Uuid,
    /// Internal access token
    pub access_token: String,
    /// Internal refresh token
    pub refresh_token: String,
    /// Where the client asked to return after login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

/// Protocol-agnostic SSO orchestrator
pub struct SsoOrchestrator {
    store: Store,
    cache: Arc<Cache>,
    tokens: Arc<TokenManager>,
    secrets: SecretCipher,
    provisioner: Arc<dyn UserProvisioner>,
    saml: Saml2Protocol,
    oidc: OidcProtocol,
    callback_base_url: String,
}

impl SsoOrchestrator {
    /// Assemble the orchestrator from its collaborators
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        cache: Arc<Cache>,
        tokens: Arc<TokenManager>,
        secrets: SecretCipher,
        provisioner: Arc<dyn UserProvisioner>,
        saml: Saml2Protocol,
        oidc: OidcProtocol,
        callback_base_url: String,
    ) -> Self {
        Self {
            store,
            cache,
            tokens,
            secrets,
            provisioner,
            saml,
            oidc,
            callback_base_url,
        }
    }

    /// Begin a federated login for an organization
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Configuration`] when the organization has no
    /// active IdP configuration; protocol failures surface with their own
    /// kinds
    pub async fn initiate_authentication(
        &self,
        org_id: Uuid,
        return_url: Option<String>,
    ) -> Result<SsoRedirect, SsoError> {
        let config = self.resolve_config(org_id).await?;

        let state = generate_random_string(32)
            .map_err(|e| SsoError::Configuration(format!("RNG failure: {e}")))?;
        let nonce = match config.protocol {
            SsoProtocolKind::Oidc => Some(
                generate_random_string(16)
                    .map_err(|e| SsoError::Configuration(format!("RNG failure: {e}")))?,
            ),
            SsoProtocolKind::Saml2 => None,
        };

        let pending = PendingSsoState {
            organization_id: org_id,
            protocol: config.protocol,
            return_url,
            nonce: nonce.clone(),
            created_at: Utc::now(),
        };

        self.cache
            .set(
                &CacheKey::sso_state(&state),
                &pending,
                std::time::Duration::from_secs(SSO_STATE_TTL_SECS),
            )
            .await
            .map_err(|e| SsoError::Configuration(format!("Failed to persist SSO state: {e}")))?;

        let redirect_url = match config.protocol {
            SsoProtocolKind::Saml2 => {
                let acs_url = format!("{}/sso/saml/acs", self.callback_base_url);
                self.saml.initiate(&config, &acs_url, &state)?
            }
            SsoProtocolKind::Oidc => {
                let redirect_uri = self.oidc_redirect_uri();
                let nonce = nonce.as_deref().unwrap_or_default();
                self.oidc
                    .initiate(&config, &redirect_uri, &state, nonce)
                    .await?
            }
        };

        tracing::info!(%org_id, protocol = %config.protocol, "SSO flow initiated");

        Ok(SsoRedirect {
            redirect_url,
            state,
            protocol: config.protocol,
        })
    }

    /// Handle the SAML assertion consumer callback
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Validation`] for unknown/expired relay state,
    /// verification failures with their own kinds
    pub async fn handle_saml_callback(
        &self,
        saml_response: &str,
        relay_state: &str,
    ) -> Result<SsoLoginResult, SsoError> {
        let pending = self.consume_state(relay_state).await?;
        let config = self.resolve_config(pending.organization_id).await?;

        if config.protocol != SsoProtocolKind::Saml2 {
            return Err(SsoError::Validation(
                "Relay state does not belong to a SAML flow".into(),
            ));
        }

        let assertion = self.saml.handle_callback(&config, saml_response)?;
        let profile = map_saml_attributes(&assertion.attributes, config.attribute_mapping.as_ref());

        self.complete_login(&config, profile, pending.return_url)
            .await
    }

    /// Handle the OIDC authorization-code callback
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Authentication`] when the IdP reported an error
    /// or the exchanged ID token fails validation
    pub async fn handle_oidc_callback(
        &self,
        code: Option<&str>,
        state: &str,
        error: Option<&str>,
        error_description: Option<&str>,
    ) -> Result<SsoLoginResult, SsoError> {
        if let Some(error) = error {
            return Err(SsoError::Authentication(format!(
                "IdP returned error '{error}': {}",
                error_description.unwrap_or("no description")
            )));
        }

        let Some(code) = code else {
            return Err(SsoError::Validation("Missing authorization code".into()));
        };

        let pending = self.consume_state(state).await?;
        let config = self.resolve_config(pending.organization_id).await?;

        if config.protocol != SsoProtocolKind::Oidc {
            return Err(SsoError::Validation(
                "State does not belong to an OIDC flow".into(),
            ));
        }

        let discovery_url = config.discovery_url.as_deref().ok_or_else(|| {
            SsoError::Configuration("OIDC configuration is missing the discovery URL".into())
        })?;
        let discovery = self.oidc.fetch_discovery(discovery_url).await?;

        let client_secret = self.decrypt_client_secret(&config)?;
        let assertion = self
            .oidc
            .exchange_code(
                &config,
                &discovery.token_endpoint,
                code,
                &self.oidc_redirect_uri(),
                client_secret.as_deref(),
                pending.nonce.as_deref(),
            )
            .await?;

        let profile = map_oidc_claims(&assertion.attributes, config.attribute_mapping.as_ref());

        self.complete_login(&config, profile, pending.return_url)
            .await
    }

    /// End a federated session
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Provisioning`] when the session store is
    /// unreachable
    pub async fn logout(&self, session_id: Uuid) -> Result<(), SsoError> {
        self.store
            .delete_sso_session(session_id)
            .await
            .map_err(|e| SsoError::Provisioning(format!("Failed to end session: {e}")))?;
        tracing::info!(%session_id, "SSO session ended");
        Ok(())
    }

    /// Encrypt an IdP client secret for storage
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Configuration`] if encryption fails
    pub fn encrypt_client_secret(&self, plaintext: &str) -> Result<String, SsoError> {
        self.secrets
            .encrypt(plaintext)
            .map_err(|e| SsoError::Configuration(format!("Secret encryption failed: {e}")))
    }

    async fn resolve_config(&self, org_id: Uuid) -> Result<SsoProviderConfig, SsoError> {
        let config = self
            .store
            .get_sso_config(org_id)
            .await
            .map_err(|e| SsoError::Configuration(format!("SSO config lookup failed: {e}")))?
            .ok_or_else(|| {
                SsoError::Configuration(format!("Organization {org_id} has no SSO configuration"))
            })?;

        if !config.is_active {
            return Err(SsoError::Configuration(format!(
                "SSO is disabled for organization {org_id}"
            )));
        }

        Ok(config)
    }

    /// Consume the pending state exactly once; replays observe an absent key
    async fn consume_state(&self, state: &str) -> Result<PendingSsoState, SsoError> {
        self.cache
            .take::<PendingSsoState>(&CacheKey::sso_state(state))
            .await
            .map_err(|e| SsoError::Validation(format!("State lookup failed: {e}")))?
            .ok_or_else(|| SsoError::Validation("Unknown or expired SSO state".into()))
    }

    fn decrypt_client_secret(
        &self,
        config: &SsoProviderConfig,
    ) -> Result<Option<String>, SsoError> {
        config
            .encrypted_client_secret
            .as_deref()
            .map(|encrypted| {
                self.secrets.decrypt(encrypted).map_err(|e| {
                    SsoError::Configuration(format!("Secret decryption failed: {e}"))
                })
            })
            .transpose()
    }

    fn oidc_redirect_uri(&self) -> String {
        format!("{}/sso/oidc/callback", self.callback_base_url)
    }

    async fn complete_login(
        &self,
        config: &SsoProviderConfig,
        profile: MappedProfile,
        return_url: Option<String>,
    ) -> Result<SsoLoginResult, SsoError> {
        let user = self
            .provisioner
            .create_or_update(&profile, config.organization_id)
            .await?;

        let session = SsoSession {
            session_id: Uuid::new_v4(),
            user_id: user.id,
            organization_id: config.organization_id,
            provider: config.provider.clone(),
            protocol: config.protocol.to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::hours(SSO_SESSION_EXPIRY_HOURS),
        };

        self.store
            .create_sso_session(&session)
            .await
            .map_err(|e| SsoError::Provisioning(format!("Failed to record session: {e}")))?;

        let subject = user.id.to_string();
        let access_token = self
            .tokens
            .issue_access_token(&subject, Some(&user.email), None, Some("openid"))
            .map_err(|e| SsoError::Authentication(format!("Failed to issue tokens: {e}")))?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(&subject, None, Some("openid"))
            .map_err(|e| SsoError::Authentication(format!("Failed to issue tokens: {e}")))?;

        tracing::info!(
            user_id = %user.id,
            org_id = %config.organization_id,
            provider = %config.provider,
            "Federated login completed"
        );

        Ok(SsoLoginResult {
            user_id: user.id,
            email: user.email,
            session_id: session.session_id,
            access_token,
            refresh_token,
            return_url,
        })
    }
}
