// ABOUTME: OAuth 2.0 authorization server core: authorize, token, userinfo, introspect, revoke
// ABOUTME: Single-use codes via atomic cache take, PKCE with constant-time comparison
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Janua Identity

//! OAuth 2.0 / OIDC authorization server implementation (RFC 6749,
//! RFC 7636, RFC 7662, RFC 7009, OIDC Core).
//!
//! Authorization codes live in the shared cache under `oauth:code:{code}`
//! and are consumed with an atomic take, so exactly one concurrent
//! exchange can succeed. Introspection and revocation never reveal whether
//! a token or client existed.

use super::models::{
    AuthCodeData, AuthorizeRequest, AuthorizeResponse, IntrospectRequest, OAuth2Error,
    RevokeRequest, TokenRequest, TokenResponse, UserInfoResponse,
};
use crate::cache::{Cache, CacheKey};
use crate::config::environment::OAuth2ServerConfig;
use crate::constants::limits::{PKCE_MAX_LEN, PKCE_MIN_LEN};
use crate::crypto::random::generate_random_string;
use crate::models::{OAuthClient, User};
use crate::store::{IdentityStore, Store};
use crate::tokens::{TokenManager, TokenUse};
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use url::Url;
use uuid::Uuid;

/// OAuth 2.0 Authorization Server
pub struct OAuth2AuthorizationServer {
    store: Store,
    cache: Arc<Cache>,
    tokens: Arc<TokenManager>,
    config: OAuth2ServerConfig,
}

impl OAuth2AuthorizationServer {
    /// Assemble the server over its collaborators
    #[must_use]
    pub fn new(
        store: Store,
        cache: Arc<Cache>,
        tokens: Arc<TokenManager>,
        config: OAuth2ServerConfig,
    ) -> Self {
        Self {
            store,
            cache,
            tokens,
            config,
        }
    }

    /// Issuer URL advertised in the discovery document
    #[must_use]
    pub fn issuer_url(&self) -> &str {
        &self.config.issuer_url
    }

    /// Handle an authorization request for an already-authenticated user
    ///
    /// # Errors
    ///
    /// Returns the protocol error code the client must branch on:
    /// `unsupported_response_type`, `invalid_client`,
    /// `invalid_redirect_uri`, or `invalid_request`
    pub async fn authorize(
        &self,
        request: AuthorizeRequest,
        user_id: Uuid,
    ) -> Result<AuthorizeResponse, OAuth2Error> {
        if request.response_type != "code" {
            return Err(OAuth2Error::unsupported_response_type());
        }

        let client = self.load_active_client(&request.client_id).await?;

        if !redirect_uri_allowed(&request.redirect_uri, &client.redirect_uris) {
            return Err(OAuth2Error::invalid_redirect_uri());
        }

        if let Some(challenge) = &request.code_challenge {
            if challenge.len() < PKCE_MIN_LEN || challenge.len() > PKCE_MAX_LEN {
                return Err(OAuth2Error::invalid_request(
                    "code_challenge must be between 43 and 128 characters",
                ));
            }
            let method = request.code_challenge_method.as_deref().unwrap_or("S256");
            if method != "S256" && method != "plain" {
                return Err(OAuth2Error::invalid_request(
                    "Unsupported code_challenge_method",
                ));
            }
        }

        let scope = request
            .scope
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.default_scope.clone());

        let code = generate_random_string(32).map_err(|e| {
            tracing::error!("Failed to mint authorization code: {e:#}");
            OAuth2Error::server_error()
        })?;

        let code_data = AuthCodeData {
            client_id: request.client_id.clone(),
            user_id: user_id.to_string(),
            redirect_uri: request.redirect_uri.clone(),
            scope,
            nonce: request.nonce.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: Some(
                request
                    .code_challenge_method
                    .clone()
                    .unwrap_or_else(|| "S256".to_owned()),
            ),
        };

        self.cache
            .set(
                &CacheKey::auth_code(&code),
                &code_data,
                Duration::from_secs(self.config.auth_code_ttl_secs),
            )
            .await
            .map_err(|e| {
                tracing::error!("Failed to store authorization code: {e}");
                OAuth2Error::server_error()
            })?;

        if let Err(e) = self
            .store
            .touch_oauth_client(&request.client_id, Utc::now())
            .await
        {
            tracing::warn!("Failed to update client last_used_at: {e}");
        }

        tracing::info!(client_id = %request.client_id, %user_id, "Authorization code issued");

        Ok(AuthorizeResponse {
            code,
            state: request.state,
            redirect_uri: request.redirect_uri,
        })
    }

    /// Handle a token request (POST /oauth/token)
    ///
    /// Client credentials arrive in the form body or as HTTP Basic auth.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` for authentication failures,
    /// `invalid_grant` for code/token failures, and
    /// `unsupported_grant_type` otherwise
    pub async fn token(
        &self,
        mut request: TokenRequest,
        basic_auth: Option<(String, String)>,
    ) -> Result<TokenResponse, OAuth2Error> {
        if let Some((client_id, client_secret)) = basic_auth {
            request.client_id = Some(client_id);
            request.client_secret = Some(client_secret);
        }

        let Some(client_id) = request.client_id.clone() else {
            return Err(OAuth2Error::invalid_request("client_id required"));
        };

        let client = self.load_active_client(&client_id).await?;

        // Confidential clients must authenticate (RFC 6749 section 6)
        if client.is_confidential {
            let Some(secret) = request.client_secret.as_deref() else {
                return Err(OAuth2Error::invalid_client("client_secret required"));
            };
            if !verify_client_secret(secret, client.client_secret_hash.as_deref()).await {
                tracing::warn!(%client_id, "Client secret verification failed");
                return Err(OAuth2Error::invalid_client("Invalid client_secret"));
            }
        }

        let response = match request.grant_type.as_str() {
            "authorization_code" => self.handle_authorization_code_grant(&request, &client).await,
            "refresh_token" => self.handle_refresh_token_grant(&request, &client).await,
            other => Err(OAuth2Error::unsupported_grant_type(other)),
        }?;

        if let Err(e) = self.store.touch_oauth_client(&client_id, Utc::now()).await {
            tracing::warn!("Failed to update client last_used_at: {e}");
        }

        Ok(response)
    }

    async fn handle_authorization_code_grant(
        &self,
        request: &TokenRequest,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuth2Error> {
        let Some(code) = request.code.as_deref() else {
            return Err(OAuth2Error::invalid_request("code required"));
        };

        // Atomic take: check-existence, validate, and delete are one
        // indivisible operation, so a replayed code observes nothing
        let code_data: AuthCodeData = self
            .cache
            .take(&CacheKey::auth_code(code))
            .await
            .map_err(|e| {
                tracing::error!("Authorization code store unreachable, failing closed: {e}");
                OAuth2Error::invalid_grant("Failed to consume authorization code")
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("Code not found or expired"))?;

        if code_data.client_id != client.client_id {
            tracing::warn!(
                client_id = %client.client_id,
                "Authorization code presented by a different client"
            );
            return Err(OAuth2Error::invalid_grant(
                "Code was not issued to this client",
            ));
        }

        if let Some(redirect_uri) = request.redirect_uri.as_deref() {
            if code_data.redirect_uri != redirect_uri {
                return Err(OAuth2Error::invalid_grant("redirect_uri mismatch"));
            }
        }

        if let Some(challenge) = code_data.code_challenge.as_deref() {
            let Some(verifier) = request.code_verifier.as_deref() else {
                return Err(OAuth2Error::invalid_request("code_verifier required"));
            };
            let method = code_data.code_challenge_method.as_deref().unwrap_or("S256");
            if !verify_pkce(verifier, challenge, method) {
                tracing::warn!(client_id = %client.client_id, "PKCE verification failed");
                return Err(OAuth2Error::invalid_grant("PKCE verification failed"));
            }
        } else if request.code_verifier.is_some() {
            return Err(OAuth2Error::invalid_grant(
                "code_verifier provided but no code_challenge was issued",
            ));
        }

        let user = self.load_code_user(&code_data.user_id).await?;

        self.issue_tokens(&user, client, &code_data.scope, code_data.nonce.as_deref())
    }

    async fn handle_refresh_token_grant(
        &self,
        request: &TokenRequest,
        client: &OAuthClient,
    ) -> Result<TokenResponse, OAuth2Error> {
        let Some(refresh_token) = request.refresh_token.as_deref() else {
            return Err(OAuth2Error::invalid_request("refresh_token required"));
        };

        let claims = self
            .tokens
            .validate(refresh_token, TokenUse::Refresh)
            .await
            .map_err(|_| OAuth2Error::invalid_grant("Invalid refresh token"))?;

        if claims.client_id.as_deref() != Some(client.client_id.as_str()) {
            return Err(OAuth2Error::invalid_grant(
                "Token was not issued to this client",
            ));
        }

        let user = self.load_code_user(&claims.sub).await?;
        let scope = claims.scope.unwrap_or_else(|| "openid".to_owned());

        let access_token = self
            .tokens
            .issue_access_token(
                &user.id.to_string(),
                Some(&user.email),
                Some(&client.client_id),
                Some(&scope),
            )
            .map_err(|e| {
                tracing::error!("Failed to issue access token: {e:#}");
                OAuth2Error::server_error()
            })?;

        // The presented refresh token stays valid and is returned unchanged
        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.tokens.access_expiry_secs(),
            refresh_token: Some(refresh_token.to_owned()),
            id_token: None,
            scope,
        })
    }

    fn issue_tokens(
        &self,
        user: &User,
        client: &OAuthClient,
        scope: &str,
        nonce: Option<&str>,
    ) -> Result<TokenResponse, OAuth2Error> {
        let subject = user.id.to_string();

        let access_token = self
            .tokens
            .issue_access_token(
                &subject,
                Some(&user.email),
                Some(&client.client_id),
                Some(scope),
            )
            .map_err(|e| {
                tracing::error!("Failed to issue access token: {e:#}");
                OAuth2Error::server_error()
            })?;

        let refresh_token = self
            .tokens
            .issue_refresh_token(&subject, Some(&client.client_id), Some(scope))
            .map_err(|e| {
                tracing::error!("Failed to issue refresh token: {e:#}");
                OAuth2Error::server_error()
            })?;

        let id_token = if scope_contains(scope, "openid") {
            Some(
                self.tokens
                    .issue_id_token(user, &client.client_id, nonce, Some(&access_token))
                    .map_err(|e| {
                        tracing::error!("Failed to issue ID token: {e:#}");
                        OAuth2Error::server_error()
                    })?,
            )
        } else {
            None
        };

        tracing::info!(client_id = %client.client_id, user_id = %user.id, "Token exchange completed");

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in: self.tokens.access_expiry_secs(),
            refresh_token: Some(refresh_token),
            id_token,
            scope: scope.to_owned(),
        })
    }

    /// Handle a UserInfo request (OIDC Core section 5.3)
    ///
    /// Claims are filtered by the scopes granted to the presented token.
    ///
    /// # Errors
    ///
    /// Returns `invalid_token` for any verification failure
    pub async fn userinfo(&self, bearer_token: &str) -> Result<UserInfoResponse, OAuth2Error> {
        let validation = self
            .tokens
            .validate_cached(bearer_token)
            .await
            .map_err(|_| OAuth2Error::invalid_token("Token expired or invalid"))?;

        let user_id = crate::utils::uuid::parse_uuid(&validation.sub)
            .map_err(|_| OAuth2Error::invalid_token("Token subject is not a user"))?;

        let user = self
            .store
            .get_user(user_id)
            .await
            .map_err(|_| OAuth2Error::invalid_token("Token expired or invalid"))?
            .ok_or_else(|| OAuth2Error::invalid_token("User not found"))?;

        let scope = validation.scope.unwrap_or_default();
        let mut response = UserInfoResponse {
            sub: user.id.to_string(),
            ..UserInfoResponse::default()
        };

        if scope_contains(&scope, "email") || scope_contains(&scope, "openid") {
            response.email = Some(user.email.clone());
            response.email_verified = Some(user.email_verified);
        }

        if scope_contains(&scope, "profile") || scope_contains(&scope, "openid") {
            response.name = user.display_name.clone();
            if let Some(name) = &user.display_name {
                let mut parts = name.splitn(2, ' ');
                response.given_name = parts.next().map(ToOwned::to_owned);
                response.family_name = parts.next().map(ToOwned::to_owned);
            }
            response.picture = user.avatar_url.clone();
            response.updated_at = Some(user.updated_at.timestamp());
        }

        Ok(response)
    }

    /// Handle a token introspection request (RFC 7662)
    ///
    /// Any unverifiable token yields `{active: false}` with no further
    /// detail, so callers cannot probe why a token failed.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` when the calling client fails to
    /// authenticate
    pub async fn introspect(
        &self,
        request: IntrospectRequest,
        basic_auth: Option<(String, String)>,
    ) -> Result<serde_json::Value, OAuth2Error> {
        let (client_id, client_secret) = resolve_client_credentials(
            request.client_id.clone(),
            request.client_secret.clone(),
            basic_auth,
        );

        let Some(client_id) = client_id else {
            return Err(OAuth2Error::invalid_client(
                "Client authentication required",
            ));
        };

        let client = self.load_active_client(&client_id).await?;
        if client.is_confidential
            && !verify_client_secret(
                client_secret.as_deref().unwrap_or(""),
                client.client_secret_hash.as_deref(),
            )
            .await
        {
            return Err(OAuth2Error::invalid_client("Invalid client_secret"));
        }

        let expected_use = match request.token_type_hint.as_deref() {
            Some("refresh_token" | "refresh") => TokenUse::Refresh,
            _ => TokenUse::Access,
        };

        match self.tokens.validate(&request.token, expected_use).await {
            Ok(claims) => Ok(serde_json::json!({
                "active": true,
                "sub": claims.sub,
                "client_id": claims.client_id,
                "scope": claims.scope,
                "exp": claims.exp,
                "iat": claims.iat,
                "token_type": match expected_use {
                    TokenUse::Access => "access",
                    TokenUse::Refresh => "refresh",
                },
            })),
            // Never reveal why the token is inactive
            Err(_) => Ok(serde_json::json!({ "active": false })),
        }
    }

    /// Handle a token revocation request (RFC 7009)
    ///
    /// Always succeeds for invalid tokens; the response never reveals
    /// whether the token existed.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` when a known confidential client presents a
    /// bad secret, or `server_error` when the blacklist write fails
    pub async fn revoke(
        &self,
        request: RevokeRequest,
        basic_auth: Option<(String, String)>,
    ) -> Result<(), OAuth2Error> {
        let (client_id, client_secret) = resolve_client_credentials(
            request.client_id.clone(),
            request.client_secret.clone(),
            basic_auth,
        );

        if let Some(client_id) = client_id {
            if let Ok(Some(client)) = self.store.get_oauth_client(&client_id).await {
                if client.is_confidential
                    && !verify_client_secret(
                        client_secret.as_deref().unwrap_or(""),
                        client.client_secret_hash.as_deref(),
                    )
                    .await
                {
                    return Err(OAuth2Error::invalid_client("Invalid client_secret"));
                }
            }
        }

        self.tokens.revoke(&request.token).await.map_err(|e| {
            tracing::error!("Revocation blacklist write failed: {e}");
            OAuth2Error::server_error()
        })
    }

    /// The RFC 8414 discovery document
    #[must_use]
    pub fn discovery_document(&self) -> serde_json::Value {
        let issuer = &self.config.issuer_url;
        serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/oauth/authorize"),
            "token_endpoint": format!("{issuer}/oauth/token"),
            "userinfo_endpoint": format!("{issuer}/oauth/userinfo"),
            "introspection_endpoint": format!("{issuer}/oauth/introspect"),
            "revocation_endpoint": format!("{issuer}/oauth/revoke"),
            "grant_types_supported": ["authorization_code", "refresh_token"],
            "response_types_supported": ["code"],
            "token_endpoint_auth_methods_supported": ["client_secret_post", "client_secret_basic"],
            "scopes_supported": ["openid", "email", "profile"],
            "response_modes_supported": ["query"],
            "code_challenge_methods_supported": ["S256", "plain"],
        })
    }

    async fn load_active_client(&self, client_id: &str) -> Result<OAuthClient, OAuth2Error> {
        let client = self
            .store
            .get_oauth_client(client_id)
            .await
            .map_err(|e| {
                tracing::error!("Client lookup failed for client_id={client_id}: {e}");
                OAuth2Error::server_error()
            })?
            .ok_or_else(|| OAuth2Error::invalid_client("Unknown client_id"))?;

        if !client.is_active {
            return Err(OAuth2Error::invalid_client("Client is disabled"));
        }

        Ok(client)
    }

    async fn load_code_user(&self, user_id: &str) -> Result<User, OAuth2Error> {
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| OAuth2Error::invalid_grant("User not found"))?;

        self.store
            .get_user(user_id)
            .await
            .map_err(|e| {
                tracing::error!("User lookup failed during grant: {e}");
                OAuth2Error::invalid_grant("User not found")
            })?
            .ok_or_else(|| OAuth2Error::invalid_grant("User not found"))
    }
}

/// Normalize a redirect URI to `scheme://authority/path` with the trailing
/// slash stripped
#[must_use]
pub fn normalize_redirect_uri(uri: &str) -> Option<String> {
    let parsed = Url::parse(uri).ok()?;
    let origin = parsed.origin();
    if !matches!(origin, url::Origin::Tuple(..)) {
        return None;
    }
    let path = parsed.path().trim_end_matches('/');
    Some(format!("{}{path}", origin.ascii_serialization()))
}

/// Exact match of a normalized candidate against the registered URIs
#[must_use]
pub fn redirect_uri_allowed(candidate: &str, registered: &[String]) -> bool {
    let Some(candidate) = normalize_redirect_uri(candidate) else {
        return false;
    };

    registered
        .iter()
        .filter_map(|uri| normalize_redirect_uri(uri))
        .any(|registered| registered == candidate)
}

/// Verify a PKCE code verifier against the stored challenge (RFC 7636)
///
/// Both S256 and plain comparisons are constant-time.
#[must_use]
pub fn verify_pkce(verifier: &str, challenge: &str, method: &str) -> bool {
    if verifier.len() < PKCE_MIN_LEN || verifier.len() > PKCE_MAX_LEN {
        return false;
    }
    if !verifier
        .chars()
        .all(|c| matches!(c, 'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~'))
    {
        return false;
    }

    match method {
        "S256" => {
            let digest = Sha256::digest(verifier.as_bytes());
            let computed = general_purpose::URL_SAFE_NO_PAD.encode(digest);
            bool::from(computed.as_bytes().ct_eq(challenge.as_bytes()))
        }
        "plain" => bool::from(verifier.as_bytes().ct_eq(challenge.as_bytes())),
        _ => false,
    }
}

/// Verify a presented client secret against the stored bcrypt hash
///
/// Runs on the blocking pool; bcrypt is CPU-bound.
async fn verify_client_secret(presented: &str, stored_hash: Option<&str>) -> bool {
    let Some(hash) = stored_hash else {
        return false;
    };

    let presented = presented.to_owned();
    let hash = hash.to_owned();

    tokio::task::spawn_blocking(move || bcrypt::verify(&presented, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// Pull client credentials from form fields or HTTP Basic auth
fn resolve_client_credentials(
    form_id: Option<String>,
    form_secret: Option<String>,
    basic_auth: Option<(String, String)>,
) -> (Option<String>, Option<String>) {
    match (form_id, basic_auth) {
        (Some(id), _) => (Some(id), form_secret),
        (None, Some((id, secret))) => (Some(id), Some(secret)),
        (None, None) => (None, None),
    }
}

/// Whether a space-separated scope string contains a scope
#[must_use]
pub fn scope_contains(scope: &str, wanted: &str) -> bool {
    scope.split_whitespace().any(|s| s == wanted)
}
