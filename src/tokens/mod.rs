// ABOUTME: JWT token issuance, validation, and revocation for the identity platform
// ABOUTME: Single source of truth for signing algorithm, secret, issuer, and audience
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Janua Identity

//! # Token Service
//!
//! Issues and verifies the platform's signed tokens (access, refresh, ID)
//! and owns the revocation blacklist plus the short-TTL validation cache.
//! Verification fails closed: signature, expiry, issuer, audience, and
//! revocation are all checked, and any mismatch is a typed [`TokenError`].

use crate::cache::{Cache, CacheKey};
use crate::config::environment::AuthConfig;
use crate::constants::cache::TTL_TOKEN_VALIDATION_SECS;
use crate::errors::AppResult;
use crate::models::User;
use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Token validation error
///
/// The taxonomy is intentionally coarse: protocol callers learn only that a
/// token failed, never which check rejected it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Token has expired
    #[error("token has expired")]
    Expired,
    /// Signature, issuer, audience, or claim mismatch
    #[error("token is invalid")]
    Invalid,
    /// Not a well-formed JWT
    #[error("token is malformed")]
    Malformed,
    /// Token id is on the revocation blacklist
    #[error("token has been revoked")]
    Revoked,
}

/// What a token may be used for, embedded as the `token_use` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    /// Short-lived bearer token for API access
    Access,
    /// Long-lived token exchanged for new access tokens
    Refresh,
}

/// `JWT` claims for access and refresh tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer
    pub iss: String,
    /// Subject (user ID, or `client:{id}` for client-credential tokens)
    pub sub: String,
    /// Audience
    pub aud: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued-at timestamp
    pub iat: i64,
    /// Time of the original end-user authentication
    pub auth_time: i64,
    /// Unique token id, the blacklist key
    pub jti: String,
    /// Token purpose
    pub token_use: TokenUse,
    /// Space-separated granted scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// OAuth client the token was issued to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Subject email, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// OpenID Connect ID token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject identifier
    pub sub: String,
    /// Audience (the OAuth client id)
    pub aud: String,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued-at timestamp
    pub iat: i64,
    /// Time of the end-user authentication
    pub auth_time: i64,
    /// Subject email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Whether the email is verified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Replay-protection nonce echoed from the authorization request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Access token hash (left 128 bits of SHA-256, base64url)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
}

/// Cached result of a successful token validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenValidation {
    /// Validated subject
    pub sub: String,
    /// Granted scopes
    pub scope: Option<String>,
    /// Issuing client
    pub client_id: Option<String>,
    /// Token id
    pub jti: String,
    /// Expiration timestamp
    pub expires_at: i64,
}

/// Token manager: issues, validates, and revokes platform tokens
pub struct TokenManager {
    secret: Vec<u8>,
    issuer: String,
    audience: String,
    access_expiry_secs: i64,
    refresh_expiry_days: i64,
    cache: Arc<Cache>,
}

impl TokenManager {
    /// Create a token manager from configuration and a shared cache
    #[must_use]
    pub fn new(secret: Vec<u8>, config: &AuthConfig, cache: Arc<Cache>) -> Self {
        Self {
            secret,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_expiry_secs: config.access_token_expiry_secs,
            refresh_expiry_days: config.refresh_token_expiry_days,
            cache,
        }
    }

    /// Access token lifetime in seconds, surfaced in token responses
    #[must_use]
    pub const fn access_expiry_secs(&self) -> i64 {
        self.access_expiry_secs
    }

    /// Issuer URL used in every token
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue an access token for a user (or `client:{id}` subject)
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails
    pub fn issue_access_token(
        &self,
        subject: &str,
        email: Option<&str>,
        client_id: Option<&str>,
        scope: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            aud: self.audience.clone(),
            exp: (now + Duration::seconds(self.access_expiry_secs)).timestamp(),
            iat: now.timestamp(),
            auth_time: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_use: TokenUse::Access,
            scope: scope.map(ToOwned::to_owned),
            client_id: client_id.map(ToOwned::to_owned),
            email: email.map(ToOwned::to_owned),
        };

        self.encode_claims(&claims)
    }

    /// Issue a refresh token bound to the issuing client
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails
    pub fn issue_refresh_token(
        &self,
        subject: &str,
        client_id: Option<&str>,
        scope: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            aud: self.audience.clone(),
            exp: (now + Duration::days(self.refresh_expiry_days)).timestamp(),
            iat: now.timestamp(),
            auth_time: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_use: TokenUse::Refresh,
            scope: scope.map(ToOwned::to_owned),
            client_id: client_id.map(ToOwned::to_owned),
            email: None,
        };

        self.encode_claims(&claims)
    }

    /// Issue an OpenID Connect ID token
    ///
    /// `at_hash` is computed from the access token when provided, per OIDC
    /// Core section 3.1.3.6.
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails
    pub fn issue_id_token(
        &self,
        user: &User,
        client_id: &str,
        nonce: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now();
        let at_hash = access_token.map(|token| {
            let digest = Sha256::digest(token.as_bytes());
            general_purpose::URL_SAFE_NO_PAD.encode(&digest[..16])
        });

        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: user.id.to_string(),
            aud: client_id.to_owned(),
            exp: (now + Duration::seconds(crate::constants::limits::ID_TOKEN_EXPIRY_SECS))
                .timestamp(),
            iat: now.timestamp(),
            auth_time: now.timestamp(),
            email: Some(user.email.clone()),
            email_verified: Some(user.email_verified),
            name: user.display_name.clone(),
            nonce: nonce.map(ToOwned::to_owned),
            at_hash,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(token)
    }

    /// Decode and verify a token's signature, expiry, issuer, and audience
    ///
    /// Does not consult the blacklist; use [`Self::validate`] on request
    /// paths.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] describing the first failed check
    pub fn decode_and_verify(
        &self,
        token: &str,
        expected_use: TokenUse,
    ) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        )
        .map_err(|e| Self::convert_jwt_error(&e))?;

        if token_data.claims.token_use != expected_use {
            tracing::warn!(
                "Token presented with wrong token_use: expected {:?}",
                expected_use
            );
            return Err(TokenError::Invalid);
        }

        Ok(token_data.claims)
    }

    /// Fully validate a token: signature, expiry, issuer, audience, and
    /// revocation blacklist
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`]; blacklisted tokens yield
    /// [`TokenError::Revoked`]
    pub async fn validate(
        &self,
        token: &str,
        expected_use: TokenUse,
    ) -> Result<Claims, TokenError> {
        let claims = self.decode_and_verify(token, expected_use)?;

        // Store failures fail closed: an unreadable blacklist rejects the token
        let blacklisted = self
            .cache
            .exists(&CacheKey::token_blacklist(&claims.jti))
            .await
            .map_err(|e| {
                tracing::error!("Blacklist lookup failed, rejecting token: {e}");
                TokenError::Invalid
            })?;

        if blacklisted {
            return Err(TokenError::Revoked);
        }

        Ok(claims)
    }

    /// Validate an access token with the short-TTL result cache
    ///
    /// Cache hits skip signature verification; the cached entry's own expiry
    /// is still enforced, and revocation invalidates the entry synchronously.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] when validation fails
    pub async fn validate_cached(&self, token: &str) -> Result<TokenValidation, TokenError> {
        let key = CacheKey::token_validation(&Self::hash_token(token));

        // Cache failures degrade to a full validation, never to a rejection
        if let Ok(Some(cached)) = self.cache.get::<TokenValidation>(&key).await {
            if cached.expires_at > Utc::now().timestamp() {
                tracing::debug!("Token validation cache hit");
                return Ok(cached);
            }
            return Err(TokenError::Expired);
        }

        let claims = self.validate(token, TokenUse::Access).await?;
        let validation = TokenValidation {
            sub: claims.sub,
            scope: claims.scope,
            client_id: claims.client_id,
            jti: claims.jti,
            expires_at: claims.exp,
        };

        let remaining = (claims.exp - Utc::now().timestamp()).max(0) as u64;
        let ttl = std::time::Duration::from_secs(remaining.min(TTL_TOKEN_VALIDATION_SECS));
        if let Err(e) = self.cache.set(&key, &validation, ttl).await {
            tracing::warn!("Failed to cache token validation: {e}");
        }

        Ok(validation)
    }

    /// Revoke a token by blacklisting its id for its remaining lifetime
    ///
    /// Tokens that fail to parse or verify are ignored: revocation never
    /// reveals whether a token existed (RFC 7009).
    ///
    /// # Errors
    ///
    /// Returns an error only if the blacklist write fails
    pub async fn revoke(&self, token: &str) -> AppResult<()> {
        // Verify the signature but not expiry: expired tokens are a no-op,
        // garbage is a silent success
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);

        let Ok(token_data) = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &validation,
        ) else {
            tracing::debug!("Revocation requested for unverifiable token, ignoring");
            return Ok(());
        };

        let claims = token_data.claims;
        let remaining = claims.exp - Utc::now().timestamp();
        if remaining > 0 {
            self.cache
                .set(
                    &CacheKey::token_blacklist(&claims.jti),
                    &true,
                    std::time::Duration::from_secs(remaining as u64),
                )
                .await?;
        }

        // Invalidate the cached validation result for this exact token
        self.cache
            .delete(&CacheKey::token_validation(&Self::hash_token(token)))
            .await?;

        tracing::info!("Token revoked for subject {}", claims.sub);
        Ok(())
    }

    /// Hash a token for use as a cache key (never store raw tokens as keys)
    #[must_use]
    pub fn hash_token(token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        hex::encode(&digest[..16])
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        let token = encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&self.secret),
        )?;
        Ok(token)
    }

    fn convert_jwt_error(e: &jsonwebtoken::errors::Error) -> TokenError {
        use jsonwebtoken::errors::ErrorKind;

        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed,
            _ => {
                tracing::debug!("JWT validation failed: {e:?}");
                TokenError::Invalid
            }
        }
    }
}

/// Generate a random `JWT` secret
///
/// # Errors
///
/// Returns an error if the system RNG fails - this is a critical security
/// failure and the server cannot operate without working RNG
pub fn generate_jwt_secret() -> Result<[u8; 64]> {
    use ring::rand::{SecureRandom, SystemRandom};

    let rng = SystemRandom::new();
    let mut secret = [0u8; 64];

    rng.fill(&mut secret).map_err(|e| {
        tracing::error!("CRITICAL: Failed to generate cryptographically secure JWT secret: {e}");
        anyhow::anyhow!("System RNG failure - cannot generate secure JWT secret")
    })?;

    Ok(secret)
}
