// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, deployment modes, and runtime configuration parsing
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Janua Identity

//! Environment-based configuration management for production deployment

use crate::constants::{cache, limits, service_names};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Environment type for security and logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Type-safe database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DatabaseUrl {
    /// SQLite database with file path
    SQLite {
        /// Path to the database file
        path: PathBuf,
    },
    /// In-memory SQLite (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from a `sqlite:` URL string
    ///
    /// # Errors
    ///
    /// Returns an error for unsupported URL schemes
    pub fn parse_url(s: &str) -> Result<Self> {
        if let Some(path_str) = s.strip_prefix("sqlite:") {
            if path_str == ":memory:" {
                Ok(Self::Memory)
            } else {
                Ok(Self::SQLite {
                    path: PathBuf::from(path_str),
                })
            }
        } else {
            anyhow::bail!("Unsupported database URL (expected sqlite:...): {s}")
        }
    }

    /// Render back to the sqlx connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}?mode=rwc", path.display()),
            Self::Memory => "sqlite::memory:".into(),
        }
    }
}

/// Token service configuration: single source of truth for algorithm,
/// secret, issuer, and audience
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base64-encoded HMAC secret; generated at startup when unset
    pub jwt_secret: Option<String>,
    /// Token issuer (`iss` claim)
    pub issuer: String,
    /// Token audience (`aud` claim)
    pub audience: String,
    /// Access token lifetime in seconds
    pub access_token_expiry_secs: i64,
    /// Refresh token lifetime in days
    pub refresh_token_expiry_days: i64,
}

/// OAuth 2.0 authorization server configuration
#[derive(Debug, Clone)]
pub struct OAuth2ServerConfig {
    /// Public issuer URL advertised in the discovery document and ID tokens
    pub issuer_url: String,
    /// Authorization code TTL in seconds
    pub auth_code_ttl_secs: u64,
    /// Scope applied when the client requests none
    pub default_scope: String,
}

/// SSO federation configuration
#[derive(Debug, Clone)]
pub struct SsoConfig {
    /// Exact hosts allowed for metadata/discovery fetches; an empty list
    /// refuses every fetch (fail closed)
    pub allowed_metadata_hosts: Vec<String>,
    /// Timeout for metadata and discovery fetches in seconds
    pub metadata_timeout_secs: u64,
    /// Base URL for protocol callbacks (ACS, OIDC redirect)
    pub callback_base_url: String,
    /// Base64-encoded 32-byte key for IdP secret encryption at rest;
    /// generated at startup when unset
    pub secret_encryption_key: Option<String>,
}

/// Cache backend configuration
#[derive(Debug, Clone)]
pub struct CacheBackendConfig {
    /// Redis connection URL; in-memory backend is used when unset
    pub redis_url: Option<String>,
    /// Maximum entries for the in-memory backend
    pub max_entries: usize,
    /// Cleanup interval for expired entries (in-memory backend)
    pub cleanup_interval_secs: u64,
}

/// Complete server configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Database backend
    pub database_url: DatabaseUrl,
    /// Token service configuration
    pub auth: AuthConfig,
    /// OAuth2 authorization server configuration
    pub oauth2_server: OAuth2ServerConfig,
    /// SSO federation configuration
    pub sso: SsoConfig,
    /// Cache backend configuration
    pub cache: CacheBackendConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but unparseable
    pub fn from_env() -> Result<Self> {
        let http_port = env_parse("HTTP_PORT", 8081_u16)?;
        let environment = Environment::from_str_or_default(
            &env::var("ENVIRONMENT").unwrap_or_default(),
        );

        let database_url = DatabaseUrl::parse_url(
            &env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/janua.db".into()),
        )
        .context("Failed to parse DATABASE_URL")?;

        let issuer_url =
            env::var("ISSUER_URL").unwrap_or_else(|_| format!("http://localhost:{http_port}"));

        let auth = AuthConfig {
            jwt_secret: env::var("JWT_SECRET").ok(),
            issuer: issuer_url.clone(),
            audience: env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| service_names::JANUA_SERVER.into()),
            access_token_expiry_secs: env_parse(
                "ACCESS_TOKEN_EXPIRY_SECS",
                limits::ACCESS_TOKEN_EXPIRY_SECS,
            )?,
            refresh_token_expiry_days: env_parse(
                "REFRESH_TOKEN_EXPIRY_DAYS",
                limits::REFRESH_TOKEN_EXPIRY_DAYS,
            )?,
        };

        let oauth2_server = OAuth2ServerConfig {
            issuer_url: issuer_url.clone(),
            auth_code_ttl_secs: env_parse("AUTH_CODE_TTL_SECS", limits::AUTH_CODE_TTL_SECS)?,
            default_scope: env::var("OAUTH_DEFAULT_SCOPE").unwrap_or_else(|_| "openid".into()),
        };

        let sso = SsoConfig {
            allowed_metadata_hosts: env::var("SSO_ALLOWED_METADATA_HOSTS")
                .map(|v| {
                    v.split(',')
                        .map(|h| h.trim().to_lowercase())
                        .filter(|h| !h.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            metadata_timeout_secs: env_parse(
                "SSO_METADATA_TIMEOUT_SECS",
                limits::METADATA_FETCH_TIMEOUT_SECS,
            )?,
            callback_base_url: env::var("SSO_CALLBACK_BASE_URL").unwrap_or(issuer_url),
            secret_encryption_key: env::var("SSO_SECRET_ENCRYPTION_KEY").ok(),
        };

        let cache = CacheBackendConfig {
            redis_url: env::var("REDIS_URL").ok(),
            max_entries: env_parse("CACHE_MAX_ENTRIES", cache::DEFAULT_CACHE_MAX_ENTRIES)?,
            cleanup_interval_secs: env_parse(
                "CACHE_CLEANUP_INTERVAL_SECS",
                cache::DEFAULT_CLEANUP_INTERVAL_SECS,
            )?,
        };

        Ok(Self {
            http_port,
            environment,
            database_url,
            auth,
            oauth2_server,
            sso,
            cache,
        })
    }

    /// In-memory configuration for tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            http_port: 0,
            environment: Environment::Testing,
            database_url: DatabaseUrl::Memory,
            auth: AuthConfig {
                jwt_secret: None,
                issuer: "http://localhost:8081".into(),
                audience: service_names::JANUA_SERVER.into(),
                access_token_expiry_secs: limits::ACCESS_TOKEN_EXPIRY_SECS,
                refresh_token_expiry_days: limits::REFRESH_TOKEN_EXPIRY_DAYS,
            },
            oauth2_server: OAuth2ServerConfig {
                issuer_url: "http://localhost:8081".into(),
                auth_code_ttl_secs: limits::AUTH_CODE_TTL_SECS,
                default_scope: "openid".into(),
            },
            sso: SsoConfig {
                allowed_metadata_hosts: vec![
                    "login.microsoftonline.com".into(),
                    "accounts.google.com".into(),
                ],
                metadata_timeout_secs: limits::METADATA_FETCH_TIMEOUT_SECS,
                callback_base_url: "http://localhost:8081".into(),
                secret_encryption_key: None,
            },
            cache: CacheBackendConfig {
                redis_url: None,
                max_entries: cache::DEFAULT_CACHE_MAX_ENTRIES,
                cleanup_interval_secs: cache::DEFAULT_CLEANUP_INTERVAL_SECS,
            },
        }
    }
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("Invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}
