// ABOUTME: Cache abstraction layer for security decision caching and single-use token state
// ABOUTME: Pluggable backend support (in-memory, Redis) behind one async trait
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! Shared cache used for authorization codes, token blacklists, and
//! decision caching.
//!
//! Cached permission/policy/token-validation results are advisory
//! acceleration only; write paths invalidate them synchronously. The
//! authorization-code store additionally relies on [`CacheProvider::take`]
//! being atomic: at most one concurrent caller observes a given key.

/// Cache factory for creating cache providers
pub mod factory;
/// In-memory cache implementation
pub mod memory;
/// Redis cache implementation
pub mod redis;

use crate::constants::cache as cache_constants;
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub use factory::Cache;

/// Cache provider trait for pluggable backend implementations
#[async_trait::async_trait]
pub trait CacheProvider: Send + Sync + Clone {
    /// Create new cache instance with configuration
    ///
    /// # Errors
    ///
    /// Returns an error if cache initialization fails
    async fn new(config: CacheConfig) -> AppResult<Self>
    where
        Self: Sized;

    /// Store value in cache with TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()>;

    /// Retrieve value from cache
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails
    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> AppResult<Option<T>>;

    /// Atomically retrieve and remove a value
    ///
    /// At most one of any number of concurrent callers receives the value;
    /// the rest observe `None`. This is the primitive behind single-use
    /// authorization codes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation or deserialization fails
    async fn take<T: for<'de> Deserialize<'de>>(&self, key: &str) -> AppResult<Option<T>>;

    /// Remove single cache entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// Check if key exists in cache
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check fails
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// Get remaining TTL for key
    ///
    /// # Errors
    ///
    /// Returns an error if the TTL check fails
    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>>;

    /// Remove all cache entries matching pattern (e.g. `perms:42:*`)
    ///
    /// # Errors
    ///
    /// Returns an error if pattern invalidation fails
    async fn invalidate_pattern(&self, pattern: &str) -> AppResult<u64>;

    /// Verify cache backend is healthy
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails
    async fn health_check(&self) -> AppResult<()>;

    /// Clear all cache entries (for testing/admin)
    ///
    /// # Errors
    ///
    /// Returns an error if the clear operation fails
    async fn clear_all(&self) -> AppResult<()>;
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries (for in-memory cache)
    pub max_entries: usize,
    /// Redis connection URL (for Redis cache)
    pub redis_url: Option<String>,
    /// Cleanup interval for expired entries
    pub cleanup_interval: Duration,
    /// Enable background cleanup task (false in tests to avoid runtime conflicts)
    pub enable_background_cleanup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: cache_constants::DEFAULT_CACHE_MAX_ENTRIES,
            redis_url: None,
            cleanup_interval: Duration::from_secs(cache_constants::DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_background_cleanup: true,
        }
    }
}

/// Namespaced cache key builders
///
/// Every key the platform stores goes through one of these constructors so
/// the namespaces stay greppable and pattern invalidation stays correct.
pub struct CacheKey;

impl CacheKey {
    /// Single-use authorization code: `oauth:code:{code}`
    #[must_use]
    pub fn auth_code(code: &str) -> String {
        format!("{}:{code}", cache_constants::PREFIX_AUTH_CODE)
    }

    /// Token validation result keyed by token hash: `token:validation:{hash}`
    #[must_use]
    pub fn token_validation(token_hash: &str) -> String {
        format!("{}:{token_hash}", cache_constants::PREFIX_TOKEN_VALIDATION)
    }

    /// Revoked token id: `token:blacklist:{jti}`
    #[must_use]
    pub fn token_blacklist(jti: &str) -> String {
        format!("{}:{jti}", cache_constants::PREFIX_TOKEN_BLACKLIST)
    }

    /// Policy decision: `policy:eval:{hash}`
    #[must_use]
    pub fn policy_eval(request_hash: &str) -> String {
        format!("{}:{request_hash}", cache_constants::PREFIX_POLICY_EVAL)
    }

    /// Pattern matching every cached policy decision for a tenant
    #[must_use]
    pub fn policy_eval_pattern() -> String {
        format!("{}:*", cache_constants::PREFIX_POLICY_EVAL)
    }

    /// Permission decision: `perms:{user}:{org}:{permission}`
    #[must_use]
    pub fn permission(user_id: Uuid, org_id: Uuid, permission: &str) -> String {
        format!(
            "{}:{user_id}:{org_id}:{permission}",
            cache_constants::PREFIX_PERMISSION
        )
    }

    /// Pattern matching every cached permission for a user
    #[must_use]
    pub fn permission_pattern(user_id: Uuid) -> String {
        format!("{}:{user_id}:*", cache_constants::PREFIX_PERMISSION)
    }

    /// Resolved organization role: `rbac:role:{user}:{org}`
    #[must_use]
    pub fn user_role(user_id: Uuid, org_id: Uuid) -> String {
        format!("{}:{user_id}:{org_id}", cache_constants::PREFIX_ROLE)
    }

    /// Pending SSO state: `sso:state:{state}`
    #[must_use]
    pub fn sso_state(state: &str) -> String {
        format!("{}:{state}", cache_constants::PREFIX_SSO_STATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_namespaces() {
        assert_eq!(CacheKey::auth_code("abc"), "oauth:code:abc");
        assert_eq!(CacheKey::token_blacklist("j1"), "token:blacklist:j1");
        assert!(CacheKey::permission(Uuid::nil(), Uuid::nil(), "org:read").starts_with("perms:"));
        assert!(CacheKey::permission_pattern(Uuid::nil()).ends_with(":*"));
    }
}
