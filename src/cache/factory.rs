// ABOUTME: Cache factory selecting the backend from configuration
// ABOUTME: Enum dispatch over in-memory and Redis providers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use super::{memory::InMemoryCache, redis::RedisCache, CacheConfig, CacheProvider};
use crate::errors::AppResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache backend selected at startup
#[derive(Clone)]
pub enum Cache {
    /// Single-process in-memory backend
    Memory(InMemoryCache),
    /// Shared Redis backend
    Redis(RedisCache),
}

impl Cache {
    /// Create the backend described by `config`: Redis when a URL is
    /// configured, in-memory otherwise
    ///
    /// # Errors
    ///
    /// Returns an error if backend initialization fails
    pub async fn from_config(config: CacheConfig) -> AppResult<Self> {
        if config.redis_url.is_some() {
            Ok(Self::Redis(RedisCache::new(config).await?))
        } else {
            Ok(Self::Memory(InMemoryCache::new(config).await?))
        }
    }

    /// Store value with TTL
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or storage fails
    pub async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        match self {
            Self::Memory(cache) => cache.set(key, value, ttl).await,
            Self::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    /// Retrieve value
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> AppResult<Option<T>> {
        match self {
            Self::Memory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    /// Atomically retrieve and remove a value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails
    pub async fn take<T: for<'de> Deserialize<'de>>(&self, key: &str) -> AppResult<Option<T>> {
        match self {
            Self::Memory(cache) => cache.take(key).await,
            Self::Redis(cache) => cache.take(key).await,
        }
    }

    /// Remove single entry
    ///
    /// # Errors
    ///
    /// Returns an error if invalidation fails
    pub async fn delete(&self, key: &str) -> AppResult<()> {
        match self {
            Self::Memory(cache) => cache.delete(key).await,
            Self::Redis(cache) => cache.delete(key).await,
        }
    }

    /// Check if key exists
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check fails
    pub async fn exists(&self, key: &str) -> AppResult<bool> {
        match self {
            Self::Memory(cache) => cache.exists(key).await,
            Self::Redis(cache) => cache.exists(key).await,
        }
    }

    /// Get remaining TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the TTL check fails
    pub async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        match self {
            Self::Memory(cache) => cache.ttl(key).await,
            Self::Redis(cache) => cache.ttl(key).await,
        }
    }

    /// Remove entries matching a glob pattern
    ///
    /// # Errors
    ///
    /// Returns an error if pattern invalidation fails
    pub async fn invalidate_pattern(&self, pattern: &str) -> AppResult<u64> {
        match self {
            Self::Memory(cache) => cache.invalidate_pattern(pattern).await,
            Self::Redis(cache) => cache.invalidate_pattern(pattern).await,
        }
    }

    /// Verify the backend is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the health check fails
    pub async fn health_check(&self) -> AppResult<()> {
        match self {
            Self::Memory(cache) => cache.health_check().await,
            Self::Redis(cache) => cache.health_check().await,
        }
    }

    /// Clear all entries
    ///
    /// # Errors
    ///
    /// Returns an error if the clear operation fails
    pub async fn clear_all(&self) -> AppResult<()> {
        match self {
            Self::Memory(cache) => cache.clear_all().await,
            Self::Redis(cache) => cache.clear_all().await,
        }
    }
}
