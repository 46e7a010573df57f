// ABOUTME: Redis cache implementation with connection manager and async commands
// ABOUTME: GETDEL provides the atomic take primitive shared across server instances
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Janua Identity

use super::{CacheConfig, CacheProvider};
use crate::errors::{AppError, AppResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis-backed cache
///
/// All single-use state (authorization codes, SSO states) must live here in
/// multi-instance deployments so every instance observes the same
/// at-most-once consumption.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    fn map_err(context: &str, e: &redis::RedisError) -> AppError {
        AppError::external_service("redis", format!("{context}: {e}"))
    }
}

#[async_trait::async_trait]
impl CacheProvider for RedisCache {
    async fn new(config: CacheConfig) -> AppResult<Self> {
        let url = config
            .redis_url
            .ok_or_else(|| AppError::config("Redis cache selected but REDIS_URL is not set"))?;

        let client = redis::Client::open(url)
            .map_err(|e| AppError::config(format!("Invalid Redis URL: {e}")))?;

        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| Self::map_err("Failed to connect", &e))?;

        tracing::info!("Redis cache backend connected");
        Ok(Self { manager })
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let serialized = serde_json::to_string(value)?;
        let mut conn = self.manager.clone();
        // SET with TTL; Redis enforces expiry server-side
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, serialized, secs)
            .await
            .map_err(|e| Self::map_err("SET failed", &e))?;
        Ok(())
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> AppResult<Option<T>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| Self::map_err("GET failed", &e))?;

        match raw {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn take<T: for<'de> Deserialize<'de>>(&self, key: &str) -> AppResult<Option<T>> {
        let mut conn = self.manager.clone();
        // GETDEL is atomic on the server: exactly one concurrent caller
        // receives the value
        let raw: Option<String> = conn
            .get_del(key)
            .await
            .map_err(|e| Self::map_err("GETDEL failed", &e))?;

        match raw {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Self::map_err("DEL failed", &e))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| Self::map_err("EXISTS failed", &e))?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        let mut conn = self.manager.clone();
        let ttl: i64 = conn
            .ttl(key)
            .await
            .map_err(|e| Self::map_err("TTL failed", &e))?;

        // -2 key missing, -1 key without expiry
        if ttl < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_secs(u64::try_from(ttl).unwrap_or(0))))
        }
    }

    async fn invalidate_pattern(&self, pattern: &str) -> AppResult<u64> {
        let mut conn = self.manager.clone();

        // SCAN rather than KEYS so the server stays responsive
        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(pattern)
                .await
                .map_err(|e| Self::map_err("SCAN failed", &e))?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let removed = keys.len() as u64;
        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| Self::map_err("DEL failed", &e))?;
        Ok(removed)
    }

    async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Self::map_err("PING failed", &e))?;
        Ok(())
    }

    async fn clear_all(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| Self::map_err("FLUSHDB failed", &e))?;
        Ok(())
    }
}
