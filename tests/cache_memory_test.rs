// ABOUTME: Tests for the in-memory cache backend
// ABOUTME: TTL expiry, atomic take semantics, and glob pattern invalidation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use janua_server::cache::memory::InMemoryCache;
use janua_server::cache::{CacheConfig, CacheProvider};
use std::sync::Arc;
use std::time::Duration;

async fn test_cache() -> InMemoryCache {
    common::init_test_logging();
    InMemoryCache::new(CacheConfig {
        enable_background_cleanup: false,
        ..CacheConfig::default()
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_set_get_roundtrip() {
    let cache = test_cache().await;

    cache
        .set("k:1", &"hello", Duration::from_secs(60))
        .await
        .unwrap();

    let value: Option<String> = cache.get("k:1").await.unwrap();
    assert_eq!(value.as_deref(), Some("hello"));

    let missing: Option<String> = cache.get("k:2").await.unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_entries_expire() {
    let cache = test_cache().await;

    cache
        .set("k:expiring", &42_u32, Duration::from_millis(50))
        .await
        .unwrap();
    assert!(cache.exists("k:expiring").await.unwrap());

    tokio::time::sleep(Duration::from_millis(80)).await;

    let value: Option<u32> = cache.get("k:expiring").await.unwrap();
    assert!(value.is_none());
    assert!(!cache.exists("k:expiring").await.unwrap());
}

#[tokio::test]
async fn test_ttl_reports_remaining() {
    let cache = test_cache().await;

    cache
        .set("k:ttl", &1_u8, Duration::from_secs(60))
        .await
        .unwrap();

    let remaining = cache.ttl("k:ttl").await.unwrap().unwrap();
    assert!(remaining <= Duration::from_secs(60));
    assert!(remaining > Duration::from_secs(55));

    assert!(cache.ttl("k:absent").await.unwrap().is_none());
}

#[tokio::test]
async fn test_take_is_single_use() {
    let cache = test_cache().await;

    cache
        .set("oauth:code:abc", &"payload", Duration::from_secs(60))
        .await
        .unwrap();

    let first: Option<String> = cache.take("oauth:code:abc").await.unwrap();
    assert_eq!(first.as_deref(), Some("payload"));

    let second: Option<String> = cache.take("oauth:code:abc").await.unwrap();
    assert!(second.is_none());
}

#[tokio::test]
async fn test_take_under_concurrency() {
    let cache = Arc::new(test_cache().await);

    cache
        .set("oauth:code:race", &"payload", Duration::from_secs(60))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.take::<String>("oauth:code:race").await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1, "take must hand the value to exactly one caller");
}

#[tokio::test]
async fn test_expired_entry_not_taken() {
    let cache = test_cache().await;

    cache
        .set("k:stale", &"payload", Duration::from_millis(30))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let taken: Option<String> = cache.take("k:stale").await.unwrap();
    assert!(taken.is_none());
}

#[tokio::test]
async fn test_pattern_invalidation() {
    let cache = test_cache().await;
    let ttl = Duration::from_secs(60);

    cache.set("perms:u1:o1:org:read", &true, ttl).await.unwrap();
    cache.set("perms:u1:o1:org:delete", &false, ttl).await.unwrap();
    cache.set("perms:u2:o1:org:read", &true, ttl).await.unwrap();

    let removed = cache.invalidate_pattern("perms:u1:*").await.unwrap();
    assert_eq!(removed, 2);

    assert!(!cache.exists("perms:u1:o1:org:read").await.unwrap());
    assert!(cache.exists("perms:u2:o1:org:read").await.unwrap());
}

#[tokio::test]
async fn test_delete_and_clear() {
    let cache = test_cache().await;
    let ttl = Duration::from_secs(60);

    cache.set("k:a", &1_u8, ttl).await.unwrap();
    cache.set("k:b", &2_u8, ttl).await.unwrap();

    cache.delete("k:a").await.unwrap();
    assert!(!cache.exists("k:a").await.unwrap());
    assert!(cache.exists("k:b").await.unwrap());

    cache.clear_all().await.unwrap();
    assert!(!cache.exists("k:b").await.unwrap());
}
