// ABOUTME: Role-based access control engine with hierarchy, static matrix, and dynamic policies
// ABOUTME: Permission decisions are cached per (user, org, permission) and invalidated on mutation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! # RBAC Engine
//!
//! Resolves a caller's organization role, checks it against the static
//! permission matrix, and falls back to dynamic per-organization policies.
//! Unknown roles rank below every known role and grant nothing.

use crate::cache::{Cache, CacheKey};
use crate::constants::access::{ROLE_HIERARCHY, UNKNOWN_ROLE_LEVEL};
use crate::constants::cache::{TTL_PERMISSION_SECS, TTL_ROLE_SECS};
use crate::errors::{AppError, AppResult};
use crate::store::{IdentityStore, Store};
use crate::utils::pattern::matches_pattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Effect of a dynamic policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyEffect {
    /// Grant the permission when conditions hold
    Allow,
    /// Refuse the permission when conditions hold
    Deny,
}

/// A dynamic, admin-managed permission grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacPolicy {
    /// Policy id
    pub id: Uuid,
    /// Organization the policy belongs to
    pub organization_id: Uuid,
    /// Human-readable name
    pub name: String,
    /// Permission pattern granted or denied (same glob semantics as the
    /// static matrix)
    pub permission: String,
    /// Optional resource type restriction
    pub resource_type: Option<String>,
    /// Allow or deny
    pub effect: PolicyEffect,
    /// Conditions that must all hold: `user_id`, `resource_id`,
    /// `time_range` {start, end}, `custom` attribute map
    pub conditions: Option<Value>,
    /// Inactive policies are ignored
    pub is_active: bool,
    /// When the policy was created
    pub created_at: DateTime<Utc>,
}

/// Typed view of policy conditions
#[derive(Debug, Default, Deserialize)]
struct RbacConditions {
    user_id: Option<String>,
    resource_id: Option<String>,
    time_range: Option<TimeRange>,
    custom: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct TimeRange {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

/// Static permission matrix for a role
#[must_use]
pub fn static_permissions(role: &str) -> &'static [&'static str] {
    match role {
        "super_admin" => &["*"],
        "owner" => &["org:*", "users:*", "billing:*", "settings:*"],
        "admin" => &["org:read", "org:update", "users:*", "settings:read"],
        "member" => &["org:read", "users:read", "users:update:self"],
        "viewer" => &["org:read", "users:read:self"],
        _ => &[],
    }
}

/// Numeric level of a role; unknown roles map to -1
#[must_use]
pub fn get_role_level(role: &str) -> i8 {
    ROLE_HIERARCHY
        .iter()
        .find(|(name, _)| *name == role)
        .map_or(UNKNOWN_ROLE_LEVEL, |(_, level)| *level)
}

/// True when `a` outranks or equals `b` in the hierarchy
#[must_use]
pub fn has_higher_role(a: &str, b: &str) -> bool {
    get_role_level(a) >= get_role_level(b)
}

/// Check a role's static matrix against a requested permission
#[must_use]
pub fn check_role_permission(role: &str, permission: &str) -> bool {
    static_permissions(role)
        .iter()
        .any(|pattern| match_permission(pattern, permission))
}

/// Wildcard permission matching: `org:*` grants every `org:`-prefixed
/// action, `*` grants everything, and matches are anchored (no partials)
#[must_use]
pub fn match_permission(pattern: &str, permission: &str) -> bool {
    matches_pattern(permission, pattern)
}

/// RBAC decision engine
pub struct RbacEngine {
    store: Store,
    cache: Arc<Cache>,
}

impl RbacEngine {
    /// Create an engine over the shared store and cache
    #[must_use]
    pub fn new(store: Store, cache: Arc<Cache>) -> Self {
        Self { store, cache }
    }

    /// Resolve a user's effective role within an organization
    ///
    /// Super admins resolve to `super_admin` regardless of membership.
    /// Results (including "no role") are cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable
    pub async fn get_user_role(&self, user_id: Uuid, org_id: Uuid) -> AppResult<Option<String>> {
        let key = CacheKey::user_role(user_id, org_id);

        // Cache failures are a miss, not a denial
        if let Ok(Some(cached)) = self.cache.get::<Option<String>>(&key).await {
            return Ok(cached);
        }

        let role = if let Some(user) = self.store.get_user(user_id).await? {
            if user.is_super_admin {
                Some("super_admin".to_owned())
            } else {
                self.store.get_org_role(user_id, org_id).await?
            }
        } else {
            None
        };

        if let Err(e) = self
            .cache
            .set(&key, &role, Duration::from_secs(TTL_ROLE_SECS))
            .await
        {
            tracing::warn!("Failed to cache role resolution: {e}");
        }

        Ok(role)
    }

    /// Check whether a user holds a permission within an organization
    ///
    /// # Errors
    ///
    /// Returns an error if the authoritative store is unreachable
    /// (callers must treat that as deny)
    pub async fn check_permission(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        permission: &str,
    ) -> AppResult<bool> {
        self.check_permission_with_context(user_id, org_id, permission, None, &Value::Null)
            .await
    }

    /// Permission check with an explicit resource and request context for
    /// dynamic policy conditions
    ///
    /// # Errors
    ///
    /// Returns an error if the authoritative store is unreachable
    pub async fn check_permission_with_context(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        permission: &str,
        resource_id: Option<Uuid>,
        context: &Value,
    ) -> AppResult<bool> {
        let cache_key = CacheKey::permission(user_id, org_id, permission);

        if let Ok(Some(cached)) = self.cache.get::<bool>(&cache_key).await {
            tracing::debug!(%user_id, permission, "Permission cache hit");
            return Ok(cached);
        }

        let allowed = self
            .compute_permission(user_id, org_id, permission, resource_id, context)
            .await?;

        if let Err(e) = self
            .cache
            .set(&cache_key, &allowed, Duration::from_secs(TTL_PERMISSION_SECS))
            .await
        {
            tracing::warn!("Failed to cache permission decision: {e}");
        }

        Ok(allowed)
    }

    async fn compute_permission(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        permission: &str,
        resource_id: Option<Uuid>,
        context: &Value,
    ) -> AppResult<bool> {
        let Some(role) = self.get_user_role(user_id, org_id).await? else {
            return Ok(false);
        };

        // Platform super admins bypass the matrix entirely
        if role == "super_admin" {
            return Ok(true);
        }

        if check_role_permission(&role, permission) {
            return Ok(true);
        }

        // Static matrix said no: consult dynamic grants
        let policies = self.store.list_rbac_policies(org_id).await?;
        for policy in &policies {
            if policy.effect != PolicyEffect::Allow {
                continue;
            }
            if !match_permission(&policy.permission, permission) {
                continue;
            }
            if Self::evaluate_policy(policy, user_id, resource_id, context) {
                tracing::debug!(policy = %policy.name, %user_id, "Dynamic policy granted permission");
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Same check as [`Self::check_permission`], returning a 403-mapped
    /// error on denial
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the permission is not held, or a
    /// store error when the decision cannot be made (fail closed)
    pub async fn enforce_permission(
        &self,
        user_id: Uuid,
        org_id: Uuid,
        permission: &str,
    ) -> AppResult<()> {
        if self.check_permission(user_id, org_id, permission).await? {
            Ok(())
        } else {
            Err(
                AppError::permission_denied(format!("Missing required permission: {permission}"))
                    .with_user_id(user_id),
            )
        }
    }

    /// All permissions a user effectively holds in an organization:
    /// the static matrix plus matching dynamic allow grants
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable
    pub async fn get_user_permissions(
        &self,
        user_id: Uuid,
        org_id: Uuid,
    ) -> AppResult<HashSet<String>> {
        let Some(role) = self.get_user_role(user_id, org_id).await? else {
            return Ok(HashSet::new());
        };

        let mut permissions: HashSet<String> = static_permissions(&role)
            .iter()
            .map(|p| (*p).to_owned())
            .collect();

        for policy in self.store.list_rbac_policies(org_id).await? {
            if policy.effect == PolicyEffect::Allow
                && Self::evaluate_policy(&policy, user_id, None, &Value::Null)
            {
                permissions.insert(policy.permission.clone());
            }
        }

        Ok(permissions)
    }

    /// Invalidate every cached decision for a user after a role or policy
    /// mutation; must run synchronously on the write path
    ///
    /// # Errors
    ///
    /// Returns an error if cache invalidation fails
    pub async fn invalidate_user(&self, user_id: Uuid, org_id: Uuid) -> AppResult<()> {
        self.cache
            .invalidate_pattern(&CacheKey::permission_pattern(user_id))
            .await?;
        self.cache
            .delete(&CacheKey::user_role(user_id, org_id))
            .await?;
        Ok(())
    }

    /// Assign a role and synchronously drop stale cached decisions
    ///
    /// # Errors
    ///
    /// Returns an error if the store write or invalidation fails
    pub async fn set_role(&self, user_id: Uuid, org_id: Uuid, role: &str) -> AppResult<()> {
        self.store.set_org_role(user_id, org_id, role).await?;
        self.invalidate_user(user_id, org_id).await
    }

    /// Evaluate a dynamic policy's conditions; all supplied fields must hold
    #[must_use]
    pub fn evaluate_policy(
        policy: &RbacPolicy,
        user_id: Uuid,
        resource_id: Option<Uuid>,
        context: &Value,
    ) -> bool {
        let Some(raw) = &policy.conditions else {
            return true;
        };

        let Ok(conditions) = serde_json::from_value::<RbacConditions>(raw.clone()) else {
            tracing::warn!(policy = %policy.name, "Unparseable policy conditions, treating as not met");
            return false;
        };

        if let Some(expected) = &conditions.user_id {
            if expected != &user_id.to_string() {
                return false;
            }
        }

        if let Some(expected) = &conditions.resource_id {
            match resource_id {
                Some(actual) if &actual.to_string() == expected => {}
                _ => return false,
            }
        }

        if let Some(range) = &conditions.time_range {
            if !Self::check_time_range(range) {
                return false;
            }
        }

        if let Some(custom) = &conditions.custom {
            let empty = serde_json::Map::new();
            let ctx = context.as_object().unwrap_or(&empty);
            for (key, expected) in custom {
                if ctx.get(key) != Some(expected) {
                    return false;
                }
            }
        }

        true
    }

    fn check_time_range(range: &TimeRange) -> bool {
        let now = Utc::now();
        if let Some(start) = range.start {
            if now < start {
                return false;
            }
        }
        if let Some(end) = range.end {
            if now > end {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_levels() {
        assert_eq!(get_role_level("super_admin"), 4);
        assert_eq!(get_role_level("owner"), 3);
        assert_eq!(get_role_level("admin"), 2);
        assert_eq!(get_role_level("member"), 1);
        assert_eq!(get_role_level("viewer"), 0);
        assert_eq!(get_role_level("unknown_role"), -1);
        assert_eq!(get_role_level(""), -1);
    }

    #[test]
    fn test_role_comparison() {
        assert!(has_higher_role("super_admin", "owner"));
        assert!(has_higher_role("owner", "admin"));
        assert!(has_higher_role("admin", "admin"));
        assert!(!has_higher_role("viewer", "member"));
        assert!(!has_higher_role("unknown", "viewer"));
    }

    #[test]
    fn test_static_matrix() {
        assert!(check_role_permission("super_admin", "any:permission"));
        assert!(check_role_permission("owner", "org:delete"));
        assert!(check_role_permission("member", "org:read"));
        assert!(!check_role_permission("member", "org:delete"));
        assert!(!check_role_permission("unknown", "org:read"));
        assert_eq!(static_permissions("viewer").len(), 2);
    }

    #[test]
    fn test_match_permission() {
        assert!(match_permission("org:*", "org:read"));
        assert!(match_permission("*", "users:delete:all"));
        assert!(match_permission("users:read:*", "users:read:self"));
        assert!(!match_permission("users:read:*", "users:write:self"));
        assert!(!match_permission("org:read", "org:read:extended"));
        assert!(!match_permission("org", "organization"));
    }
}
