// ABOUTME: Identity store abstraction with pluggable backends
// ABOUTME: Defines the persistence boundary the decision core consumes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! # Identity Store
//!
//! The persistence boundary for principals, OAuth clients, SSO
//! configuration, and the rule stores the decision engines read. Schema
//! management beyond bootstrap DDL is out of scope; the trait is the
//! contract.
//!
//! Decision paths treat store errors as fail-closed (deny); caches treat
//! them as a miss and recompute.

/// In-memory store implementation
pub mod memory;
/// SQLite store implementation
pub mod sqlite;

use crate::config::environment::DatabaseUrl;
use crate::errors::AppResult;
use crate::models::{DeviceProfile, LoginEvent, OAuthClient, SsoSession, User};
use crate::policy::PolicyRule;
use crate::rbac::RbacPolicy;
use crate::risk::AdaptivePolicy;
use crate::sso::provider::SsoProviderConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence operations consumed by the decision core
#[async_trait::async_trait]
pub trait IdentityStore: Send + Sync {
    // ── Principals ──────────────────────────────────────────────────────

    /// Fetch a user by id
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;

    /// Fetch a user by email (case-insensitive)
    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Insert a new user
    async fn create_user(&self, user: &User) -> AppResult<()>;

    /// Update an existing user
    async fn update_user(&self, user: &User) -> AppResult<()>;

    // ── OAuth clients ───────────────────────────────────────────────────

    /// Fetch a registered OAuth client
    async fn get_oauth_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>>;

    /// Register an OAuth client
    async fn create_oauth_client(&self, client: &OAuthClient) -> AppResult<()>;

    /// Record a successful authorize/token exchange for a client
    async fn touch_oauth_client(&self, client_id: &str, when: DateTime<Utc>) -> AppResult<()>;

    // ── Organization membership ─────────────────────────────────────────

    /// Resolve a user's role within an organization
    async fn get_org_role(&self, user_id: Uuid, org_id: Uuid) -> AppResult<Option<String>>;

    /// Assign a user's role within an organization
    async fn set_org_role(&self, user_id: Uuid, org_id: Uuid, role: &str) -> AppResult<()>;

    // ── RBAC dynamic policies ───────────────────────────────────────────

    /// List active dynamic policies for an organization
    async fn list_rbac_policies(&self, org_id: Uuid) -> AppResult<Vec<RbacPolicy>>;

    /// Create a dynamic policy
    async fn create_rbac_policy(&self, policy: &RbacPolicy) -> AppResult<()>;

    /// Delete a dynamic policy
    async fn delete_rbac_policy(&self, policy_id: Uuid) -> AppResult<()>;

    // ── Policy rules ────────────────────────────────────────────────────

    /// List active policy rules for a tenant
    async fn list_policy_rules(&self, tenant_id: Uuid) -> AppResult<Vec<PolicyRule>>;

    /// Create a policy rule
    async fn create_policy_rule(&self, rule: &PolicyRule) -> AppResult<()>;

    /// Delete a policy rule
    async fn delete_policy_rule(&self, rule_id: Uuid) -> AppResult<()>;

    // ── SSO ─────────────────────────────────────────────────────────────

    /// Fetch the SSO provider configuration for an organization
    async fn get_sso_config(&self, org_id: Uuid) -> AppResult<Option<SsoProviderConfig>>;

    /// Create or replace the SSO provider configuration for an organization
    async fn upsert_sso_config(&self, config: &SsoProviderConfig) -> AppResult<()>;

    /// Record a federated session
    async fn create_sso_session(&self, session: &SsoSession) -> AppResult<()>;

    /// Fetch a federated session
    async fn get_sso_session(&self, session_id: Uuid) -> AppResult<Option<SsoSession>>;

    /// End a federated session
    async fn delete_sso_session(&self, session_id: Uuid) -> AppResult<()>;

    // ── Risk signals ────────────────────────────────────────────────────

    /// Fetch a stored device trust profile
    async fn get_device_profile(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> AppResult<Option<DeviceProfile>>;

    /// Create or update a device trust profile
    async fn upsert_device_profile(&self, profile: &DeviceProfile) -> AppResult<()>;

    /// Check whether an IP is on the blacklist
    async fn is_ip_blacklisted(&self, ip: &str) -> AppResult<bool>;

    /// Add an IP to the blacklist
    async fn add_ip_to_blacklist(&self, ip: &str) -> AppResult<()>;

    /// Record a login attempt
    async fn record_login_event(&self, event: &LoginEvent) -> AppResult<()>;

    /// Count failed login attempts for a user since a point in time
    async fn count_failed_logins_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<i64>;

    /// Most recent login events for a user, newest first
    async fn list_login_events(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<LoginEvent>>;

    /// List active adaptive access policies, optionally scoped to an org
    async fn list_adaptive_policies(&self, org_id: Option<Uuid>)
        -> AppResult<Vec<AdaptivePolicy>>;

    /// Create an adaptive access policy
    async fn create_adaptive_policy(&self, policy: &AdaptivePolicy) -> AppResult<()>;
}

/// Shared handle to the configured store backend
pub type Store = Arc<dyn IdentityStore>;

/// Create the store backend described by the configured database URL
///
/// # Errors
///
/// Returns an error if the backend fails to initialize
pub async fn from_config(database_url: &DatabaseUrl) -> AppResult<Store> {
    match database_url {
        DatabaseUrl::Memory => {
            tracing::info!("Using in-memory identity store");
            Ok(Arc::new(MemoryStore::new()))
        }
        DatabaseUrl::SQLite { .. } => {
            let store = SqliteStore::connect(&database_url.to_connection_string()).await?;
            tracing::info!("Using SQLite identity store");
            Ok(Arc::new(store))
        }
    }
}
