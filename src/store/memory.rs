// ABOUTME: In-memory identity store backed by concurrent maps
// ABOUTME: Used for tests and single-process development deployments
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use super::IdentityStore;
use crate::errors::AppResult;
use crate::models::{DeviceProfile, LoginEvent, OAuthClient, SsoSession, User};
use crate::policy::PolicyRule;
use crate::rbac::RbacPolicy;
use crate::risk::AdaptivePolicy;
use crate::sso::provider::SsoProviderConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory identity store
///
/// Every collection is a concurrent map keyed the way the SQLite backend
/// indexes it, so both backends behave identically under the trait.
#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<Uuid, User>,
    oauth_clients: DashMap<String, OAuthClient>,
    org_roles: DashMap<(Uuid, Uuid), String>,
    rbac_policies: DashMap<Uuid, RbacPolicy>,
    policy_rules: DashMap<Uuid, PolicyRule>,
    sso_configs: DashMap<Uuid, SsoProviderConfig>,
    sso_sessions: DashMap<Uuid, SsoSession>,
    device_profiles: DashMap<(Uuid, String), DeviceProfile>,
    ip_blacklist: DashMap<String, ()>,
    login_events: Mutex<Vec<LoginEvent>>,
    adaptive_policies: DashMap<Uuid, AdaptivePolicy>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IdentityStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let needle = email.to_lowercase();
        Ok(self
            .users
            .iter()
            .find(|u| u.email.to_lowercase() == needle)
            .map(|u| u.clone()))
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_oauth_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>> {
        Ok(self.oauth_clients.get(client_id).map(|c| c.clone()))
    }

    async fn create_oauth_client(&self, client: &OAuthClient) -> AppResult<()> {
        self.oauth_clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn touch_oauth_client(&self, client_id: &str, when: DateTime<Utc>) -> AppResult<()> {
        if let Some(mut client) = self.oauth_clients.get_mut(client_id) {
            client.last_used_at = Some(when);
        }
        Ok(())
    }

    async fn get_org_role(&self, user_id: Uuid, org_id: Uuid) -> AppResult<Option<String>> {
        Ok(self.org_roles.get(&(user_id, org_id)).map(|r| r.clone()))
    }

    async fn set_org_role(&self, user_id: Uuid, org_id: Uuid, role: &str) -> AppResult<()> {
        self.org_roles.insert((user_id, org_id), role.to_owned());
        Ok(())
    }

    async fn list_rbac_policies(&self, org_id: Uuid) -> AppResult<Vec<RbacPolicy>> {
        Ok(self
            .rbac_policies
            .iter()
            .filter(|p| p.organization_id == org_id && p.is_active)
            .map(|p| p.clone())
            .collect())
    }

    async fn create_rbac_policy(&self, policy: &RbacPolicy) -> AppResult<()> {
        self.rbac_policies.insert(policy.id, policy.clone());
        Ok(())
    }

    async fn delete_rbac_policy(&self, policy_id: Uuid) -> AppResult<()> {
        self.rbac_policies.remove(&policy_id);
        Ok(())
    }

    async fn list_policy_rules(&self, tenant_id: Uuid) -> AppResult<Vec<PolicyRule>> {
        Ok(self
            .policy_rules
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.is_active)
            .map(|r| r.clone())
            .collect())
    }

    async fn create_policy_rule(&self, rule: &PolicyRule) -> AppResult<()> {
        self.policy_rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn delete_policy_rule(&self, rule_id: Uuid) -> AppResult<()> {
        self.policy_rules.remove(&rule_id);
        Ok(())
    }

    async fn get_sso_config(&self, org_id: Uuid) -> AppResult<Option<SsoProviderConfig>> {
        Ok(self.sso_configs.get(&org_id).map(|c| c.clone()))
    }

    async fn upsert_sso_config(&self, config: &SsoProviderConfig) -> AppResult<()> {
        self.sso_configs
            .insert(config.organization_id, config.clone());
        Ok(())
    }

    async fn create_sso_session(&self, session: &SsoSession) -> AppResult<()> {
        self.sso_sessions.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn get_sso_session(&self, session_id: Uuid) -> AppResult<Option<SsoSession>> {
        Ok(self.sso_sessions.get(&session_id).map(|s| s.clone()))
    }

    async fn delete_sso_session(&self, session_id: Uuid) -> AppResult<()> {
        self.sso_sessions.remove(&session_id);
        Ok(())
    }

    async fn get_device_profile(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> AppResult<Option<DeviceProfile>> {
        Ok(self
            .device_profiles
            .get(&(user_id, fingerprint.to_owned()))
            .map(|p| p.clone()))
    }

    async fn upsert_device_profile(&self, profile: &DeviceProfile) -> AppResult<()> {
        self.device_profiles.insert(
            (profile.user_id, profile.fingerprint.clone()),
            profile.clone(),
        );
        Ok(())
    }

    async fn is_ip_blacklisted(&self, ip: &str) -> AppResult<bool> {
        Ok(self.ip_blacklist.contains_key(ip))
    }

    async fn add_ip_to_blacklist(&self, ip: &str) -> AppResult<()> {
        self.ip_blacklist.insert(ip.to_owned(), ());
        Ok(())
    }

    async fn record_login_event(&self, event: &LoginEvent) -> AppResult<()> {
        if let Ok(mut events) = self.login_events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }

    async fn count_failed_logins_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<i64> {
        let events = self
            .login_events
            .lock()
            .map_err(|_| crate::errors::AppError::internal("login event lock poisoned"))?;
        Ok(events
            .iter()
            .filter(|e| e.user_id == user_id && !e.success && e.created_at >= since)
            .count() as i64)
    }

    async fn list_login_events(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<LoginEvent>> {
        let events = self
            .login_events
            .lock()
            .map_err(|_| crate::errors::AppError::internal("login event lock poisoned"))?;
        let mut matching: Vec<LoginEvent> = events
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(matching)
    }

    async fn list_adaptive_policies(
        &self,
        org_id: Option<Uuid>,
    ) -> AppResult<Vec<AdaptivePolicy>> {
        let mut policies: Vec<AdaptivePolicy> = self
            .adaptive_policies
            .iter()
            .filter(|p| p.is_active && (org_id.is_none() || p.organization_id == org_id))
            .map(|p| p.clone())
            .collect();
        policies.sort_by_key(|p| std::cmp::Reverse(p.priority));
        Ok(policies)
    }

    async fn create_adaptive_policy(&self, policy: &AdaptivePolicy) -> AppResult<()> {
        self.adaptive_policies.insert(policy.id, policy.clone());
        Ok(())
    }
}
