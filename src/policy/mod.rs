// ABOUTME: Generalized policy decision engine over (subject, action, resource, context) tuples
// ABOUTME: Glob resource matching, typed conditions, deny-overrides aggregation, cached decisions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! # Policy Decision Engine
//!
//! Evaluates tenant policy rules against a request tuple. Aggregation is
//! deny-overrides: any matching deny defeats every allow, and a request no
//! policy matches is denied by default. Decisions are cached by a stable
//! hash of the full tuple and invalidated on policy writes.

/// Best-effort compilation of rules to a portable WASM module
pub mod compiler;

use crate::cache::{Cache, CacheKey};
use crate::constants::cache::TTL_POLICY_EVAL_SECS;
use crate::errors::AppResult;
use crate::store::{IdentityStore, Store};
use crate::utils::pattern::matches_pattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Conditions attached to a policy; all supplied fields must hold
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConditions {
    /// Require `context.mfa_verified == true`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_required: Option<bool>,
    /// Require `context.client_ip` to fall in this CIDR range (or equal
    /// this exact address)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_range: Option<String>,
    /// Require exact equality for each attribute against the context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Map<String, Value>>,
}

/// Structured allow/deny sub-rules; deny always wins
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyRules {
    /// Patterns that must all match for the policy to allow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<RulePattern>,
    /// Patterns that, when all matching, deny the request outright
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deny: Option<RulePattern>,
}

/// Subject/action/resource sub-patterns within a rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulePattern {
    /// Subject pattern (glob)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Action pattern (glob)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Resource pattern (glob)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl RulePattern {
    /// True when every declared pattern matches the request
    #[must_use]
    pub fn matches(&self, request: &PolicyRequest) -> bool {
        if let Some(subject) = &self.subject {
            if !matches_pattern(&request.subject, subject) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if !matches_pattern(&request.action, action) {
                return false;
            }
        }
        if let Some(resource) = &self.resource {
            if !matches_pattern(&request.resource, resource) {
                return false;
            }
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.subject.is_none() && self.action.is_none() && self.resource.is_none()
    }
}

/// A versioned tenant policy rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Rule id
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Human-readable name, reported in decisions
    pub name: String,
    /// Actions the rule applies to; `None` applies to all
    pub actions: Option<Vec<String>>,
    /// Resource glob the rule applies to; `None` applies to all
    pub resource_pattern: Option<String>,
    /// Conditions that must hold for the rule to apply
    pub conditions: Option<PolicyConditions>,
    /// Structured allow/deny sub-rules
    pub rules: Option<PolicyRules>,
    /// Optional Rego source for the compiled fast-path
    pub rego_code: Option<String>,
    /// Monotonic version, bumped on every update
    pub version: i64,
    /// Inactive rules are ignored
    pub is_active: bool,
    /// When the rule was created
    pub created_at: DateTime<Utc>,
}

impl PolicyRule {
    /// New always-applicable rule for a tenant
    #[must_use]
    pub fn new(tenant_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            name: name.into(),
            actions: None,
            resource_pattern: None,
            conditions: None,
            rules: None,
            rego_code: None,
            version: 1,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// A request tuple to authorize
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRequest {
    /// Acting subject (user id, `client:{id}`, ...)
    pub subject: String,
    /// Requested action
    pub action: String,
    /// Target resource
    pub resource: String,
    /// Request context (mfa_verified, client_ip, attributes, ...)
    pub context: Option<Value>,
}

/// The engine's answer for a request tuple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Final verdict
    pub allowed: bool,
    /// Names of policies that matched and allowed
    pub matched_policies: Vec<String>,
    /// Name of the policy that denied, when one did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_by: Option<String>,
    /// Human-readable explanation
    pub reason: String,
}

/// Policy decision engine
pub struct PolicyEngine {
    store: Store,
    cache: Arc<Cache>,
}

impl PolicyEngine {
    /// Create an engine over the shared store and cache
    #[must_use]
    pub fn new(store: Store, cache: Arc<Cache>) -> Self {
        Self { store, cache }
    }

    /// Evaluate a request for a tenant
    ///
    /// Cache failures degrade to recomputation; store failures propagate so
    /// callers fail closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the authoritative policy store is unreachable
    pub async fn evaluate(
        &self,
        request: &PolicyRequest,
        tenant_id: Uuid,
    ) -> AppResult<PolicyDecision> {
        let cache_key = CacheKey::policy_eval(&Self::request_hash(request, tenant_id));

        if let Ok(Some(cached)) = self.cache.get::<PolicyDecision>(&cache_key).await {
            tracing::debug!(subject = %request.subject, "Policy decision cache hit");
            return Ok(cached);
        }

        let policies = self.store.list_policy_rules(tenant_id).await?;
        let decision = Self::evaluate_policies(&policies, request);

        if let Err(e) = self
            .cache
            .set(
                &cache_key,
                &decision,
                Duration::from_secs(TTL_POLICY_EVAL_SECS),
            )
            .await
        {
            tracing::warn!("Failed to cache policy decision: {e}");
        }

        tracing::debug!(
            subject = %request.subject,
            action = %request.action,
            resource = %request.resource,
            allowed = decision.allowed,
            "Policy evaluated"
        );

        Ok(decision)
    }

    /// Create a rule and invalidate cached decisions for its tenant
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn create_rule(&self, rule: &PolicyRule) -> AppResult<()> {
        self.store.create_policy_rule(rule).await?;
        self.invalidate_decisions().await
    }

    /// Delete a rule and invalidate cached decisions
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn delete_rule(&self, rule_id: Uuid) -> AppResult<()> {
        self.store.delete_policy_rule(rule_id).await?;
        self.invalidate_decisions().await
    }

    async fn invalidate_decisions(&self) -> AppResult<()> {
        self.cache
            .invalidate_pattern(&CacheKey::policy_eval_pattern())
            .await?;
        Ok(())
    }

    /// Pure aggregation over a policy set: deny overrides, default deny
    #[must_use]
    pub fn evaluate_policies(policies: &[PolicyRule], request: &PolicyRequest) -> PolicyDecision {
        let mut matched = Vec::new();

        for policy in policies.iter().filter(|p| p.is_active) {
            match Self::evaluate_single_policy(policy, request) {
                SinglePolicyOutcome::Allowed => matched.push(policy.name.clone()),
                SinglePolicyOutcome::Denied => {
                    return PolicyDecision {
                        allowed: false,
                        matched_policies: matched,
                        denied_by: Some(policy.name.clone()),
                        reason: format!("Denied by policy '{}'", policy.name),
                    };
                }
                SinglePolicyOutcome::NotApplicable(_) => {}
            }
        }

        if matched.is_empty() {
            PolicyDecision {
                allowed: false,
                matched_policies: matched,
                denied_by: None,
                reason: "No applicable policy matched; default deny".into(),
            }
        } else {
            PolicyDecision {
                allowed: true,
                denied_by: None,
                reason: format!("Allowed by {} matching policy(ies)", matched.len()),
                matched_policies: matched,
            }
        }
    }

    /// Evaluate one policy against a request
    #[must_use]
    pub fn evaluate_single_policy(
        policy: &PolicyRule,
        request: &PolicyRequest,
    ) -> SinglePolicyOutcome {
        if let Some(actions) = &policy.actions {
            if !actions.contains(&request.action) {
                return SinglePolicyOutcome::NotApplicable(format!(
                    "Action '{}' not in policy actions",
                    request.action
                ));
            }
        }

        if let Some(pattern) = &policy.resource_pattern {
            if !matches_pattern(&request.resource, pattern) {
                return SinglePolicyOutcome::NotApplicable(format!(
                    "Resource '{}' doesn't match pattern '{pattern}'",
                    request.resource
                ));
            }
        }

        if let Some(conditions) = &policy.conditions {
            if !Self::evaluate_conditions(conditions, request.context.as_ref()) {
                return SinglePolicyOutcome::NotApplicable("Conditions not met".into());
            }
        }

        if let Some(rules) = &policy.rules {
            // Deny rules are evaluated first and short-circuit the whole
            // request (deny overrides)
            if let Some(deny) = &rules.deny {
                if !deny.is_empty() && deny.matches(request) {
                    return SinglePolicyOutcome::Denied;
                }
            }
            if let Some(allow) = &rules.allow {
                if !allow.is_empty() && !allow.matches(request) {
                    return SinglePolicyOutcome::NotApplicable(
                        "Allow rule patterns did not match".into(),
                    );
                }
            }
        }

        SinglePolicyOutcome::Allowed
    }

    /// Evaluate policy conditions with AND semantics across supplied fields
    #[must_use]
    pub fn evaluate_conditions(conditions: &PolicyConditions, context: Option<&Value>) -> bool {
        let empty = serde_json::Map::new();
        let ctx = context.and_then(Value::as_object).unwrap_or(&empty);

        if conditions.mfa_required == Some(true) {
            let verified = ctx
                .get("mfa_verified")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !verified {
                return false;
            }
        }

        if let Some(attributes) = &conditions.attributes {
            for (key, expected) in attributes {
                if ctx.get(key) != Some(expected) {
                    return false;
                }
            }
        }

        if let Some(range) = &conditions.ip_range {
            let Some(client_ip) = ctx.get("client_ip").and_then(Value::as_str) else {
                return false;
            };
            if !ip_in_range(client_ip, range) {
                return false;
            }
        }

        true
    }

    /// Stable cache key material for a request tuple
    #[must_use]
    pub fn request_hash(request: &PolicyRequest, tenant_id: Uuid) -> String {
        let context = request
            .context
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(request.subject.as_bytes());
        hasher.update(b"|");
        hasher.update(request.action.as_bytes());
        hasher.update(b"|");
        hasher.update(request.resource.as_bytes());
        hasher.update(b"|");
        hasher.update(context.as_bytes());
        hasher.update(b"|");
        hasher.update(tenant_id.to_string().as_bytes());
        hex::encode(&hasher.finalize()[..16])
    }
}

/// Outcome of evaluating one policy in isolation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinglePolicyOutcome {
    /// Policy matched and contributes an allow
    Allowed,
    /// Policy matched a deny rule; the request is denied outright
    Denied,
    /// Policy does not apply to this request (with the reason)
    NotApplicable(String),
}

/// Check whether an IP address is contained in a CIDR range, or equals an
/// exact address when no prefix is given
#[must_use]
pub fn ip_in_range(ip: &str, range: &str) -> bool {
    let Ok(addr) = ip.parse::<IpAddr>() else {
        return false;
    };

    match range.split_once('/') {
        None => range.parse::<IpAddr>().is_ok_and(|r| r == addr),
        Some((base, prefix)) => {
            let (Ok(base), Ok(prefix)) = (base.parse::<IpAddr>(), prefix.parse::<u32>()) else {
                return false;
            };
            match (addr, base) {
                (IpAddr::V4(addr), IpAddr::V4(base)) => {
                    if prefix > 32 {
                        return false;
                    }
                    if prefix == 0 {
                        return true;
                    }
                    let mask = u32::MAX << (32 - prefix);
                    (u32::from(addr) & mask) == (u32::from(base) & mask)
                }
                (IpAddr::V6(addr), IpAddr::V6(base)) => {
                    if prefix > 128 {
                        return false;
                    }
                    if prefix == 0 {
                        return true;
                    }
                    let mask = u128::MAX << (128 - prefix);
                    (u128::from(addr) & mask) == (u128::from(base) & mask)
                }
                _ => false,
            }
        }
    }
}
