// ABOUTME: Risk assessment engine scoring request context into adaptive access decisions
// ABOUTME: Additive sub-scores for location, device, network, and behavior with fixed level thresholds
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! # Risk Assessment Engine
//!
//! Scores a request's context into a composite risk score in `[0,1]`,
//! buckets it into a [`RiskLevel`], flags discrete anomalies, and evaluates
//! adaptive access policies that may demand MFA step-up or deny outright
//! even when RBAC and policy checks pass.
//!
//! Behavioral scoring delegates to a pluggable [`AnomalyDetector`]; absent
//! a detector it contributes nothing. IP intelligence is likewise a
//! boundary trait with conservative defaults.

use crate::constants::access::{
    RISK_CRITICAL_THRESHOLD, RISK_HIGH_THRESHOLD, RISK_MEDIUM_THRESHOLD,
};
use crate::errors::AppResult;
use crate::store::{IdentityStore, Store};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Discretized risk bucket driving adaptive access decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Score below 0.25
    Low,
    /// Score in [0.25, 0.5)
    Medium,
    /// Score in [0.5, 0.75)
    High,
    /// Score at or above 0.75
    Critical,
}

impl RiskLevel {
    /// Bucket a composite score using the fixed thresholds
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < RISK_MEDIUM_THRESHOLD {
            Self::Low
        } else if score < RISK_HIGH_THRESHOLD {
            Self::Medium
        } else if score < RISK_CRITICAL_THRESHOLD {
            Self::High
        } else {
            Self::Critical
        }
    }

    /// String form used in adaptive policy condition contexts
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Action an adaptive policy requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    /// Explicitly allow
    Allow,
    /// Demand MFA step-up before proceeding
    RequireMfa,
    /// Deny regardless of RBAC/policy outcome
    Deny,
}

/// An adaptive access policy evaluated against the risk context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptivePolicy {
    /// Policy id
    pub id: Uuid,
    /// Owning organization; `None` applies platform-wide
    pub organization_id: Option<Uuid>,
    /// Human-readable name
    pub name: String,
    /// Restrict to these user ids; `None` or empty applies to everyone
    pub applies_to_users: Option<Vec<String>>,
    /// Restrict to resources with these prefixes; `None` applies everywhere
    pub applies_to_resources: Option<Vec<String>>,
    /// Condition tree over the risk context: AND/OR arrays with
    /// `in`/`not_in`/`eq` leaf operators or direct value equality
    pub conditions: Value,
    /// Action taken when the conditions match
    pub action: AccessAction,
    /// Higher priority policies are evaluated first
    pub priority: i32,
    /// Inactive policies are ignored
    pub is_active: bool,
}

/// Per-request signal bundle collected for scoring and audit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskFactors {
    /// Source IP, when known
    pub ip_address: Option<String>,
    /// IP is a known VPN exit
    pub is_vpn: bool,
    /// IP is a known Tor exit
    pub is_tor: bool,
    /// IP is a known open proxy
    pub is_proxy: bool,
    /// IP belongs to a datacenter range
    pub is_datacenter: bool,
    /// Device fingerprint, when supplied
    pub device_fingerprint: Option<String>,
    /// Device has never been seen for this user
    pub is_new_device: bool,
    /// Failed login attempts in the last 24 hours
    pub recent_failed_attempts: i64,
    /// Account age in days
    pub account_age_days: i64,
}

/// The engine's verdict for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Composite score in [0,1]
    pub score: f64,
    /// Discretized level
    pub level: RiskLevel,
    /// Signals the score was computed from
    pub factors: RiskFactors,
    /// Discrete anomaly findings, each independently appended
    pub anomalies: Vec<String>,
    /// Actions demanded by matching adaptive policies
    pub required_actions: Vec<AccessAction>,
}

/// Context describing the request being scored
#[derive(Debug, Clone, Default)]
pub struct RiskContext {
    /// Authenticated (or claimed) user
    pub user_id: Option<Uuid>,
    /// Organization scope for adaptive policies
    pub organization_id: Option<Uuid>,
    /// Source IP
    pub ip_address: Option<String>,
    /// User agent string
    pub user_agent: Option<String>,
    /// Client-supplied device fingerprint
    pub device_fingerprint: Option<String>,
    /// Resource being accessed, matched against policy scoping
    pub resource: Option<String>,
}

/// Pluggable behavioral anomaly detector
///
/// The platform specifies the scoring contract, not a model: any detector
/// returning a score in `[0,1]` can plug in. Inference must stay off the
/// request path or bound its own latency.
#[async_trait::async_trait]
pub trait AnomalyDetector: Send + Sync {
    /// Score the factors bundle; `None` means the detector abstains
    async fn score(&self, factors: &RiskFactors) -> Option<f64>;
}

/// Pluggable IP intelligence boundary
#[async_trait::async_trait]
pub trait IpIntelligence: Send + Sync {
    /// IP is a known VPN exit
    async fn is_vpn(&self, ip: &str) -> bool;
    /// IP is a known Tor exit
    async fn is_tor(&self, ip: &str) -> bool;
    /// IP is a known open proxy
    async fn is_proxy(&self, ip: &str) -> bool;
    /// IP belongs to a datacenter range
    async fn is_datacenter(&self, ip: &str) -> bool;
    /// Reputation in [0,1]; higher is better
    async fn reputation(&self, ip: &str) -> f64;
}

/// Conservative default intelligence: nothing is flagged, reputation is
/// neutral-good
pub struct DefaultIpIntelligence;

#[async_trait::async_trait]
impl IpIntelligence for DefaultIpIntelligence {
    async fn is_vpn(&self, _ip: &str) -> bool {
        false
    }
    async fn is_tor(&self, _ip: &str) -> bool {
        false
    }
    async fn is_proxy(&self, _ip: &str) -> bool {
        false
    }
    async fn is_datacenter(&self, _ip: &str) -> bool {
        false
    }
    async fn reputation(&self, _ip: &str) -> f64 {
        0.7
    }
}

/// Risk assessment service
pub struct RiskAssessmentService {
    store: Store,
    ip_intel: Arc<dyn IpIntelligence>,
    detector: Option<Arc<dyn AnomalyDetector>>,
}

impl RiskAssessmentService {
    /// Create a service with default IP intelligence and no detector
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self {
            store,
            ip_intel: Arc::new(DefaultIpIntelligence),
            detector: None,
        }
    }

    /// Plug in an IP intelligence provider
    #[must_use]
    pub fn with_ip_intelligence(mut self, intel: Arc<dyn IpIntelligence>) -> Self {
        self.ip_intel = intel;
        self
    }

    /// Plug in a behavioral anomaly detector
    #[must_use]
    pub fn with_detector(mut self, detector: Arc<dyn AnomalyDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Assess a request's risk and evaluate adaptive policies
    ///
    /// # Errors
    ///
    /// Returns an error only when the adaptive policy store is unreachable;
    /// individual signal lookups degrade to their conservative defaults
    pub async fn assess_risk(&self, context: &RiskContext) -> AppResult<RiskAssessment> {
        let factors = self.collect_risk_factors(context).await;

        let location = self.assess_location_risk(context, &factors).await;
        let device = self.assess_device_risk(context).await;
        let network = self.assess_network_risk(context, &factors).await;
        let behavior = self.assess_behavior_risk(&factors).await;

        let score = ((location + device + network + behavior) / 4.0).clamp(0.0, 1.0);
        let level = RiskLevel::from_score(score);

        let anomalies = self.detect_anomalies(context).await;

        let required_actions = self
            .evaluate_access_policies(context, score, level, &anomalies)
            .await?;

        tracing::debug!(
            score,
            level = level.as_str(),
            location,
            device,
            network,
            behavior,
            "Risk assessed"
        );

        Ok(RiskAssessment {
            score,
            level,
            factors,
            anomalies,
            required_actions,
        })
    }

    /// Location sub-score: 0.5 with no IP; otherwise additive penalties for
    /// suspicious IPs, new locations, and impossible travel, capped at 1.0
    pub async fn assess_location_risk(&self, context: &RiskContext, factors: &RiskFactors) -> f64 {
        let Some(ip) = context.ip_address.as_deref() else {
            return 0.5;
        };

        let mut risk: f64 = 0.0;

        if factors.is_vpn || factors.is_tor || factors.is_proxy {
            risk += 0.3;
        }

        if let Some(user_id) = context.user_id {
            if self.is_new_location(user_id, ip).await {
                risk += 0.2;
            }
            if self.check_impossible_travel(user_id, ip).await {
                risk += 0.4;
            }
        }

        risk.min(1.0)
    }

    /// Device sub-score: 0.6 with no fingerprint, 0.5 for a first-seen
    /// device, otherwise derived from the stored trust profile
    pub async fn assess_device_risk(&self, context: &RiskContext) -> f64 {
        let Some(fingerprint) = context.device_fingerprint.as_deref() else {
            return 0.6;
        };
        let Some(user_id) = context.user_id else {
            return 0.5;
        };

        match self.store.get_device_profile(user_id, fingerprint).await {
            Ok(Some(profile)) => profile.risk(),
            Ok(None) => 0.5,
            Err(e) => {
                tracing::warn!("Device profile lookup failed, using default risk: {e}");
                0.5
            }
        }
    }

    /// Network sub-score: blacklist, reputation, and datacenter penalties
    pub async fn assess_network_risk(&self, context: &RiskContext, factors: &RiskFactors) -> f64 {
        let Some(ip) = context.ip_address.as_deref() else {
            return 0.0;
        };

        let mut risk: f64 = 0.0;

        match self.store.is_ip_blacklisted(ip).await {
            Ok(true) => risk += 0.5,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("IP blacklist lookup failed: {e}");
            }
        }

        let reputation = self.ip_intel.reputation(ip).await;
        if reputation < 0.3 {
            risk += 0.3;
        } else if reputation < 0.6 {
            risk += 0.1;
        }

        if factors.is_datacenter {
            risk += 0.2;
        }

        risk.min(1.0)
    }

    /// Behavior sub-score: failed-attempt pressure plus the pluggable
    /// detector's contribution; 0.0 absent both signals
    pub async fn assess_behavior_risk(&self, factors: &RiskFactors) -> f64 {
        let mut risk: f64 = 0.0;

        if factors.recent_failed_attempts >= 5 {
            risk += 0.4;
        } else if factors.recent_failed_attempts >= 3 {
            risk += 0.2;
        }

        if let Some(detector) = &self.detector {
            if let Some(score) = detector.score(factors).await {
                risk += score.clamp(0.0, 1.0);
            }
        }

        risk.min(1.0)
    }

    /// Collect the signal bundle; lookups that fail degrade to defaults
    pub async fn collect_risk_factors(&self, context: &RiskContext) -> RiskFactors {
        let mut factors = RiskFactors {
            ip_address: context.ip_address.clone(),
            device_fingerprint: context.device_fingerprint.clone(),
            ..RiskFactors::default()
        };

        if let Some(ip) = context.ip_address.as_deref() {
            factors.is_vpn = self.ip_intel.is_vpn(ip).await;
            factors.is_tor = self.ip_intel.is_tor(ip).await;
            factors.is_proxy = self.ip_intel.is_proxy(ip).await;
            factors.is_datacenter = self.ip_intel.is_datacenter(ip).await;
        }

        if let Some(user_id) = context.user_id {
            if let Some(fingerprint) = context.device_fingerprint.as_deref() {
                factors.is_new_device = matches!(
                    self.store.get_device_profile(user_id, fingerprint).await,
                    Ok(None)
                );
            }

            let day_ago = Utc::now() - Duration::hours(24);
            factors.recent_failed_attempts = self
                .store
                .count_failed_logins_since(user_id, day_ago)
                .await
                .unwrap_or(0);

            factors.account_age_days = match self.store.get_user(user_id).await {
                Ok(Some(user)) => (Utc::now() - user.created_at).num_days(),
                _ => 0,
            };
        } else if context.device_fingerprint.is_some() {
            // Unknown user on any device is a new device by definition
            factors.is_new_device = true;
        }

        factors
    }

    /// Flag discrete anomaly signals, each independently appended
    pub async fn detect_anomalies(&self, context: &RiskContext) -> Vec<String> {
        let Some(user_id) = context.user_id else {
            return Vec::new();
        };

        let mut findings = Vec::new();

        if self.is_unusual_login_time(user_id).await {
            findings.push("unusual_login_time".to_owned());
        }

        if let Some(ip) = context.ip_address.as_deref() {
            if self.is_unusual_location(user_id, ip).await {
                findings.push("unusual_location".to_owned());
            }
        }

        if self.has_concurrent_sessions_different_locations(user_id).await {
            findings.push("concurrent_sessions_different_locations".to_owned());
        }

        findings
    }

    /// Evaluate adaptive policies against the risk context
    ///
    /// # Errors
    ///
    /// Returns an error if the policy store is unreachable
    pub async fn evaluate_access_policies(
        &self,
        context: &RiskContext,
        score: f64,
        level: RiskLevel,
        anomalies: &[String],
    ) -> AppResult<Vec<AccessAction>> {
        let policies = self
            .store
            .list_adaptive_policies(context.organization_id)
            .await?;

        let mut policy_context = serde_json::Map::new();
        policy_context.insert("risk_level".into(), Value::String(level.as_str().into()));
        if let Some(number) = serde_json::Number::from_f64(score) {
            policy_context.insert("risk_score".into(), Value::Number(number));
        }
        if let Some(user_id) = context.user_id {
            policy_context.insert("user_id".into(), Value::String(user_id.to_string()));
        }
        if let Some(ip) = &context.ip_address {
            policy_context.insert("ip_address".into(), Value::String(ip.clone()));
        }
        policy_context.insert(
            "anomalies".into(),
            Value::Array(anomalies.iter().cloned().map(Value::String).collect()),
        );
        let policy_context = Value::Object(policy_context);

        let user_id = context.user_id.map(|id| id.to_string());
        let mut actions = Vec::new();

        for policy in &policies {
            if !Self::policy_applies(policy, user_id.as_deref(), context.resource.as_deref()) {
                continue;
            }
            if Self::evaluate_policy_conditions(&policy.conditions, &policy_context) {
                tracing::debug!(policy = %policy.name, action = ?policy.action, "Adaptive policy matched");
                // A matching deny ends evaluation; nothing outranks it
                if policy.action == AccessAction::Deny {
                    return Ok(vec![AccessAction::Deny]);
                }
                if !actions.contains(&policy.action) {
                    actions.push(policy.action);
                }
            }
        }

        Ok(actions)
    }

    /// Whether a policy's user/resource scoping covers this request
    #[must_use]
    pub fn policy_applies(
        policy: &AdaptivePolicy,
        user_id: Option<&str>,
        resource: Option<&str>,
    ) -> bool {
        if let (Some(users), Some(user_id)) = (&policy.applies_to_users, user_id) {
            if !users.is_empty() && !users.iter().any(|u| u == user_id) {
                return false;
            }
        }

        if let (Some(resources), Some(resource)) = (&policy.applies_to_resources, resource) {
            if !resources.is_empty() && !resources.iter().any(|r| resource.starts_with(r.as_str()))
            {
                return false;
            }
        }

        true
    }

    /// Evaluate a condition tree: `and`/`or` arrays or a bare condition set
    #[must_use]
    pub fn evaluate_policy_conditions(conditions: &Value, context: &Value) -> bool {
        let Some(obj) = conditions.as_object() else {
            return true;
        };
        if obj.is_empty() {
            return true;
        }

        if let Some(clauses) = obj.get("and").and_then(Value::as_array) {
            return clauses
                .iter()
                .all(|clause| Self::evaluate_condition(clause, context));
        }

        if let Some(clauses) = obj.get("or").and_then(Value::as_array) {
            return clauses
                .iter()
                .any(|clause| Self::evaluate_condition(clause, context));
        }

        Self::evaluate_condition(conditions, context)
    }

    /// Evaluate a single condition object; every field must hold.
    /// Field values are either direct equality or operator objects with
    /// `in`, `not_in`, or `eq`.
    #[must_use]
    pub fn evaluate_condition(condition: &Value, context: &Value) -> bool {
        let Some(fields) = condition.as_object() else {
            return false;
        };
        let empty = serde_json::Map::new();
        let ctx = context.as_object().unwrap_or(&empty);

        for (field, expected) in fields {
            let Some(actual) = ctx.get(field) else {
                return false;
            };

            match expected.as_object() {
                Some(op) if op.contains_key("in") => {
                    let allowed = op.get("in").and_then(Value::as_array);
                    if !allowed.is_some_and(|list| list.contains(actual)) {
                        return false;
                    }
                }
                Some(op) if op.contains_key("not_in") => {
                    let denied = op.get("not_in").and_then(Value::as_array);
                    if denied.is_some_and(|list| list.contains(actual)) {
                        return false;
                    }
                }
                Some(op) if op.contains_key("eq") => {
                    if op.get("eq") != Some(actual) {
                        return false;
                    }
                }
                _ => {
                    if expected != actual {
                        return false;
                    }
                }
            }
        }

        true
    }

    /// The IP has never appeared in this user's login history
    async fn is_new_location(&self, user_id: Uuid, ip: &str) -> bool {
        match self.store.list_login_events(user_id, 50).await {
            Ok(events) if !events.is_empty() => !events
                .iter()
                .any(|e| e.ip_address.as_deref() == Some(ip)),
            _ => false,
        }
    }

    /// Distance/time inconsistency with the last known location.
    /// Requires a geo provider; without one this never fires.
    async fn check_impossible_travel(&self, _user_id: Uuid, _ip: &str) -> bool {
        false
    }

    /// Login hour far outside the user's established pattern
    async fn is_unusual_login_time(&self, user_id: Uuid) -> bool {
        use chrono::Timelike;

        let Ok(events) = self.store.list_login_events(user_id, 50).await else {
            return false;
        };
        // Need an established pattern before calling anything unusual
        if events.len() < 10 {
            return false;
        }

        let current_hour = i64::from(Utc::now().hour());
        !events.iter().any(|e| {
            let hour = i64::from(e.created_at.hour());
            (hour - current_hour).abs() <= 2 || (hour - current_hour).abs() >= 22
        })
    }

    /// Current IP absent from the user's recent login history
    async fn is_unusual_location(&self, user_id: Uuid, ip: &str) -> bool {
        match self.store.list_login_events(user_id, 50).await {
            Ok(events) if events.len() >= 5 => !events
                .iter()
                .any(|e| e.ip_address.as_deref() == Some(ip)),
            _ => false,
        }
    }

    /// Two successful logins from different IPs within a short window
    async fn has_concurrent_sessions_different_locations(&self, user_id: Uuid) -> bool {
        let Ok(events) = self.store.list_login_events(user_id, 20).await else {
            return false;
        };

        let window = Utc::now() - Duration::minutes(30);
        let recent_ips: std::collections::HashSet<&str> = events
            .iter()
            .filter(|e| e.success && e.created_at >= window)
            .filter_map(|e| e.ip_address.as_deref())
            .collect();

        recent_ips.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.24), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.25), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.49), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.50), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.74), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.75), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::Critical);
    }
}
