// ABOUTME: Integration tests for the risk assessment engine
// ABOUTME: Sub-score constants, level thresholds, anomaly findings, and adaptive policies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use janua_server::models::{DeviceProfile, LoginEvent};
use janua_server::store::IdentityStore;
use janua_server::risk::{
    AccessAction, AdaptivePolicy, AnomalyDetector, RiskAssessmentService, RiskContext,
    RiskFactors, RiskLevel,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

fn context_with_ip(user_id: Option<Uuid>, ip: &str) -> RiskContext {
    RiskContext {
        user_id,
        ip_address: Some(ip.to_owned()),
        ..RiskContext::default()
    }
}

#[tokio::test]
async fn test_empty_context_scores_medium() {
    let resources = common::create_test_resources().await;

    // No IP (0.5) + no device (0.6) + nothing else -> mean 0.275
    let assessment = resources.risk.assess_risk(&RiskContext::default()).await.unwrap();
    assert!((assessment.score - 0.275).abs() < 1e-9);
    assert_eq!(assessment.level, RiskLevel::Medium);
    assert!(assessment.anomalies.is_empty());
    assert!(assessment.required_actions.is_empty());
}

#[tokio::test]
async fn test_location_risk_constants() {
    let resources = common::create_test_resources().await;

    let no_ip = RiskContext::default();
    let factors = resources.risk.collect_risk_factors(&no_ip).await;
    assert!((resources.risk.assess_location_risk(&no_ip, &factors).await - 0.5).abs() < 1e-9);

    let with_ip = context_with_ip(None, "203.0.113.7");
    let factors = resources.risk.collect_risk_factors(&with_ip).await;
    assert!((resources.risk.assess_location_risk(&with_ip, &factors).await).abs() < 1e-9);
}

#[tokio::test]
async fn test_device_risk_constants() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "device@example.com").await;

    // No fingerprint
    let bare = RiskContext {
        user_id: Some(user.id),
        ..RiskContext::default()
    };
    assert!((resources.risk.assess_device_risk(&bare).await - 0.6).abs() < 1e-9);

    // First-seen device
    let unseen = RiskContext {
        user_id: Some(user.id),
        device_fingerprint: Some("fp-unknown".into()),
        ..RiskContext::default()
    };
    assert!((resources.risk.assess_device_risk(&unseen).await - 0.5).abs() < 1e-9);

    // Trusted device profile drives the score down
    resources
        .store
        .upsert_device_profile(&DeviceProfile {
            user_id: user.id,
            fingerprint: "fp-trusted".into(),
            trust_score: 0.9,
            first_seen_at: Utc::now() - Duration::days(30),
            last_seen_at: Utc::now(),
        })
        .await
        .unwrap();

    let trusted = RiskContext {
        user_id: Some(user.id),
        device_fingerprint: Some("fp-trusted".into()),
        ..RiskContext::default()
    };
    let risk = resources.risk.assess_device_risk(&trusted).await;
    assert!((risk - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn test_network_risk_blacklist_and_datacenter() {
    let resources = common::create_test_resources().await;
    resources.store.add_ip_to_blacklist("198.51.100.9").await.unwrap();

    let listed = context_with_ip(None, "198.51.100.9");
    let factors = resources.risk.collect_risk_factors(&listed).await;
    let risk = resources.risk.assess_network_risk(&listed, &factors).await;
    assert!(risk >= 0.5);

    let clean = context_with_ip(None, "203.0.113.7");
    let factors = resources.risk.collect_risk_factors(&clean).await;
    // Default reputation 0.7, not a datacenter, not blacklisted
    assert!((resources.risk.assess_network_risk(&clean, &factors).await).abs() < 1e-9);

    // Datacenter flag contributes 0.2
    let dc_factors = RiskFactors {
        is_datacenter: true,
        ..RiskFactors::default()
    };
    let risk = resources.risk.assess_network_risk(&clean, &dc_factors).await;
    assert!((risk - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn test_behavior_risk_failed_attempts() {
    let resources = common::create_test_resources().await;

    let quiet = RiskFactors::default();
    assert!((resources.risk.assess_behavior_risk(&quiet).await).abs() < 1e-9);

    let some_failures = RiskFactors {
        recent_failed_attempts: 3,
        ..RiskFactors::default()
    };
    assert!((resources.risk.assess_behavior_risk(&some_failures).await - 0.2).abs() < 1e-9);

    let many_failures = RiskFactors {
        recent_failed_attempts: 7,
        ..RiskFactors::default()
    };
    assert!((resources.risk.assess_behavior_risk(&many_failures).await - 0.4).abs() < 1e-9);
}

struct FixedDetector(f64);

#[async_trait::async_trait]
impl AnomalyDetector for FixedDetector {
    async fn score(&self, _factors: &RiskFactors) -> Option<f64> {
        Some(self.0)
    }
}

#[tokio::test]
async fn test_pluggable_detector_contributes() {
    let resources = common::create_test_resources().await;
    let service =
        RiskAssessmentService::new(resources.store.clone()).with_detector(Arc::new(FixedDetector(0.9)));

    let factors = RiskFactors::default();
    let risk = service.assess_behavior_risk(&factors).await;
    assert!((risk - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_failed_attempts_collected_from_store() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "bruteforce@example.com").await;

    for _ in 0..4 {
        resources
            .store
            .record_login_event(&LoginEvent::new(user.id, Some("203.0.113.7".into()), false))
            .await
            .unwrap();
    }

    let context = RiskContext {
        user_id: Some(user.id),
        ..RiskContext::default()
    };
    let factors = resources.risk.collect_risk_factors(&context).await;
    assert_eq!(factors.recent_failed_attempts, 4);
}

#[tokio::test]
async fn test_unusual_location_anomaly() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "traveler@example.com").await;

    // Build a history from one IP
    for _ in 0..6 {
        resources
            .store
            .record_login_event(&LoginEvent::new(user.id, Some("203.0.113.7".into()), true))
            .await
            .unwrap();
    }

    let familiar = context_with_ip(Some(user.id), "203.0.113.7");
    let anomalies = resources.risk.detect_anomalies(&familiar).await;
    assert!(!anomalies.contains(&"unusual_location".to_owned()));

    let unfamiliar = context_with_ip(Some(user.id), "198.51.100.99");
    let anomalies = resources.risk.detect_anomalies(&unfamiliar).await;
    assert!(anomalies.contains(&"unusual_location".to_owned()));
}

#[test]
fn test_condition_operators() {
    let context = json!({ "risk_level": "high", "user_id": "user-123" });

    assert!(RiskAssessmentService::evaluate_condition(
        &json!({ "risk_level": { "in": ["high", "critical"] } }),
        &context
    ));
    assert!(!RiskAssessmentService::evaluate_condition(
        &json!({ "risk_level": { "in": ["low"] } }),
        &context
    ));
    assert!(RiskAssessmentService::evaluate_condition(
        &json!({ "risk_level": { "not_in": ["low", "medium"] } }),
        &context
    ));
    assert!(!RiskAssessmentService::evaluate_condition(
        &json!({ "risk_level": { "not_in": ["high"] } }),
        &context
    ));
    assert!(RiskAssessmentService::evaluate_condition(
        &json!({ "user_id": { "eq": "user-123" } }),
        &context
    ));
    assert!(RiskAssessmentService::evaluate_condition(
        &json!({ "risk_level": "high" }),
        &context
    ));
    assert!(!RiskAssessmentService::evaluate_condition(
        &json!({ "missing_field": "value" }),
        &context
    ));
}

#[test]
fn test_condition_trees() {
    let context = json!({ "risk_level": "high", "user_id": "user-123" });

    assert!(RiskAssessmentService::evaluate_policy_conditions(
        &json!({ "and": [ { "risk_level": "high" }, { "user_id": "user-123" } ] }),
        &context
    ));
    assert!(!RiskAssessmentService::evaluate_policy_conditions(
        &json!({ "and": [ { "risk_level": "high" }, { "user_id": "user-456" } ] }),
        &context
    ));
    assert!(RiskAssessmentService::evaluate_policy_conditions(
        &json!({ "or": [ { "risk_level": "critical" }, { "risk_level": "high" } ] }),
        &context
    ));
    assert!(!RiskAssessmentService::evaluate_policy_conditions(
        &json!({ "or": [ { "risk_level": "critical" }, { "risk_level": "low" } ] }),
        &context
    ));
    // Empty conditions always pass
    assert!(RiskAssessmentService::evaluate_policy_conditions(
        &json!({}),
        &context
    ));
}

#[test]
fn test_policy_applies_scoping() {
    let policy = AdaptivePolicy {
        id: Uuid::new_v4(),
        organization_id: None,
        name: "scoped".into(),
        applies_to_users: Some(vec!["user-123".into()]),
        applies_to_resources: Some(vec!["/api/admin".into()]),
        conditions: json!({}),
        action: AccessAction::RequireMfa,
        priority: 0,
        is_active: true,
    };

    assert!(RiskAssessmentService::policy_applies(
        &policy,
        Some("user-123"),
        Some("/api/admin/users")
    ));
    assert!(!RiskAssessmentService::policy_applies(
        &policy,
        Some("user-999"),
        Some("/api/admin/users")
    ));
    assert!(!RiskAssessmentService::policy_applies(
        &policy,
        Some("user-123"),
        Some("/api/public")
    ));
    // Absent user id: user scoping cannot exclude
    assert!(RiskAssessmentService::policy_applies(
        &policy,
        None,
        Some("/api/admin")
    ));

    let unscoped = AdaptivePolicy {
        applies_to_users: Some(vec![]),
        applies_to_resources: None,
        ..policy
    };
    assert!(RiskAssessmentService::policy_applies(
        &unscoped,
        Some("anyone"),
        Some("/anywhere")
    ));
}

#[tokio::test]
async fn test_adaptive_policy_requires_mfa() {
    let resources = common::create_test_resources().await;

    resources
        .store
        .create_adaptive_policy(&AdaptivePolicy {
            id: Uuid::new_v4(),
            organization_id: None,
            name: "step-up on elevated risk".into(),
            applies_to_users: None,
            applies_to_resources: None,
            conditions: json!({ "risk_level": { "in": ["medium", "high", "critical"] } }),
            action: AccessAction::RequireMfa,
            priority: 10,
            is_active: true,
        })
        .await
        .unwrap();

    // Empty context lands in the medium band, which trips the policy
    let assessment = resources.risk.assess_risk(&RiskContext::default()).await.unwrap();
    assert_eq!(assessment.required_actions, vec![AccessAction::RequireMfa]);
}

#[tokio::test]
async fn test_adaptive_deny_wins() {
    let resources = common::create_test_resources().await;

    resources
        .store
        .create_adaptive_policy(&AdaptivePolicy {
            id: Uuid::new_v4(),
            organization_id: None,
            name: "mfa".into(),
            applies_to_users: None,
            applies_to_resources: None,
            conditions: json!({}),
            action: AccessAction::RequireMfa,
            priority: 100,
            is_active: true,
        })
        .await
        .unwrap();
    resources
        .store
        .create_adaptive_policy(&AdaptivePolicy {
            id: Uuid::new_v4(),
            organization_id: None,
            name: "hard deny".into(),
            applies_to_users: None,
            applies_to_resources: None,
            conditions: json!({ "risk_level": { "not_in": ["low"] } }),
            action: AccessAction::Deny,
            priority: 1,
            is_active: true,
        })
        .await
        .unwrap();

    let assessment = resources.risk.assess_risk(&RiskContext::default()).await.unwrap();
    assert_eq!(assessment.required_actions, vec![AccessAction::Deny]);
}
