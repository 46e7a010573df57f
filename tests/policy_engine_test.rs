// ABOUTME: Integration tests for the policy decision engine
// ABOUTME: Pattern matching, conditions, deny-overrides aggregation, caching, and WASM fallback
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use janua_server::policy::compiler::PolicyCompiler;
use janua_server::policy::{
    PolicyConditions, PolicyEngine, PolicyRequest, PolicyRule, PolicyRules, RulePattern,
    SinglePolicyOutcome,
};
use serde_json::json;
use uuid::Uuid;

fn request(subject: &str, action: &str, resource: &str) -> PolicyRequest {
    PolicyRequest {
        subject: subject.into(),
        action: action.into(),
        resource: resource.into(),
        context: None,
    }
}

#[tokio::test]
async fn test_no_policies_default_deny() {
    let resources = common::create_test_resources().await;
    let tenant = Uuid::new_v4();

    let decision = resources
        .policy
        .evaluate(&request("user-1", "read", "documents"), tenant)
        .await
        .unwrap();

    assert!(!decision.allowed);
    assert!(decision.matched_policies.is_empty());
    assert!(decision.reason.contains("default deny"));
}

#[tokio::test]
async fn test_allow_policy_matches() {
    let resources = common::create_test_resources().await;
    let tenant = Uuid::new_v4();

    let mut rule = PolicyRule::new(tenant, "readers");
    rule.actions = Some(vec!["read".into()]);
    rule.resource_pattern = Some("documents/*".into());
    resources.policy.create_rule(&rule).await.unwrap();

    let decision = resources
        .policy
        .evaluate(&request("user-1", "read", "documents/123"), tenant)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.matched_policies, vec!["readers".to_owned()]);

    let denied = resources
        .policy
        .evaluate(&request("user-1", "delete", "documents/123"), tenant)
        .await
        .unwrap();
    assert!(!denied.allowed);

    let wrong_resource = resources
        .policy
        .evaluate(&request("user-1", "read", "users/123"), tenant)
        .await
        .unwrap();
    assert!(!wrong_resource.allowed);
}

#[tokio::test]
async fn test_deny_rule_overrides_allow() {
    let resources = common::create_test_resources().await;
    let tenant = Uuid::new_v4();

    let mut allow_all = PolicyRule::new(tenant, "allow-everyone");
    allow_all.actions = Some(vec!["read".into()]);
    resources.policy.create_rule(&allow_all).await.unwrap();

    let mut block = PolicyRule::new(tenant, "block-contractors");
    block.rules = Some(PolicyRules {
        allow: None,
        deny: Some(RulePattern {
            subject: Some("contractor-*".into()),
            action: None,
            resource: None,
        }),
    });
    resources.policy.create_rule(&block).await.unwrap();

    let employee = resources
        .policy
        .evaluate(&request("employee-7", "read", "documents"), tenant)
        .await
        .unwrap();
    assert!(employee.allowed);

    let contractor = resources
        .policy
        .evaluate(&request("contractor-9", "read", "documents"), tenant)
        .await
        .unwrap();
    assert!(!contractor.allowed);
    assert_eq!(contractor.denied_by.as_deref(), Some("block-contractors"));
}

#[tokio::test]
async fn test_mfa_condition() {
    let resources = common::create_test_resources().await;
    let tenant = Uuid::new_v4();

    let mut rule = PolicyRule::new(tenant, "sensitive-ops");
    rule.conditions = Some(PolicyConditions {
        mfa_required: Some(true),
        ip_range: None,
        attributes: None,
    });
    resources.policy.create_rule(&rule).await.unwrap();

    let without_mfa = PolicyRequest {
        context: Some(json!({ "mfa_verified": false })),
        ..request("user-1", "rotate", "secrets/prod")
    };
    assert!(!resources.policy.evaluate(&without_mfa, tenant).await.unwrap().allowed);

    let with_mfa = PolicyRequest {
        context: Some(json!({ "mfa_verified": true })),
        ..request("user-1", "rotate", "secrets/prod")
    };
    assert!(resources.policy.evaluate(&with_mfa, tenant).await.unwrap().allowed);
}

#[tokio::test]
async fn test_ip_range_condition() {
    let resources = common::create_test_resources().await;
    let tenant = Uuid::new_v4();

    let mut rule = PolicyRule::new(tenant, "office-only");
    rule.conditions = Some(PolicyConditions {
        mfa_required: None,
        ip_range: Some("192.168.1.0/24".into()),
        attributes: None,
    });
    resources.policy.create_rule(&rule).await.unwrap();

    let inside = PolicyRequest {
        context: Some(json!({ "client_ip": "192.168.1.50" })),
        ..request("user-1", "read", "ledger")
    };
    assert!(resources.policy.evaluate(&inside, tenant).await.unwrap().allowed);

    let outside = PolicyRequest {
        context: Some(json!({ "client_ip": "10.0.0.1" })),
        ..request("user-1", "read", "ledger")
    };
    assert!(!resources.policy.evaluate(&outside, tenant).await.unwrap().allowed);

    let missing_ip = request("user-1", "read", "ledger");
    assert!(!resources.policy.evaluate(&missing_ip, tenant).await.unwrap().allowed);
}

#[tokio::test]
async fn test_attribute_conditions() {
    let resources = common::create_test_resources().await;
    let tenant = Uuid::new_v4();

    let mut rule = PolicyRule::new(tenant, "senior-engineers");
    let mut attributes = serde_json::Map::new();
    attributes.insert("department".into(), json!("engineering"));
    attributes.insert("level".into(), json!("senior"));
    rule.conditions = Some(PolicyConditions {
        mfa_required: None,
        ip_range: None,
        attributes: Some(attributes),
    });
    resources.policy.create_rule(&rule).await.unwrap();

    let matching = PolicyRequest {
        context: Some(json!({ "department": "engineering", "level": "senior" })),
        ..request("user-1", "merge", "repos/core")
    };
    assert!(resources.policy.evaluate(&matching, tenant).await.unwrap().allowed);

    let mismatched = PolicyRequest {
        context: Some(json!({ "department": "marketing", "level": "senior" })),
        ..request("user-1", "merge", "repos/core")
    };
    assert!(!resources.policy.evaluate(&mismatched, tenant).await.unwrap().allowed);
}

#[tokio::test]
async fn test_policy_write_invalidates_cached_decisions() {
    let resources = common::create_test_resources().await;
    let tenant = Uuid::new_v4();

    // Prime the cache with a deny
    let denied = resources
        .policy
        .evaluate(&request("user-1", "read", "documents"), tenant)
        .await
        .unwrap();
    assert!(!denied.allowed);

    // Creating a rule must flush the cached deny on the write path
    let mut rule = PolicyRule::new(tenant, "readers");
    rule.actions = Some(vec!["read".into()]);
    resources.policy.create_rule(&rule).await.unwrap();

    let allowed = resources
        .policy
        .evaluate(&request("user-1", "read", "documents"), tenant)
        .await
        .unwrap();
    assert!(allowed.allowed);
}

#[tokio::test]
async fn test_inactive_policies_ignored() {
    let resources = common::create_test_resources().await;
    let tenant = Uuid::new_v4();

    let mut rule = PolicyRule::new(tenant, "disabled");
    rule.is_active = false;
    resources.policy.create_rule(&rule).await.unwrap();

    let decision = resources
        .policy
        .evaluate(&request("user-1", "read", "anything"), tenant)
        .await
        .unwrap();
    assert!(!decision.allowed);
}

#[test]
fn test_single_policy_reasons() {
    let tenant = Uuid::new_v4();
    let mut rule = PolicyRule::new(tenant, "readers");
    rule.actions = Some(vec!["read".into()]);
    rule.resource_pattern = Some("documents/*".into());

    let wrong_action = PolicyEngine::evaluate_single_policy(&rule, &request("s", "delete", "documents/1"));
    match wrong_action {
        SinglePolicyOutcome::NotApplicable(reason) => {
            assert!(reason.contains("not in policy actions"));
        }
        other => panic!("expected NotApplicable, got {other:?}"),
    }

    let wrong_resource = PolicyEngine::evaluate_single_policy(&rule, &request("s", "read", "users/1"));
    match wrong_resource {
        SinglePolicyOutcome::NotApplicable(reason) => {
            assert!(reason.contains("doesn't match pattern"));
        }
        other => panic!("expected NotApplicable, got {other:?}"),
    }

    assert_eq!(
        PolicyEngine::evaluate_single_policy(&rule, &request("s", "read", "documents/1")),
        SinglePolicyOutcome::Allowed
    );
}

#[tokio::test]
async fn test_compile_to_wasm_never_fails() {
    common::init_test_logging();
    let tenant = Uuid::new_v4();

    // Missing toolchain binary yields None, not an error
    let compiler = PolicyCompiler::new().with_binary("opa-binary-that-does-not-exist");

    let mut rule = PolicyRule::new(tenant, "compiled");
    rule.rego_code = Some("package policy\ndefault allow = false".into());
    assert!(compiler.compile_to_wasm(&rule).await.is_none());

    // A rule without Rego source is also None
    let plain = PolicyRule::new(tenant, "plain");
    assert!(compiler.compile_to_wasm(&plain).await.is_none());
}
