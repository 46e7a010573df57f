// ABOUTME: Integration tests for the RBAC engine
// ABOUTME: Role resolution, static matrix, dynamic policies, caching, and enforcement
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use janua_server::errors::ErrorCode;
use janua_server::store::IdentityStore;
use janua_server::rbac::{PolicyEffect, RbacPolicy};
use serde_json::json;
use uuid::Uuid;

fn policy(org_id: Uuid, permission: &str, conditions: Option<serde_json::Value>) -> RbacPolicy {
    RbacPolicy {
        id: Uuid::new_v4(),
        organization_id: org_id,
        name: format!("grant {permission}"),
        permission: permission.to_owned(),
        resource_type: None,
        effect: PolicyEffect::Allow,
        conditions,
        is_active: true,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_viewer_cannot_delete_org() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "viewer@example.com").await;
    let org_id = Uuid::new_v4();

    resources.rbac.set_role(user.id, org_id, "viewer").await.unwrap();

    assert!(!resources
        .rbac
        .check_permission(user.id, org_id, "org:delete")
        .await
        .unwrap());
    assert!(resources
        .rbac
        .check_permission(user.id, org_id, "org:read")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_owner_can_delete_org() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "owner@example.com").await;
    let org_id = Uuid::new_v4();

    resources.rbac.set_role(user.id, org_id, "owner").await.unwrap();

    assert!(resources
        .rbac
        .check_permission(user.id, org_id, "org:delete")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_no_role_denies() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "norole@example.com").await;

    assert!(!resources
        .rbac
        .check_permission(user.id, Uuid::new_v4(), "org:read")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_super_admin_short_circuits() {
    let resources = common::create_test_resources().await;
    let mut user = common::create_test_user(&resources, "root@example.com").await;
    user.is_super_admin = true;
    resources.store.update_user(&user).await.unwrap();

    // No org membership at all, still allowed everything
    assert!(resources
        .rbac
        .check_permission(user.id, Uuid::new_v4(), "anything:at:all")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_dynamic_policy_grants_beyond_matrix() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "member@example.com").await;
    let other = common::create_test_user(&resources, "other@example.com").await;
    let org_id = Uuid::new_v4();

    resources.rbac.set_role(user.id, org_id, "member").await.unwrap();
    resources.rbac.set_role(other.id, org_id, "member").await.unwrap();

    // Matrix denies projects:write to members; a user-scoped dynamic
    // policy grants it to one of them
    resources
        .store
        .create_rbac_policy(&policy(
            org_id,
            "projects:write",
            Some(json!({ "user_id": user.id.to_string() })),
        ))
        .await
        .unwrap();

    assert!(resources
        .rbac
        .check_permission(user.id, org_id, "projects:write")
        .await
        .unwrap());
    assert!(!resources
        .rbac
        .check_permission(other.id, org_id, "projects:write")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_dynamic_policy_time_range() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "timed@example.com").await;
    let org_id = Uuid::new_v4();
    resources.rbac.set_role(user.id, org_id, "member").await.unwrap();

    let expired_range = json!({
        "time_range": {
            "start": (Utc::now() - Duration::hours(2)).to_rfc3339(),
            "end": (Utc::now() - Duration::hours(1)).to_rfc3339(),
        }
    });
    resources
        .store
        .create_rbac_policy(&policy(org_id, "reports:export", Some(expired_range)))
        .await
        .unwrap();

    assert!(!resources
        .rbac
        .check_permission(user.id, org_id, "reports:export")
        .await
        .unwrap());

    let open_range = json!({
        "time_range": {
            "start": (Utc::now() - Duration::hours(1)).to_rfc3339(),
            "end": (Utc::now() + Duration::hours(1)).to_rfc3339(),
        }
    });
    resources
        .store
        .create_rbac_policy(&policy(org_id, "reports:download", Some(open_range)))
        .await
        .unwrap();

    assert!(resources
        .rbac
        .check_permission(user.id, org_id, "reports:download")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_custom_attribute_conditions() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "attrs@example.com").await;
    let org_id = Uuid::new_v4();
    resources.rbac.set_role(user.id, org_id, "member").await.unwrap();

    resources
        .store
        .create_rbac_policy(&policy(
            org_id,
            "deploys:approve",
            Some(json!({ "custom": { "department": "engineering" } })),
        ))
        .await
        .unwrap();

    let matching = json!({ "department": "engineering" });
    assert!(resources
        .rbac
        .check_permission_with_context(user.id, org_id, "deploys:approve", None, &matching)
        .await
        .unwrap());

    // Different permission string so the cached decision above is not reused
    resources
        .store
        .create_rbac_policy(&policy(
            org_id,
            "deploys:rollback",
            Some(json!({ "custom": { "department": "engineering" } })),
        ))
        .await
        .unwrap();

    let mismatched = json!({ "department": "sales" });
    assert!(!resources
        .rbac
        .check_permission_with_context(user.id, org_id, "deploys:rollback", None, &mismatched)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_role_change_invalidates_cache() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "promoted@example.com").await;
    let org_id = Uuid::new_v4();

    resources.rbac.set_role(user.id, org_id, "viewer").await.unwrap();
    assert!(!resources
        .rbac
        .check_permission(user.id, org_id, "org:delete")
        .await
        .unwrap());

    // Promotion must invalidate the cached deny synchronously
    resources.rbac.set_role(user.id, org_id, "owner").await.unwrap();
    assert!(resources
        .rbac
        .check_permission(user.id, org_id, "org:delete")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_get_user_permissions_union() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "union@example.com").await;
    let org_id = Uuid::new_v4();

    resources.rbac.set_role(user.id, org_id, "owner").await.unwrap();
    resources
        .store
        .create_rbac_policy(&policy(org_id, "beta:access", None))
        .await
        .unwrap();

    let permissions = resources.rbac.get_user_permissions(user.id, org_id).await.unwrap();
    assert!(permissions.contains("org:*"));
    assert!(permissions.contains("users:*"));
    assert!(permissions.contains("billing:*"));
    assert!(permissions.contains("beta:access"));
}

#[tokio::test]
async fn test_enforce_permission_maps_to_403() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "enforce@example.com").await;
    let org_id = Uuid::new_v4();
    resources.rbac.set_role(user.id, org_id, "viewer").await.unwrap();

    assert!(resources
        .rbac
        .enforce_permission(user.id, org_id, "org:read")
        .await
        .is_ok());

    let error = resources
        .rbac
        .enforce_permission(user.id, org_id, "org:delete")
        .await
        .unwrap_err();
    assert_eq!(error.code, ErrorCode::PermissionDenied);
    assert_eq!(error.http_status(), 403);
}
