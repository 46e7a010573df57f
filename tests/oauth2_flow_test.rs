// ABOUTME: Integration tests for the OAuth2/OIDC authorization server flows
// ABOUTME: Covers authorize validation, PKCE, single-use codes, refresh, introspect, and revoke
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright (c) 2025 Janua Identity

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use janua_server::oauth2::models::{
    AuthorizeRequest, IntrospectRequest, RevokeRequest, TokenRequest,
};
use janua_server::tokens::TokenUse;

const REDIRECT_URI: &str = "https://app.example.com/callback";

fn authorize_request(client_id: &str, challenge: Option<&str>) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".into(),
        client_id: client_id.into(),
        redirect_uri: REDIRECT_URI.into(),
        scope: Some("openid email profile".into()),
        state: Some("xyz-state".into()),
        nonce: Some("nonce-1".into()),
        code_challenge: challenge.map(ToOwned::to_owned),
        code_challenge_method: challenge.map(|_| "S256".into()),
    }
}

fn token_request(client_id: &str, secret: &str, code: &str, verifier: Option<&str>) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".into(),
        code: Some(code.into()),
        redirect_uri: Some(REDIRECT_URI.into()),
        client_id: Some(client_id.into()),
        client_secret: Some(secret.into()),
        refresh_token: None,
        code_verifier: verifier.map(ToOwned::to_owned),
    }
}

#[tokio::test]
async fn test_authorize_unknown_client() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "user@example.com").await;

    let error = resources
        .oauth2
        .authorize(authorize_request("no-such-client", None), user.id)
        .await
        .unwrap_err();

    assert_eq!(error.error, "invalid_client");
}

#[tokio::test]
async fn test_authorize_rejects_wrong_response_type() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "user@example.com").await;
    common::register_test_client(&resources, "web-app", REDIRECT_URI).await;

    let mut request = authorize_request("web-app", None);
    request.response_type = "token".into();

    let error = resources.oauth2.authorize(request, user.id).await.unwrap_err();
    assert_eq!(error.error, "unsupported_response_type");
}

#[tokio::test]
async fn test_authorize_rejects_unregistered_redirect_uri() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "user@example.com").await;
    common::register_test_client(&resources, "web-app", REDIRECT_URI).await;

    let mut request = authorize_request("web-app", None);
    request.redirect_uri = "https://evil.example.com/callback".into();

    let error = resources.oauth2.authorize(request, user.id).await.unwrap_err();
    assert_eq!(error.error, "invalid_redirect_uri");
}

#[tokio::test]
async fn test_authorize_accepts_trailing_slash_variant() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "user@example.com").await;
    common::register_test_client(&resources, "web-app", REDIRECT_URI).await;

    let mut request = authorize_request("web-app", None);
    request.redirect_uri = format!("{REDIRECT_URI}/");

    assert!(resources.oauth2.authorize(request, user.id).await.is_ok());
}

#[tokio::test]
async fn test_full_code_flow_with_pkce() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "flow@example.com").await;
    let (client, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();
    assert_eq!(authorize.state.as_deref(), Some("xyz-state"));
    assert!(!authorize.code.is_empty());

    let tokens = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(&verifier)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(tokens.token_type, "Bearer");
    assert!(tokens.refresh_token.is_some());
    assert!(tokens.id_token.is_some());

    // Access token subject is the authenticated user
    let claims = resources
        .tokens
        .validate(&tokens.access_token, TokenUse::Access)
        .await
        .unwrap();
    assert_eq!(claims.sub, user.id.to_string());
    assert_eq!(claims.client_id.as_deref(), Some(client.client_id.as_str()));

    // ID token carries sub, nonce, and at_hash
    let id_claims = common::decode_jwt_payload(tokens.id_token.as_deref().unwrap());
    assert_eq!(id_claims["sub"], user.id.to_string());
    assert_eq!(id_claims["nonce"], "nonce-1");
    assert!(id_claims["at_hash"].is_string());
}

#[tokio::test]
async fn test_code_is_single_use() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "once@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();

    let first = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(&verifier)),
            None,
        )
        .await;
    assert!(first.is_ok());

    let second = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(&verifier)),
            None,
        )
        .await;
    assert_eq!(second.unwrap_err().error, "invalid_grant");
}

#[tokio::test]
async fn test_concurrent_exchange_only_one_succeeds() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "race@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let resources = resources.clone();
        let request = token_request("web-app", &secret, &authorize.code, Some(&verifier));
        handles.push(tokio::spawn(async move {
            resources.oauth2.token(request, None).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(error) => assert_eq!(error.error, "invalid_grant"),
        }
    }

    assert_eq!(successes, 1, "exactly one concurrent exchange must win");
}

#[tokio::test]
async fn test_pkce_verifier_required() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "pkce@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (_, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();

    let error = resources
        .oauth2
        .token(token_request("web-app", &secret, &authorize.code, None), None)
        .await
        .unwrap_err();
    assert_eq!(error.error, "invalid_request");
}

#[tokio::test]
async fn test_pkce_wrong_verifier_rejected() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "pkce2@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (_, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();

    let wrong = "wrong-verifier-wrong-verifier-wrong-verifier-42";
    let error = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(wrong)),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(error.error, "invalid_grant");
}

#[tokio::test]
async fn test_pkce_plain_method() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "plain@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;

    let verifier = "plain-verifier-plain-verifier-plain-verifier-1";
    let mut request = authorize_request("web-app", Some(verifier));
    request.code_challenge_method = Some("plain".into());

    let authorize = resources.oauth2.authorize(request, user.id).await.unwrap();

    let tokens = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(verifier)),
            None,
        )
        .await;
    assert!(tokens.is_ok());
}

#[tokio::test]
async fn test_wrong_client_secret_rejected() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "secret@example.com").await;
    common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();

    let error = resources
        .oauth2
        .token(
            token_request("web-app", "not-the-secret", &authorize.code, Some(&verifier)),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(error.error, "invalid_client");
}

#[tokio::test]
async fn test_client_credentials_via_basic_auth() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "basic@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();

    let mut request = token_request("web-app", "", &authorize.code, Some(&verifier));
    request.client_id = None;
    request.client_secret = None;

    let tokens = resources
        .oauth2
        .token(request, Some(("web-app".to_owned(), secret)))
        .await;
    assert!(tokens.is_ok());
}

#[tokio::test]
async fn test_refresh_token_grant() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "refresh@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();
    let tokens = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(&verifier)),
            None,
        )
        .await
        .unwrap();

    let refresh = TokenRequest {
        grant_type: "refresh_token".into(),
        refresh_token: tokens.refresh_token.clone(),
        client_id: Some("web-app".into()),
        client_secret: Some(secret),
        ..TokenRequest::default()
    };

    let refreshed = resources.oauth2.token(refresh, None).await.unwrap();
    assert!(!refreshed.access_token.is_empty());
    // The same refresh token is returned (no rotation)
    assert_eq!(refreshed.refresh_token, tokens.refresh_token);
}

#[tokio::test]
async fn test_refresh_token_bound_to_client() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "bound@example.com").await;
    let (_, secret_a) = common::register_test_client(&resources, "client-a", REDIRECT_URI).await;
    let (_, secret_b) = common::register_test_client(&resources, "client-b", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("client-a", Some(&challenge)), user.id)
        .await
        .unwrap();
    let tokens = resources
        .oauth2
        .token(
            token_request("client-a", &secret_a, &authorize.code, Some(&verifier)),
            None,
        )
        .await
        .unwrap();

    let stolen = TokenRequest {
        grant_type: "refresh_token".into(),
        refresh_token: tokens.refresh_token,
        client_id: Some("client-b".into()),
        client_secret: Some(secret_b),
        ..TokenRequest::default()
    };

    let error = resources.oauth2.token(stolen, None).await.unwrap_err();
    assert_eq!(error.error, "invalid_grant");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let resources = common::create_test_resources().await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;

    let request = TokenRequest {
        grant_type: "password".into(),
        client_id: Some("web-app".into()),
        client_secret: Some(secret),
        ..TokenRequest::default()
    };

    let error = resources.oauth2.token(request, None).await.unwrap_err();
    assert_eq!(error.error, "unsupported_grant_type");
}

#[tokio::test]
async fn test_userinfo_scope_filtering() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "scopes@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let mut request = authorize_request("web-app", Some(&challenge));
    request.scope = Some("openid".into());

    let authorize = resources.oauth2.authorize(request, user.id).await.unwrap();
    let tokens = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(&verifier)),
            None,
        )
        .await
        .unwrap();

    let userinfo = resources
        .oauth2
        .userinfo(&tokens.access_token)
        .await
        .unwrap();

    assert_eq!(userinfo.sub, user.id.to_string());
    // openid implies email and profile visibility
    assert_eq!(userinfo.email.as_deref(), Some("scopes@example.com"));
    assert_eq!(userinfo.name.as_deref(), Some("Test User"));
    assert_eq!(userinfo.given_name.as_deref(), Some("Test"));
    assert_eq!(userinfo.family_name.as_deref(), Some("User"));
}

#[tokio::test]
async fn test_userinfo_rejects_garbage_token() {
    let resources = common::create_test_resources().await;
    let error = resources.oauth2.userinfo("not-a-token").await.unwrap_err();
    assert_eq!(error.error, "invalid_token");
}

#[tokio::test]
async fn test_introspect_active_and_inactive() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "intro@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();
    let tokens = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(&verifier)),
            None,
        )
        .await
        .unwrap();

    let active = resources
        .oauth2
        .introspect(
            IntrospectRequest {
                token: tokens.access_token.clone(),
                token_type_hint: None,
                client_id: Some("web-app".into()),
                client_secret: Some(secret.clone()),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(active["active"], true);
    assert_eq!(active["sub"], user.id.to_string());

    // Unverifiable tokens yield {active: false} with no reason
    let inactive = resources
        .oauth2
        .introspect(
            IntrospectRequest {
                token: "garbage".into(),
                token_type_hint: None,
                client_id: Some("web-app".into()),
                client_secret: Some(secret),
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(inactive, serde_json::json!({ "active": false }));
}

#[tokio::test]
async fn test_introspect_requires_client_auth() {
    let resources = common::create_test_resources().await;

    let error = resources
        .oauth2
        .introspect(
            IntrospectRequest {
                token: "anything".into(),
                token_type_hint: None,
                client_id: None,
                client_secret: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(error.error, "invalid_client");
}

#[tokio::test]
async fn test_revoke_invalid_token_still_succeeds() {
    let resources = common::create_test_resources().await;
    common::register_test_client(&resources, "web-app", REDIRECT_URI).await;

    // No existence leakage: revoking garbage is a success
    let result = resources
        .oauth2
        .revoke(
            RevokeRequest {
                token: "never-was-a-token".into(),
                token_type_hint: None,
                client_id: None,
                client_secret: None,
            },
            None,
        )
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_revoked_token_fails_validation() {
    let resources = common::create_test_resources().await;
    let user = common::create_test_user(&resources, "revoke@example.com").await;
    let (_, secret) = common::register_test_client(&resources, "web-app", REDIRECT_URI).await;
    let (verifier, challenge) = common::pkce_pair();

    let authorize = resources
        .oauth2
        .authorize(authorize_request("web-app", Some(&challenge)), user.id)
        .await
        .unwrap();
    let tokens = resources
        .oauth2
        .token(
            token_request("web-app", &secret, &authorize.code, Some(&verifier)),
            None,
        )
        .await
        .unwrap();

    resources
        .oauth2
        .revoke(
            RevokeRequest {
                token: tokens.access_token.clone(),
                token_type_hint: None,
                client_id: Some("web-app".into()),
                client_secret: Some(secret),
            },
            None,
        )
        .await
        .unwrap();

    let result = resources
        .tokens
        .validate(&tokens.access_token, TokenUse::Access)
        .await;
    assert!(result.is_err());

    let userinfo = resources.oauth2.userinfo(&tokens.access_token).await;
    assert!(userinfo.is_err());
}
