// ABOUTME: OAuth 2.0 HTTP route handlers for the authorization server endpoints
// ABOUTME: Thin axum handlers delegating to OAuth2AuthorizationServer; errors use the OAuth wire format
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! OAuth 2.0 / OIDC protocol routes.
//!
//! The authorize endpoint authenticates the end user from a Bearer header
//! or the `janua_session` cookie and 302-redirects back to the client with
//! the code. All error bodies use the `error`/`error_description` format.

use crate::oauth2::models::{
    AuthorizeRequest, IntrospectRequest, OAuth2Error, RevokeRequest, TokenRequest,
};
use crate::resources::ServerResources;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum::routing::{get, post};
use axum::{Form, Router};
use base64::{engine::general_purpose, Engine as _};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use uuid::Uuid;

/// OAuth 2.0 route handlers
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all OAuth 2.0 routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/oauth/authorize", get(Self::handle_authorize_get))
            .route("/oauth/authorize", post(Self::handle_authorize_post))
            .route("/oauth/token", post(Self::handle_token))
            .route("/oauth/userinfo", get(Self::handle_userinfo))
            .route("/oauth/introspect", post(Self::handle_introspect))
            .route("/oauth/revoke", post(Self::handle_revoke))
            .route(
                "/.well-known/oauth-authorization-server",
                get(Self::handle_discovery),
            )
            .with_state(resources)
    }

    /// GET /oauth/authorize
    async fn handle_authorize_get(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(params): Query<HashMap<String, String>>,
    ) -> Response {
        Self::authorize(&resources, &headers, &params).await
    }

    /// POST /oauth/authorize (consent form submission)
    async fn handle_authorize_post(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Form(params): Form<HashMap<String, String>>,
    ) -> Response {
        Self::authorize(&resources, &headers, &params).await
    }

    async fn authorize(
        resources: &Arc<ServerResources>,
        headers: &HeaderMap,
        params: &HashMap<String, String>,
    ) -> Response {
        let request = match parse_authorize_request(params) {
            Ok(request) => request,
            Err(error) => return authorize_error_response(&error),
        };

        // Authenticate the end user from the Bearer header or session cookie
        let Some(user_id) = authenticated_user(resources, headers).await else {
            tracing::info!("No authenticated session for authorization, redirecting to login");
            let login_url = build_login_redirect(params);
            return redirect_response(&login_url);
        };

        match resources.oauth2.authorize(request, user_id).await {
            Ok(response) => {
                let mut location = format!("{}?code={}", response.redirect_uri, response.code);
                if let Some(state) = &response.state {
                    write!(&mut location, "&state={}", urlencoding::encode(state)).ok();
                }
                redirect_response(&location)
            }
            Err(error) => {
                tracing::warn!(error = %error.error, "Authorization request rejected");
                authorize_error_response(&error)
            }
        }
    }

    /// POST /oauth/token
    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> Response {
        let request = match parse_token_request(&form) {
            Ok(request) => request,
            Err(error) => return oauth_error_response(&error),
        };

        let basic_auth = parse_basic_auth(&headers);

        match resources.oauth2.token(request, basic_auth).await {
            Ok(response) => (StatusCode::OK, Json(response)).into_response(),
            Err(error) => {
                tracing::warn!(
                    error = %error.error,
                    client_id = form.get("client_id").map_or("unknown", |v| v),
                    "Token exchange failed"
                );
                oauth_error_response(&error)
            }
        }
    }

    /// GET /oauth/userinfo
    async fn handle_userinfo(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Response {
        let Some(token) = bearer_token(&headers) else {
            return unauthorized_bearer_response(&OAuth2Error::invalid_token(
                "Bearer token required",
            ));
        };

        match resources.oauth2.userinfo(&token).await {
            Ok(response) => (StatusCode::OK, Json(response)).into_response(),
            Err(error) => unauthorized_bearer_response(&error),
        }
    }

    /// POST /oauth/introspect
    async fn handle_introspect(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Form(request): Form<IntrospectRequest>,
    ) -> Response {
        let basic_auth = parse_basic_auth(&headers);

        match resources.oauth2.introspect(request, basic_auth).await {
            Ok(body) => (StatusCode::OK, Json(body)).into_response(),
            Err(error) => oauth_error_response(&error),
        }
    }

    /// POST /oauth/revoke
    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Form(request): Form<RevokeRequest>,
    ) -> Response {
        let basic_auth = parse_basic_auth(&headers);

        match resources.oauth2.revoke(request, basic_auth).await {
            // 200 regardless of token validity (RFC 7009)
            Ok(()) => (
                StatusCode::OK,
                Json(serde_json::json!({ "message": "Token revoked" })),
            )
                .into_response(),
            Err(error) => oauth_error_response(&error),
        }
    }

    /// GET /.well-known/oauth-authorization-server (RFC 8414)
    async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Response {
        (StatusCode::OK, Json(resources.oauth2.discovery_document())).into_response()
    }
}

/// Resolve the authenticated end user from a Bearer header or the
/// `janua_session` cookie
async fn authenticated_user(
    resources: &Arc<ServerResources>,
    headers: &HeaderMap,
) -> Option<Uuid> {
    let token = bearer_token(headers).or_else(|| session_cookie(headers))?;

    match resources.tokens.validate_cached(&token).await {
        Ok(validation) => crate::utils::uuid::parse_uuid(&validation.sub).ok(),
        Err(e) => {
            tracing::debug!("Session token rejected during authorization: {e}");
            None
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(ToOwned::to_owned)
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    for cookie in cookies.split(';') {
        if let Some(token) = cookie.trim().strip_prefix("janua_session=") {
            return Some(token.to_owned());
        }
    }
    None
}

/// Parse HTTP Basic credentials into (client_id, client_secret)
fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    Some((client_id.to_owned(), client_secret.to_owned()))
}

fn parse_authorize_request(
    params: &HashMap<String, String>,
) -> Result<AuthorizeRequest, OAuth2Error> {
    let response_type = params
        .get("response_type")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing response_type parameter"))?
        .clone();
    let client_id = params
        .get("client_id")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing client_id parameter"))?
        .clone();
    let redirect_uri = params
        .get("redirect_uri")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing redirect_uri parameter"))?
        .clone();

    Ok(AuthorizeRequest {
        response_type,
        client_id,
        redirect_uri,
        scope: params.get("scope").cloned(),
        state: params.get("state").cloned(),
        nonce: params.get("nonce").cloned(),
        code_challenge: params.get("code_challenge").cloned(),
        code_challenge_method: params.get("code_challenge_method").cloned(),
    })
}

fn parse_token_request(form: &HashMap<String, String>) -> Result<TokenRequest, OAuth2Error> {
    let grant_type = form
        .get("grant_type")
        .ok_or_else(|| OAuth2Error::invalid_request("Missing grant_type parameter"))?
        .clone();

    Ok(TokenRequest {
        grant_type,
        code: form.get("code").cloned(),
        redirect_uri: form.get("redirect_uri").cloned(),
        client_id: form.get("client_id").cloned(),
        client_secret: form.get("client_secret").cloned(),
        refresh_token: form.get("refresh_token").cloned(),
        code_verifier: form.get("code_verifier").cloned(),
    })
}

/// Preserve the full authorization request through the login flow
fn build_login_redirect(params: &HashMap<String, String>) -> String {
    let mut query = String::new();
    for (key, value) in params {
        if !query.is_empty() {
            query.push('&');
        }
        write!(&mut query, "{key}={}", urlencoding::encode(value)).ok();
    }
    format!("/login?next={}", urlencoding::encode(&format!("/oauth/authorize?{query}")))
}

fn redirect_response(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_owned())],
    )
        .into_response()
}

fn oauth_error_response(error: &OAuth2Error) -> Response {
    (error.http_status(), Json(error.clone())).into_response()
}

/// Authorization endpoint errors are shown to the resource owner as 400;
/// 401 is reserved for token-endpoint client authentication (RFC 6749)
fn authorize_error_response(error: &OAuth2Error) -> Response {
    let status = if error.error == "server_error" {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(error.clone())).into_response()
}

fn unauthorized_bearer_response(error: &OAuth2Error) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(error.clone()),
    )
        .into_response()
}
