// ABOUTME: OAuth 2.0 / OIDC request, response, and error models
// ABOUTME: Implements RFC 6749/7662/7009 wire shapes plus the cached authorization-code record
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

/// OAuth 2.0 Authorization Request
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// Response type; only `code` is supported
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for the response
    pub redirect_uri: String,
    /// Requested scopes (space separated); defaults to `openid`
    pub scope: Option<String>,
    /// State parameter for client-side CSRF protection, echoed back
    pub state: Option<String>,
    /// OIDC nonce for replay protection, echoed into the ID token
    pub nonce: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method (`S256` or `plain`)
    pub code_challenge_method: Option<String>,
}

/// OAuth 2.0 Authorization Response: the code to deliver via redirect
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    /// Authorization code
    pub code: String,
    /// State parameter (if provided in request)
    pub state: Option<String>,
    /// Redirect URI the code must be delivered to
    pub redirect_uri: String,
}

/// OAuth 2.0 Token Request
///
/// Client credentials may arrive in the form body or as HTTP Basic auth;
/// the endpoint resolves both before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// Grant type (`authorization_code` or `refresh_token`)
    pub grant_type: String,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI used in the authorization request
    pub redirect_uri: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
    /// PKCE code verifier (RFC 7636)
    pub code_verifier: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Access token (JWT)
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// OIDC ID token, present when `openid` was granted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Scopes granted
    pub scope: String,
}

/// Ephemeral authorization-code record stored at `oauth:code:{code}`
///
/// Consumed with an atomic take; the state machine is
/// `issued -> (exchanged | expired)`, both terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeData {
    /// Client the code was issued to
    pub client_id: String,
    /// Authenticated user who approved the request
    pub user_id: String,
    /// Redirect URI bound to the code
    pub redirect_uri: String,
    /// Granted scope
    pub scope: String,
    /// OIDC nonce carried through to the ID token
    pub nonce: Option<String>,
    /// PKCE challenge, when the client supplied one
    pub code_challenge: Option<String>,
    /// PKCE challenge method (`S256` or `plain`)
    pub code_challenge_method: Option<String>,
}

/// Token introspection request (RFC 7662)
#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    /// Token under introspection
    pub token: String,
    /// Caller's hint about the token type
    pub token_type_hint: Option<String>,
    /// Client ID (may instead arrive via Basic auth)
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
}

/// Token revocation request (RFC 7009)
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    /// Token to revoke
    pub token: String,
    /// Caller's hint about the token type
    pub token_type_hint: Option<String>,
    /// Client ID (may instead arrive via Basic auth)
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
}

/// OpenID Connect UserInfo response, filtered by granted scope
#[derive(Debug, Default, Serialize)]
pub struct UserInfoResponse {
    /// Subject identifier (user ID)
    pub sub: String,
    /// Email, with the `email` (or `openid`) scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Email verification state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Full name, with the `profile` (or `openid`) scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Given name split from the full name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    /// Family name split from the full name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Last profile update (unix seconds)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// OAuth 2.0 Error Response
///
/// Errors are named protocol codes clients can branch on, never generic
/// failures.
#[derive(Debug, Clone, Serialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl OAuth2Error {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: "invalid_request".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `invalid_client` error
    #[must_use]
    pub fn invalid_client(description: &str) -> Self {
        Self {
            error: "invalid_client".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: &str) -> Self {
        Self {
            error: "invalid_grant".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `invalid_redirect_uri` error
    #[must_use]
    pub fn invalid_redirect_uri() -> Self {
        Self {
            error: "invalid_redirect_uri".to_owned(),
            error_description: Some("URI not registered for this client".to_owned()),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type(grant_type: &str) -> Self {
        Self {
            error: "unsupported_grant_type".to_owned(),
            error_description: Some(format!("Grant type '{grant_type}' is not supported")),
        }
    }

    /// Create an `unsupported_response_type` error
    #[must_use]
    pub fn unsupported_response_type() -> Self {
        Self {
            error: "unsupported_response_type".to_owned(),
            error_description: Some("Only 'code' is supported".to_owned()),
        }
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: &str) -> Self {
        Self {
            error: "invalid_scope".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create an `invalid_token` error (bearer-token endpoints)
    #[must_use]
    pub fn invalid_token(description: &str) -> Self {
        Self {
            error: "invalid_token".to_owned(),
            error_description: Some(description.to_owned()),
        }
    }

    /// Create a `server_error` (RFC 6749 section 4.1.2.1)
    #[must_use]
    pub fn server_error() -> Self {
        Self {
            error: "server_error".to_owned(),
            error_description: Some("The authorization server encountered an internal error".to_owned()),
        }
    }

    /// HTTP status for this error code per RFC 6749 section 5.2
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self.error.as_str() {
            "invalid_client" | "invalid_token" => StatusCode::UNAUTHORIZED,
            "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
