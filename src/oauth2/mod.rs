// ABOUTME: OAuth 2.0 / OIDC authorization server module
// ABOUTME: Protocol surface for third-party clients: authorize, token, userinfo, introspect, revoke
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

/// Authorization server endpoints implementation
pub mod endpoints;
/// Request/response/error wire models
pub mod models;

pub use endpoints::OAuth2AuthorizationServer;
pub use models::OAuth2Error;
