// ABOUTME: HTTP route composition for the identity server
// ABOUTME: Mounts health, OAuth2, and SSO routers with shared middleware layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

/// Health and readiness endpoints
pub mod health;
/// OAuth2/OIDC protocol endpoints
pub mod oauth2;
/// SSO federation endpoints
pub mod sso;

use crate::resources::ServerResources;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Compose the full application router
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(health::HealthRoutes::routes())
        .merge(oauth2::OAuth2Routes::routes(resources.clone()))
        .merge(sso::SsoRoutes::routes(resources))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
