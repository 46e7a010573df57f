// ABOUTME: SSO federation HTTP routes: initiate, SAML ACS, OIDC callback, logout
// ABOUTME: Thin axum handlers over the SSO orchestrator; SsoError maps kinds to statuses
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use crate::resources::ServerResources;
use crate::sso::error::SsoError;
use crate::sso::provider::SsoRedirect;
use crate::sso::SsoLoginResult;
use axum::extract::{Path, Query, State};
use axum::Json;
use axum::routing::{delete, get, post};
use axum::{Form, Router};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// Request body for initiating a federated login
#[derive(Debug, Default, Deserialize)]
pub struct InitiateRequest {
    /// Where to send the user after a successful login
    pub return_url: Option<String>,
}

/// SAML assertion consumer service payload
#[derive(Debug, Deserialize)]
pub struct SamlAcsForm {
    /// Base64-encoded SAML response document
    #[serde(rename = "SAMLResponse")]
    pub saml_response: String,
    /// Relay state issued at initiate time
    #[serde(rename = "RelayState")]
    pub relay_state: String,
}

/// OIDC callback query parameters
#[derive(Debug, Deserialize)]
pub struct OidcCallbackQuery {
    /// Authorization code from the IdP
    pub code: Option<String>,
    /// State issued at initiate time
    pub state: String,
    /// Error code when the IdP refused
    pub error: Option<String>,
    /// Error detail when the IdP refused
    pub error_description: Option<String>,
}

/// SSO route handlers
pub struct SsoRoutes;

impl SsoRoutes {
    /// Create all SSO routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route("/sso/:org_id/initiate", post(Self::handle_initiate))
            .route("/sso/saml/acs", post(Self::handle_saml_acs))
            .route("/sso/oidc/callback", get(Self::handle_oidc_callback))
            .route("/sso/sessions/:session_id", delete(Self::handle_logout))
            .with_state(resources)
    }

    /// POST /sso/{org_id}/initiate
    async fn handle_initiate(
        State(resources): State<Arc<ServerResources>>,
        Path(org_id): Path<Uuid>,
        body: Option<Json<InitiateRequest>>,
    ) -> Result<Json<SsoRedirect>, SsoError> {
        let return_url = body.and_then(|Json(request)| request.return_url);
        let redirect = resources
            .sso
            .initiate_authentication(org_id, return_url)
            .await?;
        Ok(Json(redirect))
    }

    /// POST /sso/saml/acs
    async fn handle_saml_acs(
        State(resources): State<Arc<ServerResources>>,
        Form(form): Form<SamlAcsForm>,
    ) -> Result<Json<SsoLoginResult>, SsoError> {
        let result = resources
            .sso
            .handle_saml_callback(&form.saml_response, &form.relay_state)
            .await?;
        Ok(Json(result))
    }

    /// GET /sso/oidc/callback
    async fn handle_oidc_callback(
        State(resources): State<Arc<ServerResources>>,
        Query(query): Query<OidcCallbackQuery>,
    ) -> Result<Json<SsoLoginResult>, SsoError> {
        let result = resources
            .sso
            .handle_oidc_callback(
                query.code.as_deref(),
                &query.state,
                query.error.as_deref(),
                query.error_description.as_deref(),
            )
            .await?;
        Ok(Json(result))
    }

    /// DELETE /sso/sessions/{session_id}
    async fn handle_logout(
        State(resources): State<Arc<ServerResources>>,
        Path(session_id): Path<Uuid>,
    ) -> Result<Json<serde_json::Value>, SsoError> {
        resources.sso.logout(session_id).await?;
        Ok(Json(serde_json::json!({ "message": "Session ended" })))
    }
}
