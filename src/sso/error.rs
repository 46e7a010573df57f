// ABOUTME: SSO failure taxonomy with explicit kinds and HTTP mapping
// ABOUTME: Every federation failure surfaces as exactly one of these variants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// SSO failure kinds
///
/// Callers branch on the kind, never on message text. The kind also fixes
/// the HTTP status at the route boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SsoError {
    /// Assertion or response rejected
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// Missing or invalid IdP configuration
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Discovery/metadata fetch or parse failure
    #[error("metadata error: {0}")]
    Metadata(String),
    /// Signature or certificate validation failure
    #[error("certificate error: {0}")]
    Certificate(String),
    /// Downstream user creation or update failure
    #[error("provisioning error: {0}")]
    Provisioning(String),
    /// Malformed request
    #[error("validation error: {0}")]
    Validation(String),
}

impl SsoError {
    /// HTTP status this kind maps to at the route boundary
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) | Self::Certificate(_) => StatusCode::UNAUTHORIZED,
            Self::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Metadata(_) | Self::Provisioning(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable kind label used in error bodies and logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication_error",
            Self::Configuration(_) => "configuration_error",
            Self::Metadata(_) => "metadata_error",
            Self::Certificate(_) => "certificate_error",
            Self::Provisioning(_) => "provisioning_error",
            Self::Validation(_) => "validation_error",
        }
    }
}

impl IntoResponse for SsoError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.kind(),
            "error_description": self.to_string(),
        });
        (self.http_status(), Json(body)).into_response()
    }
}
