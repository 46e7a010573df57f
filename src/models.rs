// ABOUTME: Core data models shared across the identity platform modules
// ABOUTME: Defines principals, OAuth clients, and federated session records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! Core data structures for the multi-tenant identity platform.
//!
//! These types are intentionally persistence-agnostic; the `store` module
//! maps them to and from its backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account status for a principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Account is active and may authenticate
    Active,
    /// Account created but email not yet verified
    Pending,
    /// Account disabled by an administrator
    Suspended,
}

/// An authenticated principal (user or service account)
///
/// The `id` is immutable once issued; the core never mutates principals
/// beyond what JIT provisioning updates (display name, avatar, attributes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,
    /// Email address (unique per tenant)
    pub email: String,
    /// Bcrypt password hash; `None` for federated-only accounts
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    /// Display name
    pub display_name: Option<String>,
    /// Avatar URL, surfaced through the OIDC `profile` scope
    pub avatar_url: Option<String>,
    /// Whether the email address has been verified
    pub email_verified: bool,
    /// Platform-level super admin flag; short-circuits RBAC to allow-all
    pub is_super_admin: bool,
    /// Account status
    pub status: UserStatus,
    /// Owning organization (tenant), if any
    pub organization_id: Option<Uuid>,
    /// When the account was created
    pub created_at: DateTime<Utc>,
    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new active user with a password credential
    #[must_use]
    pub fn new(email: String, password_hash: String, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash: Some(password_hash),
            display_name,
            avatar_url: None,
            email_verified: false,
            is_super_admin: false,
            status: UserStatus::Active,
            organization_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a federated user without a local password, as provisioned by SSO
    #[must_use]
    pub fn new_federated(email: String, display_name: Option<String>, org_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash: None,
            display_name,
            avatar_url: None,
            // Federation implies the IdP already verified the address
            email_verified: true,
            is_super_admin: false,
            status: UserStatus::Active,
            organization_id: Some(org_id),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A registered third-party OAuth 2.0 client application
///
/// Created through the admin surface (external to this core); the
/// authorization server only reads these records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    /// Public client identifier
    pub client_id: String,
    /// Bcrypt hash of the client secret; `None` for public clients
    #[serde(skip_serializing)]
    pub client_secret_hash: Option<String>,
    /// Human-readable client name shown on consent screens
    pub name: String,
    /// Registered redirect URIs; callbacks must exact-match one (normalized)
    pub redirect_uris: Vec<String>,
    /// Confidential clients must authenticate with their secret
    pub is_confidential: bool,
    /// Disabled clients are rejected at authorize and token time
    pub is_active: bool,
    /// Space-separated scopes this client may request
    pub allowed_scopes: Option<String>,
    /// When the client was registered
    pub created_at: DateTime<Utc>,
    /// Last successful authorize or token exchange
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A federated-login session created after a successful SSO callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoSession {
    /// Session identifier
    pub session_id: Uuid,
    /// Authenticated user
    pub user_id: Uuid,
    /// Organization the session belongs to
    pub organization_id: Uuid,
    /// Identity provider that authenticated the user (e.g. "okta", "azure_ad")
    pub provider: String,
    /// Protocol used ("saml2" or "oidc")
    pub protocol: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session expires; each session is invalidated independently
    pub expires_at: DateTime<Utc>,
}

/// A login event recorded for risk signals and audit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    /// Event id
    pub id: Uuid,
    /// User the event belongs to
    pub user_id: Uuid,
    /// Source IP, when known
    pub ip_address: Option<String>,
    /// User agent string, when known
    pub user_agent: Option<String>,
    /// Whether the attempt succeeded
    pub success: bool,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl LoginEvent {
    /// Record a login attempt outcome
    #[must_use]
    pub fn new(user_id: Uuid, ip_address: Option<String>, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            ip_address,
            user_agent: None,
            success,
            created_at: Utc::now(),
        }
    }
}

/// Stored trust profile for a known device fingerprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Owning user
    pub user_id: Uuid,
    /// Opaque device fingerprint supplied by the client
    pub fingerprint: String,
    /// Trust score in [0,1]; higher is more trusted
    pub trust_score: f64,
    /// When the device was first seen
    pub first_seen_at: DateTime<Utc>,
    /// When the device was last seen
    pub last_seen_at: DateTime<Utc>,
}

impl DeviceProfile {
    /// Device risk derived from stored trust: an untrusted device scores high
    #[must_use]
    pub fn risk(&self) -> f64 {
        (1.0 - self.trust_score).clamp(0.0, 1.0)
    }
}
