// ABOUTME: Application constants and configuration defaults shared across modules
// ABOUTME: Centralizes TTLs, cache namespaces, protocol limits, and role tables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

/// Service identity constants
pub mod service_names {
    /// Canonical service name used as JWT issuer/audience default and log field
    pub const JANUA_SERVER: &str = "janua-server";
}

/// Token and session lifetime constants
pub mod limits {
    /// Authorization code lifetime (RFC 6749 recommends short-lived codes)
    pub const AUTH_CODE_TTL_SECS: u64 = 600;
    /// Access token lifetime in seconds
    pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 3600;
    /// Refresh token lifetime in days
    pub const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 30;
    /// ID token lifetime in seconds
    pub const ID_TOKEN_EXPIRY_SECS: i64 = 3600;
    /// SSO state lifetime, bounds the window between initiate and callback
    pub const SSO_STATE_TTL_SECS: u64 = 600;
    /// SSO session lifetime in hours
    pub const SSO_SESSION_EXPIRY_HOURS: i64 = 8;
    /// Timeout for IdP metadata and discovery fetches
    pub const METADATA_FETCH_TIMEOUT_SECS: u64 = 10;
    /// Timeout for the optional policy compile step
    pub const POLICY_COMPILE_TIMEOUT_SECS: u64 = 5;
    /// PKCE verifier/challenge length bounds (RFC 7636 section 4.1)
    pub const PKCE_MIN_LEN: usize = 43;
    /// PKCE verifier/challenge maximum length
    pub const PKCE_MAX_LEN: usize = 128;
}

/// Cache TTLs and key namespaces
pub mod cache {
    /// Default maximum entries for the in-memory cache backend
    pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;
    /// Default interval for the in-memory expired-entry sweep
    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
    /// Cached token-validation result TTL
    pub const TTL_TOKEN_VALIDATION_SECS: u64 = 300;
    /// Cached permission decision TTL
    pub const TTL_PERMISSION_SECS: u64 = 900;
    /// Cached role resolution TTL
    pub const TTL_ROLE_SECS: u64 = 900;
    /// Cached policy decision TTL
    pub const TTL_POLICY_EVAL_SECS: u64 = 300;

    /// Namespace prefix for single-use authorization codes
    pub const PREFIX_AUTH_CODE: &str = "oauth:code";
    /// Namespace prefix for token validation results
    pub const PREFIX_TOKEN_VALIDATION: &str = "token:validation";
    /// Namespace prefix for revoked token ids
    pub const PREFIX_TOKEN_BLACKLIST: &str = "token:blacklist";
    /// Namespace prefix for policy decisions
    pub const PREFIX_POLICY_EVAL: &str = "policy:eval";
    /// Namespace prefix for permission decisions
    pub const PREFIX_PERMISSION: &str = "perms";
    /// Namespace prefix for resolved organization roles
    pub const PREFIX_ROLE: &str = "rbac:role";
    /// Namespace prefix for pending SSO states
    pub const PREFIX_SSO_STATE: &str = "sso:state";
}

/// Role hierarchy and risk thresholds
pub mod access {
    /// Ordered role hierarchy; higher level outranks lower
    pub const ROLE_HIERARCHY: &[(&str, i8)] = &[
        ("super_admin", 4),
        ("owner", 3),
        ("admin", 2),
        ("member", 1),
        ("viewer", 0),
    ];

    /// Level assigned to roles absent from the hierarchy
    pub const UNKNOWN_ROLE_LEVEL: i8 = -1;

    /// Risk score below this is low
    pub const RISK_MEDIUM_THRESHOLD: f64 = 0.25;
    /// Risk score below this (and at least medium) is medium
    pub const RISK_HIGH_THRESHOLD: f64 = 0.5;
    /// Risk score below this (and at least high) is high; above is critical
    pub const RISK_CRITICAL_THRESHOLD: f64 = 0.75;
}

/// Time unit helpers
pub mod time_constants {
    /// Seconds in one hour
    pub const SECONDS_PER_HOUR: u32 = 3600;
    /// Seconds in one day
    pub const SECONDS_PER_DAY: u32 = 86_400;
}
