// ABOUTME: Main library entry point for the Janua identity platform server
// ABOUTME: Provides OAuth2/OIDC, SSO federation, RBAC, policy, and risk assessment engines
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

#![deny(unsafe_code)]

//! # Janua Identity Server
//!
//! A multi-tenant identity platform built around an access-control
//! decision core: an OAuth2/OIDC authorization server, SAML2/OIDC SSO
//! federation, a token service, and the RBAC / policy / risk engines that
//! answer "is this action allowed".
//!
//! ## Architecture
//!
//! - **Token Service** (`tokens`): signs, verifies, and revokes platform
//!   tokens; owns the revocation blacklist and validation cache
//! - **OAuth2 Provider** (`oauth2`): authorize/token/userinfo/introspect/
//!   revoke endpoints with PKCE and single-use authorization codes
//! - **SSO Orchestrator** (`sso`): federates external IdPs over SAML2 and
//!   OIDC, maps attributes, and JIT-provisions users
//! - **RBAC Engine** (`rbac`): role hierarchy plus static and dynamic
//!   permission evaluation
//! - **Policy Engine** (`policy`): rule evaluation over request tuples
//!   with deny-overrides aggregation
//! - **Risk Engine** (`risk`): scores request context into adaptive access
//!   decisions
//!
//! Shared infrastructure lives in `cache` (in-memory/Redis), `store`
//! (in-memory/SQLite), `crypto`, `config`, and `errors`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use janua_server::config::environment::ServerConfig;
//! use janua_server::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Janua server configured for port {}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Cache abstraction layer with pluggable backends
pub mod cache;

/// Configuration management
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Cryptographic utilities: secret encryption and secure randomness
pub mod crypto;

/// Unified error handling system with standard error codes
pub mod errors;

/// Logging configuration and structured output
pub mod logging;

/// Core data models
pub mod models;

/// OAuth2/OIDC authorization server
pub mod oauth2;

/// Policy decision engine
pub mod policy;

/// Role-based access control engine
pub mod rbac;

/// Shared server resources and dependency wiring
pub mod resources;

/// Risk assessment engine
pub mod risk;

/// HTTP routes
pub mod routes;

/// SSO orchestrator and protocol implementations
pub mod sso;

/// Identity store abstraction with pluggable backends
pub mod store;

/// Token service: JWT issuance, validation, and revocation
pub mod tokens;

/// Shared helpers
pub mod utils;
