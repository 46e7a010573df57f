// ABOUTME: Small shared helpers used across modules
// ABOUTME: Wildcard pattern matching and UUID parsing utilities
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

/// Wildcard pattern matching shared by the RBAC and policy engines
pub mod pattern;
/// UUID parsing helpers
pub mod uuid;
