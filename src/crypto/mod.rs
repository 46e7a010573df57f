// ABOUTME: Cryptographic utilities for secret storage
// ABOUTME: Provides AES-256-GCM encryption for IdP credentials at rest
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

/// Secure random token generation
pub mod random;
/// Secret encryption at rest
pub mod secrets;
