// ABOUTME: Secure random token generation for codes, states, and nonces
// ABOUTME: URL-safe base64 over system RNG bytes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};

/// Generate a URL-safe random string from `length` bytes of system entropy
///
/// # Errors
///
/// Returns an error if the system RNG fails - this is a critical security
/// failure and the server cannot mint codes or states without working RNG
pub fn generate_random_string(length: usize) -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!("CRITICAL: SystemRandom failed - cannot generate secure random bytes: {e}");
        anyhow::anyhow!("System RNG failure - server cannot operate securely")
    })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}
