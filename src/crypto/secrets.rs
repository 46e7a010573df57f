// ABOUTME: AES-256-GCM encryption for secrets stored at rest
// ABOUTME: Used for IdP client secrets and SAML signing keys; decryption happens only in the SSO module
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! Secret encryption at rest.
//!
//! Ciphertexts are `base64(nonce || aes-256-gcm ciphertext)`; every
//! encryption draws a fresh 96-bit nonce from the system RNG.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroize;

/// Nonce size for AES-GCM (96 bits)
const NONCE_LEN: usize = 12;

/// Symmetric cipher for secrets stored at rest
pub struct SecretCipher {
    key: [u8; 32],
}

impl SecretCipher {
    /// Create a cipher from a 32-byte key
    #[must_use]
    pub const fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Create a cipher from a base64-encoded key
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not valid base64 or not 32 bytes
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut decoded = general_purpose::STANDARD.decode(encoded)?;
        let key: [u8; 32] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| anyhow!("Secret encryption key must be exactly 32 bytes"))?;
        decoded.zeroize();
        Ok(Self::new(key))
    }

    /// Generate a fresh random key
    ///
    /// # Errors
    ///
    /// Returns an error if the system RNG fails - the server cannot store
    /// secrets securely without working RNG
    pub fn generate_key() -> Result<[u8; 32]> {
        let rng = SystemRandom::new();
        let mut key = [0u8; 32];
        rng.fill(&mut key).map_err(|e| {
            tracing::error!("CRITICAL: SystemRandom failed generating encryption key: {e}");
            anyhow!("System RNG failure - cannot generate secret encryption key")
        })?;
        Ok(key)
    }

    /// Encrypt a secret value
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG or cipher fails
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));

        let rng = SystemRandom::new();
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| anyhow!("System RNG failure - cannot generate nonce"))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow!("Encryption failed: {e}"))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(combined))
    }

    /// Decrypt a secret value produced by [`Self::encrypt`]
    ///
    /// # Errors
    ///
    /// Returns an error if the input is malformed or authentication fails
    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let combined = general_purpose::STANDARD.decode(encoded)?;
        if combined.len() < NONCE_LEN {
            return Err(anyhow!("Ciphertext too short"));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| anyhow!("Decryption failed: {e}"))?;

        String::from_utf8(plaintext).map_err(|e| anyhow!("Decrypted secret is not UTF-8: {e}"))
    }
}

impl Drop for SecretCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}
