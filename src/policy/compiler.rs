// ABOUTME: Best-effort compilation of policy rules to a portable WASM module
// ABOUTME: Any toolchain failure yields None; callers always fall back to interpreted evaluation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! Optional compiled fast-path for high-throughput policy evaluation.
//!
//! Shells out to the `opa` toolchain to build a WASM module from a rule's
//! Rego source. The contract is fallback-never-fails: a missing binary, a
//! compile error, a timeout, or any IO failure returns `None`, and the
//! interpreted evaluator keeps serving decisions uninterrupted.

use crate::constants::limits::POLICY_COMPILE_TIMEOUT_SECS;
use crate::policy::PolicyRule;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

/// Compiler wrapper around the external `opa` binary
pub struct PolicyCompiler {
    binary: String,
    timeout: Duration,
}

impl Default for PolicyCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyCompiler {
    /// Compiler using the `opa` binary from PATH
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "opa".into(),
            timeout: Duration::from_secs(POLICY_COMPILE_TIMEOUT_SECS),
        }
    }

    /// Override the toolchain binary (used by tests)
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Compile a rule's Rego source to a WASM module
    ///
    /// Returns `None` when the rule carries no Rego source or when the
    /// toolchain is unavailable, fails, or times out. Never an error.
    pub async fn compile_to_wasm(&self, policy: &PolicyRule) -> Option<Vec<u8>> {
        let rego = policy.rego_code.as_deref()?;

        let workdir = std::env::temp_dir().join(format!("janua-policy-{}", Uuid::new_v4()));
        let result = self.compile_in_dir(&workdir, &policy.name, rego).await;

        if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
            tracing::debug!("Failed to clean up policy compile dir: {e}");
        }

        result
    }

    async fn compile_in_dir(&self, workdir: &PathBuf, name: &str, rego: &str) -> Option<Vec<u8>> {
        if let Err(e) = tokio::fs::create_dir_all(workdir).await {
            tracing::debug!(policy = name, "Policy compile setup failed: {e}");
            return None;
        }

        let source_path = workdir.join("policy.rego");
        let bundle_path = workdir.join("bundle.tar.gz");

        if let Err(e) = tokio::fs::write(&source_path, rego).await {
            tracing::debug!(policy = name, "Failed to write Rego source: {e}");
            return None;
        }

        let run = Command::new(&self.binary)
            .arg("build")
            .arg("-t")
            .arg("wasm")
            .arg("-e")
            .arg("policy/allow")
            .arg("-o")
            .arg(&bundle_path)
            .arg(&source_path)
            .output();

        let output = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                // Missing binary lands here (NotFound)
                tracing::debug!(policy = name, "Policy compiler unavailable: {e}");
                return None;
            }
            Err(_) => {
                tracing::warn!(policy = name, "Policy compilation timed out");
                return None;
            }
        };

        if !output.status.success() {
            tracing::debug!(
                policy = name,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Policy compilation failed"
            );
            return None;
        }

        match tokio::fs::read(&bundle_path).await {
            Ok(bytes) => {
                tracing::info!(policy = name, size = bytes.len(), "Policy compiled to WASM");
                Some(bytes)
            }
            Err(e) => {
                tracing::debug!(policy = name, "Failed to read compiled bundle: {e}");
                None
            }
        }
    }
}
