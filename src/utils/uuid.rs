// ABOUTME: UUID parsing helpers with contextual error messages
// ABOUTME: Used when converting JWT subjects and path parameters to typed IDs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use anyhow::{Context, Result};
use uuid::Uuid;

/// Parse a UUID string, attaching the offending value to the error
///
/// # Errors
///
/// Returns an error if the input is not a valid UUID
pub fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid UUID: {value}"))
}
