// ABOUTME: Configuration management modules
// ABOUTME: Environment-driven server configuration with typed sub-configs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

/// Environment-based configuration for production deployment
pub mod environment;
