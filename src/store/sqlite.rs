// ABOUTME: SQLite identity store implementation with bootstrap schema
// ABOUTME: Persists records as key columns plus a JSON document column
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

//! SQLite-backed identity store.
//!
//! Columns cover exactly what queries filter on; the full record lives in a
//! JSON `data` column so the persisted shape follows the serde models.
//! Schema is bootstrapped with idempotent DDL at connect time (schema
//! migration tooling is an external concern).

use super::IdentityStore;
use crate::errors::{AppError, AppResult};
use crate::models::{DeviceProfile, LoginEvent, OAuthClient, SsoSession, User};
use crate::policy::PolicyRule;
use crate::rbac::RbacPolicy;
use crate::risk::AdaptivePolicy;
use crate::sso::provider::SsoProviderConfig;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_email ON users (email);

CREATE TABLE IF NOT EXISTS oauth_clients (
    client_id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS org_roles (
    user_id TEXT NOT NULL,
    org_id TEXT NOT NULL,
    role TEXT NOT NULL,
    PRIMARY KEY (user_id, org_id)
);

CREATE TABLE IF NOT EXISTS rbac_policies (
    id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rbac_policies_org ON rbac_policies (org_id);

CREATE TABLE IF NOT EXISTS policy_rules (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_policy_rules_tenant ON policy_rules (tenant_id);

CREATE TABLE IF NOT EXISTS sso_configs (
    org_id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sso_sessions (
    session_id TEXT PRIMARY KEY,
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS device_profiles (
    user_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (user_id, fingerprint)
);

CREATE TABLE IF NOT EXISTS ip_blacklist (
    ip TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS login_events (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    success INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_login_events_user ON login_events (user_id, created_at);

CREATE TABLE IF NOT EXISTS adaptive_policies (
    id TEXT PRIMARY KEY,
    org_id TEXT,
    is_active INTEGER NOT NULL,
    priority INTEGER NOT NULL,
    data TEXT NOT NULL
);
";

/// SQLite identity store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and bootstrap the schema
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or DDL fails
    pub async fn connect(url: &str) -> AppResult<Self> {
        // A :memory: database exists per-connection; the pool must not
        // fan out or each connection sees an empty schema
        let max_connections = if url.contains(":memory:") { 1 } else { 8 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| AppError::database(format!("Failed to connect to SQLite: {e}")))?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to bootstrap schema: {e}")))?;

        Ok(Self { pool })
    }

    fn db_err(e: sqlx::Error) -> AppError {
        AppError::database(e.to_string())
    }

    fn decode<T: for<'de> serde::Deserialize<'de>>(data: &str) -> AppResult<T> {
        serde_json::from_str(data).map_err(Into::into)
    }

    async fn fetch_data_row<T: for<'de> serde::Deserialize<'de>>(
        &self,
        query: &str,
        key: &str,
    ) -> AppResult<Option<T>> {
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(Self::db_err)?;
                Ok(Some(Self::decode(&data)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl IdentityStore for SqliteStore {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        self.fetch_data_row("SELECT data FROM users WHERE id = ?", &id.to_string())
            .await
    }

    async fn get_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.fetch_data_row(
            "SELECT data FROM users WHERE lower(email) = lower(?)",
            email,
        )
        .await
    }

    async fn create_user(&self, user: &User) -> AppResult<()> {
        sqlx::query("INSERT INTO users (id, email, data) VALUES (?, ?, ?)")
            .bind(user.id.to_string())
            .bind(&user.email)
            .bind(serde_json::to_string(user)?)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> AppResult<()> {
        sqlx::query("UPDATE users SET email = ?, data = ? WHERE id = ?")
            .bind(&user.email)
            .bind(serde_json::to_string(user)?)
            .bind(user.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn get_oauth_client(&self, client_id: &str) -> AppResult<Option<OAuthClient>> {
        self.fetch_data_row(
            "SELECT data FROM oauth_clients WHERE client_id = ?",
            client_id,
        )
        .await
    }

    async fn create_oauth_client(&self, client: &OAuthClient) -> AppResult<()> {
        sqlx::query("INSERT OR REPLACE INTO oauth_clients (client_id, data) VALUES (?, ?)")
            .bind(&client.client_id)
            .bind(serde_json::to_string(client)?)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn touch_oauth_client(&self, client_id: &str, when: DateTime<Utc>) -> AppResult<()> {
        if let Some(mut client) = self.get_oauth_client(client_id).await? {
            client.last_used_at = Some(when);
            sqlx::query("UPDATE oauth_clients SET data = ? WHERE client_id = ?")
                .bind(serde_json::to_string(&client)?)
                .bind(client_id)
                .execute(&self.pool)
                .await
                .map_err(Self::db_err)?;
        }
        Ok(())
    }

    async fn get_org_role(&self, user_id: Uuid, org_id: Uuid) -> AppResult<Option<String>> {
        let row = sqlx::query("SELECT role FROM org_roles WHERE user_id = ? AND org_id = ?")
            .bind(user_id.to_string())
            .bind(org_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;

        match row {
            Some(row) => Ok(Some(row.try_get("role").map_err(Self::db_err)?)),
            None => Ok(None),
        }
    }

    async fn set_org_role(&self, user_id: Uuid, org_id: Uuid, role: &str) -> AppResult<()> {
        sqlx::query("INSERT OR REPLACE INTO org_roles (user_id, org_id, role) VALUES (?, ?, ?)")
            .bind(user_id.to_string())
            .bind(org_id.to_string())
            .bind(role)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn list_rbac_policies(&self, org_id: Uuid) -> AppResult<Vec<RbacPolicy>> {
        let rows =
            sqlx::query("SELECT data FROM rbac_policies WHERE org_id = ? AND is_active = 1")
                .bind(org_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(Self::db_err)?;

        rows.iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(Self::db_err)?;
                Self::decode(&data)
            })
            .collect()
    }

    async fn create_rbac_policy(&self, policy: &RbacPolicy) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO rbac_policies (id, org_id, is_active, data) VALUES (?, ?, ?, ?)",
        )
        .bind(policy.id.to_string())
        .bind(policy.organization_id.to_string())
        .bind(i32::from(policy.is_active))
        .bind(serde_json::to_string(policy)?)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn delete_rbac_policy(&self, policy_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM rbac_policies WHERE id = ?")
            .bind(policy_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn list_policy_rules(&self, tenant_id: Uuid) -> AppResult<Vec<PolicyRule>> {
        let rows =
            sqlx::query("SELECT data FROM policy_rules WHERE tenant_id = ? AND is_active = 1")
                .bind(tenant_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(Self::db_err)?;

        rows.iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(Self::db_err)?;
                Self::decode(&data)
            })
            .collect()
    }

    async fn create_policy_rule(&self, rule: &PolicyRule) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO policy_rules (id, tenant_id, is_active, data) VALUES (?, ?, ?, ?)",
        )
        .bind(rule.id.to_string())
        .bind(rule.tenant_id.to_string())
        .bind(i32::from(rule.is_active))
        .bind(serde_json::to_string(rule)?)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn delete_policy_rule(&self, rule_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM policy_rules WHERE id = ?")
            .bind(rule_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn get_sso_config(&self, org_id: Uuid) -> AppResult<Option<SsoProviderConfig>> {
        self.fetch_data_row(
            "SELECT data FROM sso_configs WHERE org_id = ?",
            &org_id.to_string(),
        )
        .await
    }

    async fn upsert_sso_config(&self, config: &SsoProviderConfig) -> AppResult<()> {
        sqlx::query("INSERT OR REPLACE INTO sso_configs (org_id, data) VALUES (?, ?)")
            .bind(config.organization_id.to_string())
            .bind(serde_json::to_string(config)?)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn create_sso_session(&self, session: &SsoSession) -> AppResult<()> {
        sqlx::query("INSERT INTO sso_sessions (session_id, data) VALUES (?, ?)")
            .bind(session.session_id.to_string())
            .bind(serde_json::to_string(session)?)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn get_sso_session(&self, session_id: Uuid) -> AppResult<Option<SsoSession>> {
        self.fetch_data_row(
            "SELECT data FROM sso_sessions WHERE session_id = ?",
            &session_id.to_string(),
        )
        .await
    }

    async fn delete_sso_session(&self, session_id: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM sso_sessions WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn get_device_profile(
        &self,
        user_id: Uuid,
        fingerprint: &str,
    ) -> AppResult<Option<DeviceProfile>> {
        let row =
            sqlx::query("SELECT data FROM device_profiles WHERE user_id = ? AND fingerprint = ?")
                .bind(user_id.to_string())
                .bind(fingerprint)
                .fetch_optional(&self.pool)
                .await
                .map_err(Self::db_err)?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(Self::db_err)?;
                Ok(Some(Self::decode(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert_device_profile(&self, profile: &DeviceProfile) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO device_profiles (user_id, fingerprint, data) VALUES (?, ?, ?)",
        )
        .bind(profile.user_id.to_string())
        .bind(&profile.fingerprint)
        .bind(serde_json::to_string(profile)?)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn is_ip_blacklisted(&self, ip: &str) -> AppResult<bool> {
        let row = sqlx::query("SELECT ip FROM ip_blacklist WHERE ip = ?")
            .bind(ip)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(row.is_some())
    }

    async fn add_ip_to_blacklist(&self, ip: &str) -> AppResult<()> {
        sqlx::query("INSERT OR IGNORE INTO ip_blacklist (ip) VALUES (?)")
            .bind(ip)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    async fn record_login_event(&self, event: &LoginEvent) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO login_events (id, user_id, success, created_at, data) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.user_id.to_string())
        .bind(i32::from(event.success))
        .bind(event.created_at.to_rfc3339())
        .bind(serde_json::to_string(event)?)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    async fn count_failed_logins_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM login_events WHERE user_id = ? AND success = 0 AND created_at >= ?",
        )
        .bind(user_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(Self::db_err)?;

        row.try_get("count").map_err(Self::db_err)
    }

    async fn list_login_events(&self, user_id: Uuid, limit: i64) -> AppResult<Vec<LoginEvent>> {
        let rows = sqlx::query(
            "SELECT data FROM login_events WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err)?;

        rows.iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(Self::db_err)?;
                Self::decode(&data)
            })
            .collect()
    }

    async fn list_adaptive_policies(
        &self,
        org_id: Option<Uuid>,
    ) -> AppResult<Vec<AdaptivePolicy>> {
        let rows = match org_id {
            Some(org_id) => {
                sqlx::query(
                    "SELECT data FROM adaptive_policies WHERE is_active = 1 AND (org_id = ? OR org_id IS NULL) ORDER BY priority DESC",
                )
                .bind(org_id.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT data FROM adaptive_policies WHERE is_active = 1 ORDER BY priority DESC",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(Self::db_err)?;

        rows.iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(Self::db_err)?;
                Self::decode(&data)
            })
            .collect()
    }

    async fn create_adaptive_policy(&self, policy: &AdaptivePolicy) -> AppResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO adaptive_policies (id, org_id, is_active, priority, data) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(policy.id.to_string())
        .bind(policy.organization_id.map(|id| id.to_string()))
        .bind(i32::from(policy.is_active))
        .bind(policy.priority)
        .bind(serde_json::to_string(policy)?)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }
}
