// ABOUTME: Just-in-time user provisioning boundary for federated logins
// ABOUTME: Creates or updates a local principal from a mapped IdP profile
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Janua Identity

use super::error::SsoError;
use super::mapping::MappedProfile;
use crate::models::User;
use crate::store::{IdentityStore, Store};
use chrono::Utc;
use uuid::Uuid;

/// User-provisioning collaborator consumed by the SSO orchestrator
#[async_trait::async_trait]
pub trait UserProvisioner: Send + Sync {
    /// Create or update a principal from a mapped profile
    ///
    /// # Errors
    ///
    /// Returns [`SsoError::Validation`] when the profile is unusable and
    /// [`SsoError::Provisioning`] when the downstream write fails
    async fn create_or_update(
        &self,
        profile: &MappedProfile,
        org_id: Uuid,
    ) -> Result<User, SsoError>;
}

/// Store-backed provisioner: the default collaborator implementation
pub struct StoreProvisioner {
    store: Store,
}

impl StoreProvisioner {
    /// Create a provisioner over the shared store
    #[must_use]
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn display_name(profile: &MappedProfile) -> Option<String> {
        profile.display_name.clone().or_else(|| {
            match (&profile.given_name, &profile.family_name) {
                (Some(given), Some(family)) => Some(format!("{given} {family}")),
                (Some(given), None) => Some(given.clone()),
                _ => None,
            }
        })
    }
}

#[async_trait::async_trait]
impl UserProvisioner for StoreProvisioner {
    async fn create_or_update(
        &self,
        profile: &MappedProfile,
        org_id: Uuid,
    ) -> Result<User, SsoError> {
        let Some(email) = profile.email.as_deref() else {
            return Err(SsoError::Validation(
                "IdP assertion is missing an email attribute".into(),
            ));
        };

        let existing = self
            .store
            .get_user_by_email(email)
            .await
            .map_err(|e| SsoError::Provisioning(format!("User lookup failed: {e}")))?;

        match existing {
            Some(mut user) => {
                // Refresh profile fields the IdP asserts; the id never changes
                if let Some(name) = Self::display_name(profile) {
                    user.display_name = Some(name);
                }
                if let Some(picture) = &profile.picture {
                    user.avatar_url = Some(picture.clone());
                }
                user.updated_at = Utc::now();

                self.store
                    .update_user(&user)
                    .await
                    .map_err(|e| SsoError::Provisioning(format!("User update failed: {e}")))?;

                tracing::debug!(user_id = %user.id, "JIT provisioning updated existing user");
                Ok(user)
            }
            None => {
                let mut user =
                    User::new_federated(email.to_owned(), Self::display_name(profile), org_id);
                user.avatar_url = profile.picture.clone();

                self.store
                    .create_user(&user)
                    .await
                    .map_err(|e| SsoError::Provisioning(format!("User creation failed: {e}")))?;

                tracing::info!(user_id = %user.id, "JIT provisioning created new user");
                Ok(user)
            }
        }
    }
}
