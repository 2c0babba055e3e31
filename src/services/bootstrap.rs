//! 启动时初始化基础 RBAC 数据
//!
//! Check-then-seed: when the baseline is already present nothing is written.
//! Otherwise every record is created in order; a `Conflict` means the record
//! already exists and seeding continues, any other failure aborts startup.

use crate::{
    auth::PasswordHasher,
    config::BootstrapConfig,
    error::StoreError,
    models::{
        role::{
            Role, ADMIN_PERMISSION, ADMIN_ROLE, OPERATOR_ROLE, READ_PERMISSION, USER_ROLE,
            WRITE_PERMISSION,
        },
        user::{NewUser, User},
    },
    repository::{IdentityStore, StoreResult},
};
use secrecy::ExposeSecret;
use std::sync::Arc;
use thiserror::Error;

/// Fixed username of the seeded operator account
pub const OPERATOR_USERNAME: &str = "operator";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap step '{step}' failed: {source}")]
    Store {
        step: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("bootstrap password hashing failed: {0}")]
    Hash(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Baseline already present, nothing written
    Skipped,
    Seeded,
}

fn fatal(step: &'static str) -> impl FnOnce(StoreError) -> BootstrapError {
    move |source| BootstrapError::Store { step, source }
}

/// `Ok(None)` when the record already exists
fn tolerate_conflict<T>(step: &'static str, created: StoreResult<T>) -> Result<Option<T>, BootstrapError> {
    match created {
        Ok(record) => Ok(Some(record)),
        Err(StoreError::Conflict(detail)) => {
            tracing::debug!(step, detail = %detail, "Bootstrap record already exists");
            Ok(None)
        }
        Err(source) => Err(BootstrapError::Store { step, source }),
    }
}

/// `Ok(false)` when the record is absent
fn present<T>(step: &'static str, found: StoreResult<T>) -> Result<bool, BootstrapError> {
    match found {
        Ok(_) => Ok(true),
        Err(StoreError::NotFound) => Ok(false),
        Err(source) => Err(BootstrapError::Store { step, source }),
    }
}

pub struct BootstrapSeeder {
    store: Arc<dyn IdentityStore>,
    config: BootstrapConfig,
}

impl BootstrapSeeder {
    pub fn new(store: Arc<dyn IdentityStore>, config: BootstrapConfig) -> Self {
        Self { store, config }
    }

    /// operator role, admin role, admin permission and at least one operator policy
    pub async fn is_seeded(&self) -> Result<bool, BootstrapError> {
        let store = &self.store;

        if !present("check operator role", store.find_role_by_name(OPERATOR_ROLE).await)? {
            return Ok(false);
        }
        if !present("check admin role", store.find_role_by_name(ADMIN_ROLE).await)? {
            return Ok(false);
        }
        if !present(
            "check admin permission",
            store.find_permission_by_name(ADMIN_PERMISSION).await,
        )? {
            return Ok(false);
        }

        let policies = store
            .list_operator_policies()
            .await
            .map_err(fatal("check operator policies"))?;
        Ok(!policies.is_empty())
    }

    pub async fn run(&self) -> Result<SeedOutcome, BootstrapError> {
        if self.is_seeded().await? {
            tracing::info!("Baseline RBAC state present, skipping bootstrap");
            return Ok(SeedOutcome::Skipped);
        }

        self.seed().await?;
        Ok(SeedOutcome::Seeded)
    }

    /// Create every baseline record, treating existing ones as success
    pub async fn seed(&self) -> Result<(), BootstrapError> {
        tracing::info!("Seeding baseline RBAC state");

        let operator = self.seed_operator_user().await?;

        let mut operator_role = None;
        for name in [OPERATOR_ROLE, ADMIN_ROLE, USER_ROLE] {
            let role = self.seed_role(name).await?;
            if name == OPERATOR_ROLE {
                operator_role = Some(role);
            }
        }
        let operator_role = operator_role.ok_or_else(|| BootstrapError::Store {
            step: "seed operator role",
            source: StoreError::NotFound,
        })?;

        for name in [ADMIN_PERMISSION, READ_PERMISSION, WRITE_PERMISSION] {
            tolerate_conflict("seed permission", self.store.save_permission(name).await)?;
        }

        tolerate_conflict(
            "seed operator policy",
            self.store
                .save_operator_policy(operator.uuid, operator_role.uuid)
                .await,
        )?;

        tracing::info!(operator_uuid = %operator.uuid, "Bootstrap complete");
        Ok(())
    }

    async fn seed_operator_user(&self) -> Result<User, BootstrapError> {
        let email = &self.config.operator_email;

        match self.store.find_user_by_email(email).await {
            Ok(user) => return Ok(user),
            Err(StoreError::NotFound) => {}
            Err(source) => {
                return Err(BootstrapError::Store {
                    step: "check operator user",
                    source,
                })
            }
        }

        let password_hash = PasswordHasher::new()
            .hash(self.config.operator_password.expose_secret())
            .map_err(|e| BootstrapError::Hash(e.to_string()))?;

        let created = self
            .store
            .save_user(NewUser {
                username: OPERATOR_USERNAME.to_string(),
                email: email.clone(),
                password_hash,
            })
            .await;

        match tolerate_conflict("seed operator user", created)? {
            Some(user) => Ok(user),
            None => self
                .store
                .find_user_by_email(email)
                .await
                .map_err(fatal("load operator user")),
        }
    }

    async fn seed_role(&self, name: &str) -> Result<Role, BootstrapError> {
        match tolerate_conflict("seed role", self.store.save_role(name).await)? {
            Some(role) => Ok(role),
            None => self
                .store
                .find_role_by_name(name)
                .await
                .map_err(fatal("load role")),
        }
    }
}
