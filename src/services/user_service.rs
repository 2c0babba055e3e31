//! 用户服务：注册、当前用户、修改密码

use super::authorization::gate;
use crate::{
    auth::PasswordHasher,
    error::{AppError, StoreError},
    models::{
        auth::AuthUser,
        user::{ChangePasswordRequest, CreateUserRequest, NewUser, User},
    },
    repository::IdentityStore,
};
use std::sync::Arc;
use validator::Validate;

pub struct UserService {
    store: Arc<dyn IdentityStore>,
    hasher: PasswordHasher,
}

impl UserService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self {
            store,
            hasher: PasswordHasher::new(),
        }
    }

    /// 注册新用户
    pub async fn register(&self, req: CreateUserRequest) -> Result<User, AppError> {
        req.validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let password_hash = self.hasher.hash(&req.password)?;

        let user = self
            .store
            .save_user(NewUser {
                username: req.username,
                email: req.email,
                password_hash,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AppError::Conflict("User already exists".to_string()),
                other => other.into(),
            })?;

        tracing::info!(user_uuid = %user.uuid, "User registered");
        Ok(user)
    }

    /// The user the pipeline resolved for this request
    pub async fn current(&self, auth: &AuthUser) -> Result<User, AppError> {
        self.store
            .find_user_by_uuid(auth.user_uuid)
            .await
            .map_err(|e| gate(e, AppError::Unauthorized))
    }

    /// 修改密码（需要验证当前密码）
    pub async fn change_password(
        &self,
        auth: &AuthUser,
        req: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        req.validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let user = self.current(auth).await?;
        self.hasher.verify(&req.current_password, &user.password_hash)?;

        let password_hash = self.hasher.hash(&req.new_password)?;
        self.store
            .update_user_password(user.id, &password_hash)
            .await?;

        tracing::info!(user_uuid = %user.uuid, "Password changed");
        Ok(())
    }
}
