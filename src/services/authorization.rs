//! 权限判定服务
//!
//! Turns decoded claims into an [`AuthUser`] and decides allow/deny against a
//! required role set. Holds no cache; every decision reads the identity store.

use crate::{
    auth::Claims,
    error::{AppError, StoreError},
    models::auth::AuthUser,
    repository::IdentityStore,
};
use std::sync::Arc;
use uuid::Uuid;

/// Scope of a role lookup. `None` means the dimension is not requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scope {
    pub group_id: Option<i64>,
    pub service_id: Option<i64>,
}

impl Scope {
    pub fn group(group_id: i64, service_id: Option<i64>) -> Self {
        Self {
            group_id: Some(group_id),
            service_id,
        }
    }
}

pub struct AuthorizationResolver {
    store: Arc<dyn IdentityStore>,
}

/// Map a store failure on an access-gating lookup: absence denies, anything
/// else is an internal error.
pub(crate) fn gate(err: StoreError, absent: AppError) -> AppError {
    match err {
        StoreError::NotFound => absent,
        StoreError::Conflict(detail) | StoreError::Internal(detail) => {
            tracing::error!(detail = %detail, "Identity store failure during authorization");
            AppError::Internal(detail)
        }
    }
}

impl AuthorizationResolver {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Look up the user behind `claims`, and the tenant behind `client_secret` if given
    pub async fn resolve_identity(
        &self,
        claims: &Claims,
        client_secret: Option<&str>,
    ) -> Result<AuthUser, AppError> {
        let user_uuid = Uuid::parse_str(&claims.user_uuid).map_err(|_| AppError::Unauthorized)?;

        let user = self
            .store
            .find_user_by_username_and_uuid(&claims.username, user_uuid)
            .await
            .map_err(|e| gate(e, AppError::Unauthorized))?;

        if user.email.is_empty() {
            tracing::debug!(user_uuid = %user_uuid, "User record has no email");
            return Err(AppError::Unauthorized);
        }

        let service_id = match client_secret {
            Some(secret) => {
                let service = self
                    .store
                    .find_service_by_api_key(secret)
                    .await
                    .map_err(|e| gate(e, AppError::Unauthorized))?;
                Some(service.id)
            }
            None => None,
        };

        Ok(AuthUser {
            user_id: user.id,
            user_uuid: user.uuid,
            service_id,
        })
    }

    /// Allow if the user holds any of `required` within `scope`.
    /// An empty `required` set allows every authenticated user without a lookup.
    pub async fn authorize(
        &self,
        user: &AuthUser,
        required: &[&str],
        scope: Scope,
    ) -> Result<(), AppError> {
        if required.is_empty() {
            return Ok(());
        }

        let assignments = self
            .store
            .find_role_members(user.user_id, scope.group_id, scope.service_id)
            .await
            .map_err(|e| gate(e, AppError::Forbidden))?;

        if assignments
            .iter()
            .any(|a| required.contains(&a.role_name.as_str()))
        {
            return Ok(());
        }

        tracing::warn!(
            user_uuid = %user.user_uuid,
            required = ?required,
            group_id = ?scope.group_id,
            service_id = ?scope.service_id,
            "Permission denied"
        );
        Err(AppError::Forbidden)
    }

    /// Allow only users bound to the operator role by an operator policy
    pub async fn authorize_operator(&self, user: &AuthUser) -> Result<(), AppError> {
        self.store
            .find_operator_policy(user.user_uuid)
            .await
            .map(|_| ())
            .map_err(|e| {
                if e == StoreError::NotFound {
                    tracing::warn!(user_uuid = %user.user_uuid, "Operator policy missing");
                }
                gate(e, AppError::Forbidden)
            })
    }
}
