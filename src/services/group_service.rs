//! 分组服务

use super::authorization::gate;
use crate::{
    error::{AppError, StoreError},
    models::{
        auth::AuthUser,
        role::{AssignRoleRequest, NewRoleMember, RoleMember, ADMIN_ROLE, USER_ROLE},
        tenant::{CreateGroupRequest, Group},
    },
    repository::IdentityStore,
};
use std::sync::Arc;
use validator::Validate;

pub struct GroupService {
    store: Arc<dyn IdentityStore>,
}

impl GroupService {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Create a group and make the creator its admin within the caller's service
    pub async fn create_group(
        &self,
        creator: &AuthUser,
        req: CreateGroupRequest,
    ) -> Result<Group, AppError> {
        req.validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let admin = self.store.find_role_by_name(ADMIN_ROLE).await.map_err(|e| {
            gate(e, AppError::Internal("baseline admin role missing".to_string()))
        })?;

        let group = self
            .store
            .save_group_with_admin(&req.name, creator.user_id, admin.id, creator.service_id)
            .await?;

        tracing::info!(group_id = group.id, user_uuid = %creator.user_uuid, "Group created");
        Ok(group)
    }

    pub async fn get_group(&self, group_id: i64) -> Result<Group, AppError> {
        Ok(self.store.find_group_by_id(group_id).await?)
    }

    /// Assign `admin` or `user` inside a group to the user with the given email
    pub async fn add_member(
        &self,
        group_id: i64,
        caller: &AuthUser,
        req: AssignRoleRequest,
    ) -> Result<RoleMember, AppError> {
        if req.role_name != ADMIN_ROLE && req.role_name != USER_ROLE {
            return Err(AppError::BadRequest(format!(
                "Role must be one of: {}, {}",
                ADMIN_ROLE, USER_ROLE
            )));
        }

        self.store.find_group_by_id(group_id).await?;
        let target = self.store.find_user_by_email(&req.user_email).await?;
        let role = self.store.find_role_by_name(&req.role_name).await?;

        let member = self
            .store
            .save_role_member(NewRoleMember {
                user_id: target.id,
                role_id: role.id,
                group_id: Some(group_id),
                service_id: caller.service_id,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AppError::Conflict("Role already assigned".to_string()),
                other => other.into(),
            })?;

        tracing::info!(
            group_id,
            user_uuid = %target.uuid,
            role = %req.role_name,
            "Group member assigned"
        );
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::user::NewUser,
        repository::InMemoryIdentityStore,
        services::{AuthorizationResolver, Scope},
    };

    async fn setup() -> (Arc<InMemoryIdentityStore>, AuthUser) {
        let store = Arc::new(InMemoryIdentityStore::new());
        store.save_role(ADMIN_ROLE).await.unwrap();
        store.save_role(USER_ROLE).await.unwrap();
        let service = store.save_service("billing", "s3cret").await.unwrap();
        let user = store
            .save_user(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let auth = AuthUser {
            user_id: user.id,
            user_uuid: user.uuid,
            service_id: Some(service.id),
        };
        (store, auth)
    }

    #[tokio::test]
    async fn test_creator_becomes_group_admin() {
        let (store, alice) = setup().await;
        let groups = GroupService::new(store.clone());
        let resolver = AuthorizationResolver::new(store);

        let group = groups
            .create_group(&alice, CreateGroupRequest { name: "ops".to_string() })
            .await
            .unwrap();

        let scope = Scope::group(group.id, alice.service_id);
        assert!(resolver.authorize(&alice, &["admin"], scope).await.is_ok());
        assert!(resolver
            .authorize(&alice, &["admin"], Scope::group(group.id + 100, alice.service_id))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_add_member() {
        let (store, alice) = setup().await;
        let groups = GroupService::new(store.clone());
        let group = groups
            .create_group(&alice, CreateGroupRequest { name: "ops".to_string() })
            .await
            .unwrap();
        store
            .save_user(NewUser {
                username: "bob".to_string(),
                email: "bob@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();

        let assign = || AssignRoleRequest {
            user_email: "bob@example.com".to_string(),
            role_name: "user".to_string(),
        };
        groups.add_member(group.id, &alice, assign()).await.unwrap();
        assert!(matches!(
            groups.add_member(group.id, &alice, assign()).await,
            Err(AppError::Conflict(_))
        ));

        let operator = AssignRoleRequest {
            user_email: "bob@example.com".to_string(),
            role_name: "operator".to_string(),
        };
        assert!(matches!(
            groups.add_member(group.id, &alice, operator).await,
            Err(AppError::BadRequest(_))
        ));

        assert!(matches!(
            groups.add_member(group.id + 100, &alice, assign()).await,
            Err(AppError::NotFound)
        ));
    }
}
