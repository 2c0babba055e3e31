//! Identity store: persistence contract consumed by the authorization core
//!
//! Every operation returns the record, [`StoreError::NotFound`],
//! [`StoreError::Conflict`] on a unique-constraint violation, or
//! [`StoreError::Internal`] on infrastructure failure.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryIdentityStore;
pub use postgres::PgIdentityStore;

use crate::{
    error::StoreError,
    models::{
        role::{NewRoleMember, OperatorPolicy, Permission, Role, RoleAssignment, RoleMember},
        tenant::{Group, Service, ServicePermission},
        token::{NewToken, Token},
        user::{NewUser, User},
    },
};
use async_trait::async_trait;
use uuid::Uuid;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Liveness probe for readiness checks
    async fn ping(&self) -> StoreResult<()>;

    // ==================== Users ====================

    async fn find_user_by_username_and_uuid(&self, username: &str, uuid: Uuid)
        -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<User>;

    async fn find_user_by_uuid(&self, uuid: Uuid) -> StoreResult<User>;

    async fn save_user(&self, user: NewUser) -> StoreResult<User>;

    /// The only mutation path for `password_hash` after creation
    async fn update_user_password(&self, user_id: i64, password_hash: &str) -> StoreResult<User>;

    // ==================== Roles & permissions ====================

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Role>;

    async fn list_roles(&self) -> StoreResult<Vec<Role>>;

    async fn save_role(&self, name: &str) -> StoreResult<Role>;

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Permission>;

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>>;

    async fn save_permission(&self, name: &str) -> StoreResult<Permission>;

    // ==================== Tenants ====================

    async fn find_service_by_api_key(&self, api_key: &str) -> StoreResult<Service>;

    async fn find_service_by_id(&self, id: i64) -> StoreResult<Service>;

    async fn save_service(&self, name: &str, api_key: &str) -> StoreResult<Service>;

    async fn save_service_permission(
        &self,
        permission_id: i64,
        service_id: i64,
    ) -> StoreResult<ServicePermission>;

    async fn find_group_by_id(&self, id: i64) -> StoreResult<Group>;

    /// Create a group and its first admin membership. Both persist or neither does.
    async fn save_group_with_admin(
        &self,
        name: &str,
        user_id: i64,
        admin_role_id: i64,
        service_id: Option<i64>,
    ) -> StoreResult<Group>;

    // ==================== Assignments ====================

    /// Role members of `user_id` whose scope covers the requested group/service.
    ///
    /// A member's `None` scope field matches any requested value; a `Some`
    /// field must equal the requested value. An empty result is not an error.
    async fn find_role_members(
        &self,
        user_id: i64,
        group_id: Option<i64>,
        service_id: Option<i64>,
    ) -> StoreResult<Vec<RoleAssignment>>;

    async fn save_role_member(&self, member: NewRoleMember) -> StoreResult<RoleMember>;

    async fn find_operator_policy(&self, user_uuid: Uuid) -> StoreResult<OperatorPolicy>;

    async fn list_operator_policies(&self) -> StoreResult<Vec<OperatorPolicy>>;

    async fn save_operator_policy(&self, user_uuid: Uuid, role_uuid: Uuid)
        -> StoreResult<OperatorPolicy>;

    // ==================== Tokens ====================

    async fn save_token(&self, token: NewToken) -> StoreResult<Token>;

    async fn find_token_by_refresh_hash(&self, refresh_hash: &str) -> StoreResult<Token>;

    /// Mark a token record superseded. `NotFound` if it is missing or
    /// already superseded, so only one refresh can win.
    async fn supersede_token(&self, id: i64) -> StoreResult<()>;
}
