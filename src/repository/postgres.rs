//! PostgreSQL identity store (数据库访问层)

use super::{IdentityStore, StoreResult};
use crate::{
    config::DatabaseConfig,
    error::StoreError,
    models::{
        role::{NewRoleMember, OperatorPolicy, Permission, Role, RoleAssignment, RoleMember},
        tenant::{Group, Service, ServicePermission},
        token::{NewToken, Token, BEARER},
        user::{NewUser, User},
    },
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

pub struct PgIdentityStore {
    db: PgPool,
}

impl PgIdentityStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 按配置建立连接池
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(config.url.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Identity store connection failed");
                StoreError::Internal(format!("connect: {}", e))
            })?;

        tracing::info!(
            max_connections = config.max_connections,
            "Identity store pool ready"
        );
        Ok(Self::new(db))
    }

    /// Apply the identity schema migrations
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Identity schema migration failed");
                StoreError::Internal(format!("migrate: {}", e))
            })?;

        tracing::info!("Identity schema up to date");
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    // ==================== Users ====================

    async fn find_user_by_username_and_uuid(
        &self,
        username: &str,
        uuid: Uuid,
    ) -> StoreResult<User> {
        let user =
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1 AND uuid = $2")
                .bind(username)
                .bind(uuid)
                .fetch_one(&self.db)
                .await?;

        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.db)
            .await?;

        Ok(user)
    }

    async fn find_user_by_uuid(&self, uuid: Uuid) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE uuid = $1")
            .bind(uuid)
            .fetch_one(&self.db)
            .await?;

        Ok(user)
    }

    async fn save_user(&self, user: NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (uuid, username, email, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&self.db)
        .await?;

        Ok(user)
    }

    async fn update_user_password(&self, user_id: i64, password_hash: &str) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(password_hash)
        .fetch_one(&self.db)
        .await?;

        Ok(user)
    }

    // ==================== Roles & permissions ====================

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Role> {
        let role = sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_one(&self.db)
            .await?;

        Ok(role)
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY name")
            .fetch_all(&self.db)
            .await?;

        Ok(roles)
    }

    async fn save_role(&self, name: &str) -> StoreResult<Role> {
        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (uuid, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        Ok(role)
    }

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Permission> {
        let permission =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE name = $1")
                .bind(name)
                .fetch_one(&self.db)
                .await?;

        Ok(permission)
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let permissions =
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY name")
                .fetch_all(&self.db)
                .await?;

        Ok(permissions)
    }

    async fn save_permission(&self, name: &str) -> StoreResult<Permission> {
        let permission = sqlx::query_as::<_, Permission>(
            "INSERT INTO permissions (uuid, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        Ok(permission)
    }

    // ==================== Tenants ====================

    async fn find_service_by_api_key(&self, api_key: &str) -> StoreResult<Service> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE api_key = $1")
            .bind(api_key)
            .fetch_one(&self.db)
            .await?;

        Ok(service)
    }

    async fn find_service_by_id(&self, id: i64) -> StoreResult<Service> {
        let service = sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
            .bind(id)
            .fetch_one(&self.db)
            .await?;

        Ok(service)
    }

    async fn save_service(&self, name: &str, api_key: &str) -> StoreResult<Service> {
        let service = sqlx::query_as::<_, Service>(
            "INSERT INTO services (uuid, name, api_key) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(api_key)
        .fetch_one(&self.db)
        .await?;

        Ok(service)
    }

    async fn save_service_permission(
        &self,
        permission_id: i64,
        service_id: i64,
    ) -> StoreResult<ServicePermission> {
        let binding = sqlx::query_as::<_, ServicePermission>(
            r#"
            INSERT INTO service_permissions (permission_id, service_id)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(permission_id)
        .bind(service_id)
        .fetch_one(&self.db)
        .await?;

        Ok(binding)
    }

    async fn find_group_by_id(&self, id: i64) -> StoreResult<Group> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_one(&self.db)
            .await?;

        Ok(group)
    }

    async fn save_group_with_admin(
        &self,
        name: &str,
        user_id: i64,
        admin_role_id: i64,
        service_id: Option<i64>,
    ) -> StoreResult<Group> {
        let mut tx = self.db.begin().await?;

        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO groups (uuid, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO role_members (user_id, role_id, group_id, service_id)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(admin_role_id)
        .bind(group.id)
        .bind(service_id)
        .execute(&mut *tx)
        .await?;

        // 未提交的事务在 drop 时回滚
        tx.commit().await?;

        Ok(group)
    }

    // ==================== Assignments ====================

    async fn find_role_members(
        &self,
        user_id: i64,
        group_id: Option<i64>,
        service_id: Option<i64>,
    ) -> StoreResult<Vec<RoleAssignment>> {
        // `col = NULL` is never true, so an unscoped request only sees unscoped members
        let assignments = sqlx::query_as::<_, RoleAssignment>(
            r#"
            SELECT
                rm.id,
                rm.user_id,
                rm.role_id,
                rm.group_id,
                rm.service_id,
                rm.created_at,
                rm.updated_at,
                r.name AS role_name
            FROM role_members rm
            JOIN roles r ON rm.role_id = r.id
            WHERE rm.user_id = $1
              AND (rm.group_id IS NULL OR rm.group_id = $2)
              AND (rm.service_id IS NULL OR rm.service_id = $3)
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .bind(service_id)
        .fetch_all(&self.db)
        .await?;

        Ok(assignments)
    }

    async fn save_role_member(&self, member: NewRoleMember) -> StoreResult<RoleMember> {
        let member = sqlx::query_as::<_, RoleMember>(
            r#"
            INSERT INTO role_members (user_id, role_id, group_id, service_id)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(member.user_id)
        .bind(member.role_id)
        .bind(member.group_id)
        .bind(member.service_id)
        .fetch_one(&self.db)
        .await?;

        Ok(member)
    }

    async fn find_operator_policy(&self, user_uuid: Uuid) -> StoreResult<OperatorPolicy> {
        let policy = sqlx::query_as::<_, OperatorPolicy>(
            "SELECT * FROM operator_policies WHERE user_uuid = $1 LIMIT 1",
        )
        .bind(user_uuid)
        .fetch_one(&self.db)
        .await?;

        Ok(policy)
    }

    async fn list_operator_policies(&self) -> StoreResult<Vec<OperatorPolicy>> {
        let policies =
            sqlx::query_as::<_, OperatorPolicy>("SELECT * FROM operator_policies ORDER BY id")
                .fetch_all(&self.db)
                .await?;

        Ok(policies)
    }

    async fn save_operator_policy(
        &self,
        user_uuid: Uuid,
        role_uuid: Uuid,
    ) -> StoreResult<OperatorPolicy> {
        let policy = sqlx::query_as::<_, OperatorPolicy>(
            "INSERT INTO operator_policies (user_uuid, role_uuid) VALUES ($1, $2) RETURNING *",
        )
        .bind(user_uuid)
        .bind(role_uuid)
        .fetch_one(&self.db)
        .await?;

        Ok(policy)
    }

    // ==================== Tokens ====================

    async fn save_token(&self, token: NewToken) -> StoreResult<Token> {
        let token = sqlx::query_as::<_, Token>(
            r#"
            INSERT INTO tokens (token_type, token, refresh_token, user_uuid)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(BEARER)
        .bind(&token.token)
        .bind(&token.refresh_token_hash)
        .bind(token.user_uuid)
        .fetch_one(&self.db)
        .await?;

        Ok(token)
    }

    async fn find_token_by_refresh_hash(&self, refresh_hash: &str) -> StoreResult<Token> {
        let token = sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE refresh_token = $1")
            .bind(refresh_hash)
            .fetch_one(&self.db)
            .await?;

        Ok(token)
    }

    async fn supersede_token(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE tokens SET superseded_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND superseded_at IS NULL",
        )
        .bind(id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}
