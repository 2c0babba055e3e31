//! Role, permission and assignment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Global operator role name
pub const OPERATOR_ROLE: &str = "operator";
/// Per-tenant admin role name
pub const ADMIN_ROLE: &str = "admin";
/// Per-tenant user role name
pub const USER_ROLE: &str = "user";

pub const ADMIN_PERMISSION: &str = "admin";
pub const READ_PERMISSION: &str = "read";
pub const WRITE_PERMISSION: &str = "write";

/// Role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Role {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Permission {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role member (user <-> role, optionally scoped to a group and/or service)
///
/// A `None` scope field matches every value of that dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoleMember {
    pub id: i64,
    pub user_id: i64,
    pub role_id: i64,
    pub group_id: Option<i64>,
    pub service_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a role member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRoleMember {
    pub user_id: i64,
    pub role_id: i64,
    pub group_id: Option<i64>,
    pub service_id: Option<i64>,
}

/// Role member joined with its role name
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RoleAssignment {
    #[sqlx(flatten)]
    pub member: RoleMember,
    pub role_name: String,
}

/// Operator policy: binds one operator-tier user to the operator role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OperatorPolicy {
    pub id: i64,
    pub user_uuid: Uuid,
    pub role_uuid: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Assign role request (group members endpoint)
#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub user_email: String,
    pub role_name: String,
}
