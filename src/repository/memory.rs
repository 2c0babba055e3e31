//! In-memory identity store
//!
//! Enforces the same unique constraints as the SQL schema. Used by the test
//! suite and by `--in-memory` development runs.

use super::{IdentityStore, StoreResult};
use crate::{
    error::StoreError,
    models::{
        role::{NewRoleMember, OperatorPolicy, Permission, Role, RoleAssignment, RoleMember},
        tenant::{Group, Service, ServicePermission},
        token::{NewToken, Token, BEARER},
        user::{NewUser, User},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex, MutexGuard,
};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    services: Vec<Service>,
    service_permissions: Vec<ServicePermission>,
    groups: Vec<Group>,
    role_members: Vec<RoleMember>,
    operator_policies: Vec<OperatorPolicy>,
    tokens: Vec<Token>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct InMemoryIdentityStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    rejecting_writes: AtomicBool,
    writes: AtomicUsize,
}

fn found<T: Clone>(item: Option<&T>) -> StoreResult<T> {
    item.cloned().ok_or(StoreError::NotFound)
}

fn conflict(what: &str) -> StoreError {
    StoreError::Conflict(format!("duplicate {}", what))
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`StoreError::Internal`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every subsequent write fail with [`StoreError::Internal`] while reads keep working
    pub fn set_rejecting_writes(&self, rejecting: bool) {
        self.rejecting_writes.store(rejecting, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("store unavailable".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Internal("store lock poisoned".to_string()))
    }

    fn tables_mut(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        if self.rejecting_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Internal("store is read-only".to_string()));
        }
        self.tables()
    }

    fn wrote<T>(&self, value: T) -> StoreResult<T> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    /// Row counts as (roles, permissions, operator policies)
    pub fn baseline_counts(&self) -> StoreResult<(usize, usize, usize)> {
        let t = self.tables()?;
        Ok((t.roles.len(), t.permissions.len(), t.operator_policies.len()))
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn ping(&self) -> StoreResult<()> {
        self.tables().map(|_| ())
    }

    // ==================== Users ====================

    async fn find_user_by_username_and_uuid(
        &self,
        username: &str,
        uuid: Uuid,
    ) -> StoreResult<User> {
        let t = self.tables()?;
        found(t.users.iter().find(|u| u.username == username && u.uuid == uuid))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<User> {
        let t = self.tables()?;
        found(t.users.iter().find(|u| u.email == email))
    }

    async fn find_user_by_uuid(&self, uuid: Uuid) -> StoreResult<User> {
        let t = self.tables()?;
        found(t.users.iter().find(|u| u.uuid == uuid))
    }

    async fn save_user(&self, user: NewUser) -> StoreResult<User> {
        let mut t = self.tables_mut()?;
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(conflict("user email"));
        }
        let now = Utc::now();
        let user = User {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };
        t.users.push(user.clone());
        self.wrote(user)
    }

    async fn update_user_password(&self, user_id: i64, password_hash: &str) -> StoreResult<User> {
        let mut t = self.tables_mut()?;
        let user = t
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        let user = user.clone();
        self.wrote(user)
    }

    // ==================== Roles & permissions ====================

    async fn find_role_by_name(&self, name: &str) -> StoreResult<Role> {
        let t = self.tables()?;
        found(t.roles.iter().find(|r| r.name == name))
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        let t = self.tables()?;
        let mut roles = t.roles.clone();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn save_role(&self, name: &str) -> StoreResult<Role> {
        let mut t = self.tables_mut()?;
        if t.roles.iter().any(|r| r.name == name) {
            return Err(conflict("role name"));
        }
        let now = Utc::now();
        let role = Role {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.roles.push(role.clone());
        self.wrote(role)
    }

    async fn find_permission_by_name(&self, name: &str) -> StoreResult<Permission> {
        let t = self.tables()?;
        found(t.permissions.iter().find(|p| p.name == name))
    }

    async fn list_permissions(&self) -> StoreResult<Vec<Permission>> {
        let t = self.tables()?;
        let mut permissions = t.permissions.clone();
        permissions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(permissions)
    }

    async fn save_permission(&self, name: &str) -> StoreResult<Permission> {
        let mut t = self.tables_mut()?;
        if t.permissions.iter().any(|p| p.name == name) {
            return Err(conflict("permission name"));
        }
        let now = Utc::now();
        let permission = Permission {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.permissions.push(permission.clone());
        self.wrote(permission)
    }

    // ==================== Tenants ====================

    async fn find_service_by_api_key(&self, api_key: &str) -> StoreResult<Service> {
        let t = self.tables()?;
        found(t.services.iter().find(|s| s.api_key == api_key))
    }

    async fn find_service_by_id(&self, id: i64) -> StoreResult<Service> {
        let t = self.tables()?;
        found(t.services.iter().find(|s| s.id == id))
    }

    async fn save_service(&self, name: &str, api_key: &str) -> StoreResult<Service> {
        let mut t = self.tables_mut()?;
        if t.services.iter().any(|s| s.name == name || s.api_key == api_key) {
            return Err(conflict("service"));
        }
        let now = Utc::now();
        let service = Service {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            api_key: api_key.to_string(),
            created_at: now,
            updated_at: now,
        };
        t.services.push(service.clone());
        self.wrote(service)
    }

    async fn save_service_permission(
        &self,
        permission_id: i64,
        service_id: i64,
    ) -> StoreResult<ServicePermission> {
        let mut t = self.tables_mut()?;
        if t
            .service_permissions
            .iter()
            .any(|sp| sp.permission_id == permission_id && sp.service_id == service_id)
        {
            return Err(conflict("service permission"));
        }
        let now = Utc::now();
        let binding = ServicePermission {
            id: t.next_id(),
            permission_id,
            service_id,
            created_at: now,
            updated_at: now,
        };
        t.service_permissions.push(binding.clone());
        self.wrote(binding)
    }

    async fn find_group_by_id(&self, id: i64) -> StoreResult<Group> {
        let t = self.tables()?;
        found(t.groups.iter().find(|g| g.id == id))
    }

    async fn save_group_with_admin(
        &self,
        name: &str,
        user_id: i64,
        admin_role_id: i64,
        service_id: Option<i64>,
    ) -> StoreResult<Group> {
        let mut t = self.tables_mut()?;
        let now = Utc::now();
        let group = Group {
            id: t.next_id(),
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        let member = RoleMember {
            id: t.next_id(),
            user_id,
            role_id: admin_role_id,
            group_id: Some(group.id),
            service_id,
            created_at: now,
            updated_at: now,
        };
        t.groups.push(group.clone());
        t.role_members.push(member);
        self.wrote(group)
    }

    // ==================== Assignments ====================

    async fn find_role_members(
        &self,
        user_id: i64,
        group_id: Option<i64>,
        service_id: Option<i64>,
    ) -> StoreResult<Vec<RoleAssignment>> {
        let t = self.tables()?;
        let covers = |member: Option<i64>, requested: Option<i64>| match member {
            None => true,
            Some(value) => requested == Some(value),
        };

        let assignments = t
            .role_members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter(|m| covers(m.group_id, group_id) && covers(m.service_id, service_id))
            .filter_map(|m| {
                t.roles.iter().find(|r| r.id == m.role_id).map(|r| RoleAssignment {
                    member: m.clone(),
                    role_name: r.name.clone(),
                })
            })
            .collect();

        Ok(assignments)
    }

    async fn save_role_member(&self, member: NewRoleMember) -> StoreResult<RoleMember> {
        let mut t = self.tables_mut()?;
        if t.role_members.iter().any(|m| {
            m.user_id == member.user_id
                && m.role_id == member.role_id
                && m.group_id == member.group_id
                && m.service_id == member.service_id
        }) {
            return Err(conflict("role member"));
        }
        let now = Utc::now();
        let member = RoleMember {
            id: t.next_id(),
            user_id: member.user_id,
            role_id: member.role_id,
            group_id: member.group_id,
            service_id: member.service_id,
            created_at: now,
            updated_at: now,
        };
        t.role_members.push(member.clone());
        self.wrote(member)
    }

    async fn find_operator_policy(&self, user_uuid: Uuid) -> StoreResult<OperatorPolicy> {
        let t = self.tables()?;
        found(t.operator_policies.iter().find(|p| p.user_uuid == user_uuid))
    }

    async fn list_operator_policies(&self) -> StoreResult<Vec<OperatorPolicy>> {
        let t = self.tables()?;
        Ok(t.operator_policies.clone())
    }

    async fn save_operator_policy(
        &self,
        user_uuid: Uuid,
        role_uuid: Uuid,
    ) -> StoreResult<OperatorPolicy> {
        let mut t = self.tables_mut()?;
        if t
            .operator_policies
            .iter()
            .any(|p| p.user_uuid == user_uuid && p.role_uuid == role_uuid)
        {
            return Err(conflict("operator policy"));
        }
        let now = Utc::now();
        let policy = OperatorPolicy {
            id: t.next_id(),
            user_uuid,
            role_uuid,
            created_at: now,
            updated_at: now,
        };
        t.operator_policies.push(policy.clone());
        self.wrote(policy)
    }

    // ==================== Tokens ====================

    async fn save_token(&self, token: NewToken) -> StoreResult<Token> {
        let mut t = self.tables_mut()?;
        if t.tokens.iter().any(|r| r.refresh_token == token.refresh_token_hash) {
            return Err(conflict("refresh token"));
        }
        let now = Utc::now();
        let token = Token {
            id: t.next_id(),
            token_type: BEARER.to_string(),
            token: token.token,
            refresh_token: token.refresh_token_hash,
            user_uuid: token.user_uuid,
            superseded_at: None,
            created_at: now,
            updated_at: now,
        };
        t.tokens.push(token.clone());
        self.wrote(token)
    }

    async fn find_token_by_refresh_hash(&self, refresh_hash: &str) -> StoreResult<Token> {
        let t = self.tables()?;
        found(t.tokens.iter().find(|r| r.refresh_token == refresh_hash))
    }

    async fn supersede_token(&self, id: i64) -> StoreResult<()> {
        let mut t = self.tables_mut()?;
        let token = t
            .tokens
            .iter_mut()
            .find(|r| r.id == id && r.superseded_at.is_none())
            .ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        token.superseded_at = Some(now);
        token.updated_at = now;
        self.wrote(())
    }
}
