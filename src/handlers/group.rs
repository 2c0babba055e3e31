//! 分组相关的 HTTP 处理器

use crate::{
    error::AppError,
    middleware::AppState,
    models::{auth::AuthUser, role::AssignRoleRequest, tenant::CreateGroupRequest},
};
use super::extract::{AppJson, AppPath};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

/// 创建分组，创建者成为该组 admin
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    AppJson(req): AppJson<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group = state.group_service.create_group(&auth_user, req).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group(
    State(state): State<Arc<AppState>>,
    AppPath(group_id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    let group = state.group_service.get_group(group_id).await?;
    Ok(Json(group))
}

/// 给组成员分配角色
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    AppPath(group_id): AppPath<i64>,
    AppJson(req): AppJson<AssignRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let member = state
        .group_service
        .add_member(group_id, &auth_user, req)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}
