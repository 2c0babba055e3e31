//! 用户相关的 HTTP 处理器

use crate::{
    error::AppError,
    middleware::AppState,
    models::{
        auth::AuthUser,
        user::{ChangePasswordRequest, CreateUserRequest, UserResponse},
    },
};
use super::extract::AppJson;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

/// 注册用户
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.user_service.register(req).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// 当前用户
pub async fn get_current_user(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state.user_service.current(&auth_user).await?;
    Ok(Json(json!({
        "user": UserResponse::from(user),
        "service_id": auth_user.service_id,
    })))
}

/// 修改密码
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.user_service.change_password(&auth_user, req).await?;
    Ok(Json(json!({ "message": "Password updated" })))
}
