//! Operator-only HTTP handlers: tenants and the policy snapshot

use crate::{
    error::AppError,
    middleware::AppState,
    models::tenant::{AddServicePermissionRequest, CreateServiceRequest},
};
use super::extract::{AppJson, AppPath};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

pub async fn create_service(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateServiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let service = state.tenant_service.create_service(req).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn add_service_permission(
    State(state): State<Arc<AppState>>,
    AppPath(service_id): AppPath<i64>,
    AppJson(req): AppJson<AddServicePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let binding = state
        .tenant_service
        .add_permission(service_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(binding)))
}

/// 缓存的策略快照，未命中时回源
pub async fn list_policies(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state.policy_cache.snapshot_or_refresh().await?;
    Ok(Json(snapshot.as_ref().clone()))
}
