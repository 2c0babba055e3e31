//! 令牌相关的 HTTP 处理器

use crate::{
    error::AppError,
    middleware::AppState,
    models::auth::{LoginRequest, RefreshTokenRequest},
    pipeline::OPERATOR_TYPE,
};
use super::extract::{AppJson, AppQuery};
use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl TokenQuery {
    fn is_operator(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|k| k.eq_ignore_ascii_case(OPERATOR_TYPE))
    }
}

/// 登录并签发令牌
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<TokenQuery>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.token_service.login(req, query.is_operator()).await?;
    Ok(Json(response))
}

/// 刷新令牌
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<TokenQuery>,
    AppJson(req): AppJson<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state
        .token_service
        .refresh(req, query.is_operator())
        .await?;
    Ok(Json(response))
}
