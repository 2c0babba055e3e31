//! 请求提取器
//! 将 axum 的提取失败统一转换为 `{code, message}` 错误响应

use crate::error::AppError;
use axum::{
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

pub const EMPTY_BODY: &str = "Request is empty.";
pub const NOT_JSON: &str = "Request is not json.";
pub const BAD_PATH: &str = "Path parameter is only integer";
pub const BAD_QUERY: &str = "Invalid query string";

/// JSON 请求体
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state).await.map_err(|e| {
            tracing::debug!(error = %e, "Failed to read request body");
            AppError::BadRequest(EMPTY_BODY.to_string())
        })?;

        if body.is_empty() {
            return Err(AppError::BadRequest(EMPTY_BODY.to_string()));
        }

        serde_json::from_slice(&body).map(AppJson).map_err(|e| {
            tracing::debug!(error = %e, "Request body did not deserialize");
            AppError::BadRequest(NOT_JSON.to_string())
        })
    }
}

/// 路径参数，本服务的路径参数都是整数 id
pub struct AppPath<T>(pub T);

impl<T, S> FromRequestParts<S> for AppPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Path::<T>::from_request_parts(parts, state)
            .await
            .map(|Path(value)| AppPath(value))
            .map_err(|e| {
                tracing::debug!(error = %e, "Path parameter rejected");
                AppError::BadRequest(BAD_PATH.to_string())
            })
    }
}

/// 查询参数
pub struct AppQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| AppQuery(value))
            .map_err(|e| {
                tracing::debug!(error = %e, "Query string rejected");
                AppError::BadRequest(BAD_QUERY.to_string())
            })
    }
}
