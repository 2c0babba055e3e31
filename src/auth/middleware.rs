//! 拦截中间件：把管道接到 axum 路由上

use crate::{
    error::AppError,
    models::auth::AuthUser,
    pipeline::{InboundRequest, Pipeline, PipelineRun, ShortCircuit},
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthUser
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 从 Authorization 头提取令牌
pub fn extract_token(headers: &HeaderMap) -> Result<String, AppError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)
}

/// Run `pipeline` in front of the handler.
///
/// Headers the pipeline wrote are applied to every response, including
/// rejections and pre-flight answers.
pub async fn intercept(
    State(pipeline): State<Arc<Pipeline>>,
    req: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();
    let inbound = InboundRequest::from_parts(&mut parts).await;

    let PipelineRun { context, outcome } = pipeline.run(&inbound).await;

    let mut response = match outcome {
        Ok(()) => {
            let mut req = Request::from_parts(parts, body);
            // 附加到请求扩展
            if let Some(user) = context.auth_user.clone() {
                req.extensions_mut().insert(user);
            }
            next.run(req).await
        }
        Err(ShortCircuit::Preflight) => StatusCode::NO_CONTENT.into_response(),
        Err(ShortCircuit::Reject(err)) => err.into_response(),
    };

    let headers = response.headers_mut();
    for (name, value) in context.response_headers.iter() {
        headers.insert(name.clone(), value.clone());
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_token_valid() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer test_token_123".parse().unwrap());

        let token = extract_token(&headers).unwrap();
        assert_eq!(token, "test_token_123");
    }

    #[test]
    fn test_extract_token_missing() {
        let headers = HeaderMap::new();
        assert!(extract_token(&headers).is_err());
    }

    #[test]
    fn test_extract_token_invalid_format() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "InvalidFormat".parse().unwrap());
        assert!(extract_token(&headers).is_err());

        headers.insert("authorization", "Bearer ".parse().unwrap());
        assert!(extract_token(&headers).is_err());
    }
}
