//! 应用状态与 HTTP 中间件
//! 请求追踪

use crate::{
    auth::TokenCodec,
    config::AppConfig,
    error::AppError,
    pipeline::Pipelines,
    repository::IdentityStore,
    services::{
        AuthorizationResolver, GroupService, PolicyCache, TenantService, TokenService, UserService,
    },
};
use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn IdentityStore>,
    pub codec: Arc<TokenCodec>,
    pub pipelines: Pipelines,
    pub token_service: Arc<TokenService>,
    pub user_service: Arc<UserService>,
    pub group_service: Arc<GroupService>,
    pub tenant_service: Arc<TenantService>,
    pub policy_cache: Arc<PolicyCache>,
}

impl AppState {
    /// Wire every service on top of one identity store
    pub fn new(config: AppConfig, store: Arc<dyn IdentityStore>) -> Result<Self, AppError> {
        let codec = Arc::new(TokenCodec::from_config(&config.security)?);
        let resolver = Arc::new(AuthorizationResolver::new(store.clone()));
        let pipelines = Pipelines::new(codec.clone(), resolver);

        Ok(Self {
            token_service: Arc::new(TokenService::new(store.clone(), codec.clone())),
            user_service: Arc::new(UserService::new(store.clone())),
            group_service: Arc::new(GroupService::new(store.clone())),
            tenant_service: Arc::new(TenantService::new(store.clone())),
            policy_cache: Arc::new(PolicyCache::new(store.clone())),
            config,
            store,
            codec,
            pipelines,
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4().to_string();

    let method = req.method().clone();
    let uri = req.uri().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();

        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        // 记录指标 - 使用静态字符串
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "OPTIONS" => "OPTIONS",
            _ => "OTHER",
        };
        let status_class = match status {
            200..=299 => "2xx",
            400..=499 => "4xx",
            500..=599 => "5xx",
            _ => "other",
        };
        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_class)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            status = status,
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        // 在响应头中添加 trace_id
        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_or_generate_trace_id() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "test-trace-123".parse().unwrap());

        let trace_id = extract_or_generate_trace_id(&headers);
        assert_eq!(trace_id, "test-trace-123");

        let headers = HeaderMap::new();
        let trace_id = extract_or_generate_trace_id(&headers);
        assert!(!trace_id.is_empty());
        assert_ne!(trace_id, "test-trace-123");
    }
}
