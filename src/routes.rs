//! 路由注册
//! 每组路由挂在对应的拦截管道上

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    auth::intercept,
    handlers,
    middleware::{request_tracking_middleware, AppState},
    pipeline::Pipeline,
};

/// 请求体上限
const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// Wrap every route of `router` (including its method fallbacks, so
/// pre-flight requests reach the pipeline) in `pipeline`.
fn guarded(router: Router<Arc<AppState>>, pipeline: &Arc<Pipeline>) -> Router<Arc<AppState>> {
    router.layer(from_fn_with_state(pipeline.clone(), intercept))
}

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    let pipelines = &state.pipelines;

    // 公开端点（健康检查）
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check));

    // 注册：只做头部检查
    let registration_routes = guarded(
        Router::new().route("/api/v1/users", post(handlers::user::create_user)),
        &pipelines.header_only,
    );

    // 令牌签发：需要 Client-Secret（operator 登录除外）
    let token_routes = guarded(
        Router::new()
            .route("/api/v1/tokens", post(handlers::auth::issue_token))
            .route("/api/v1/tokens/refresh", post(handlers::auth::refresh_token)),
        &pipelines.tenant_secret,
    );

    // 已认证用户
    let user_routes = guarded(
        Router::new()
            .route("/api/v1/users/me", get(handlers::user::get_current_user))
            .route("/api/v1/users/me/password", put(handlers::user::change_password))
            .route("/api/v1/groups", post(handlers::group::create_group)),
        &pipelines.authenticated_user,
    );

    // 组内 admin 或 user
    let group_read_routes = guarded(
        Router::new().route("/api/v1/groups/{group_id}", get(handlers::group::get_group)),
        &pipelines.group_user,
    );

    // 组内 admin
    let group_admin_routes = guarded(
        Router::new().route(
            "/api/v1/groups/{group_id}/members",
            post(handlers::group::add_member),
        ),
        &pipelines.group_admin,
    );

    // operator
    let operator_routes = guarded(
        Router::new()
            .route("/api/v1/services", post(handlers::operator::create_service))
            .route(
                "/api/v1/services/{service_id}/permissions",
                post(handlers::operator::add_service_permission),
            )
            .route("/api/v1/policies", get(handlers::operator::list_policies)),
        &pipelines.operator,
    );

    // 组合所有路由
    Router::new()
        .merge(public_routes)
        .merge(registration_routes)
        .merge(token_routes)
        .merge(user_routes)
        .merge(group_read_routes)
        .merge(group_admin_routes)
        .merge(operator_routes)
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_tracking_middleware))
        .with_state(state)
}
