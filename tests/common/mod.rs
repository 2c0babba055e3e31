//! 测试公共模块
//! 提供测试辅助函数和测试工具

#![allow(dead_code)]

use authz_server::{
    config::{
        AppConfig, BootstrapConfig, DatabaseConfig, LoggingConfig, PolicyRefreshConfig,
        SecurityConfig, ServerConfig,
    },
    middleware::AppState,
    models::{
        role::NewRoleMember,
        tenant::Service,
        user::{CreateUserRequest, User},
    },
    repository::{IdentityStore, InMemoryIdentityStore},
    routes,
    services::BootstrapSeeder,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use secrecy::Secret;
use std::sync::Arc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test-secret-key-for-testing-only-min-32-chars";
pub const OPERATOR_EMAIL: &str = "operator@localhost";
pub const OPERATOR_PASSWORD: &str = "operator-password";
pub const CLIENT_SECRET: &str = "s3cret";
pub const PASSWORD: &str = "password123";

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            addr: "127.0.0.1:0".to_string(), // 使用随机端口
            graceful_shutdown_timeout_secs: 5,
        },
        database: DatabaseConfig {
            url: Secret::new("postgresql://localhost/authz_test".to_string()),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 5,
            idle_timeout_secs: 300,
            max_lifetime_secs: 1800,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            jwt_secret: Secret::new(JWT_SECRET.to_string()),
            token_ttl_secs: 3600,
            enforce_token_expiry: true,
        },
        bootstrap: BootstrapConfig {
            operator_email: OPERATOR_EMAIL.to_string(),
            operator_password: Secret::new(OPERATOR_PASSWORD.to_string()),
        },
        policy_refresh: PolicyRefreshConfig { interval_secs: 60 },
    }
}

/// Seeded in-memory application with one tenant whose secret is [`CLIENT_SECRET`]
pub struct TestApp {
    pub store: Arc<InMemoryIdentityStore>,
    pub state: Arc<AppState>,
    pub service: Service,
}

pub async fn spawn_app() -> TestApp {
    let config = create_test_config();
    let store = Arc::new(InMemoryIdentityStore::new());

    BootstrapSeeder::new(store.clone(), config.bootstrap.clone())
        .run()
        .await
        .expect("Failed to seed test store");

    let service = store
        .save_service("billing", CLIENT_SECRET)
        .await
        .expect("Failed to create test service");

    let state = Arc::new(AppState::new(config, store.clone()).expect("Failed to build state"));

    TestApp {
        store,
        state,
        service,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestApp {
    pub fn router(&self) -> Router {
        routes::create_router(self.state.clone())
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.router().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn register(&self, username: &str, email: &str) -> User {
        self.state
            .user_service
            .register(CreateUserRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap()
    }

    pub fn token_for(&self, user: &User) -> String {
        self.state.codec.issue(&user.username, user.uuid).unwrap()
    }

    pub async fn grant(&self, user: &User, role: &str, group_id: Option<i64>, service_id: Option<i64>) {
        let role = self.store.find_role_by_name(role).await.unwrap();
        self.store
            .save_role_member(NewRoleMember {
                user_id: user.id,
                role_id: role.id,
                group_id,
                service_id,
            })
            .await
            .unwrap();
    }
}

/// Request builder with JSON content type
pub fn json_request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
}

pub fn json_body(value: serde_json::Value) -> Body {
    Body::from(serde_json::to_vec(&value).unwrap())
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
