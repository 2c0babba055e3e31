//! Authentication-related models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity resolved by the interception pipeline, readable by handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthUser {
    pub user_id: i64,
    pub user_uuid: Uuid,
    pub service_id: Option<i64>,
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Issued token pair
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub token: String,
    pub refresh_token: String,
}
