//! Issued token bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const BEARER: &str = "Bearer";

/// Persisted record of an issued token.
///
/// `refresh_token` holds the SHA-256 of the opaque refresh token handed to
/// the client, never the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub id: i64,
    pub token_type: String,
    pub token: String,
    pub refresh_token: String,
    pub user_uuid: Uuid,
    pub superseded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewToken {
    pub token: String,
    pub refresh_token_hash: String,
    pub user_uuid: Uuid,
}
