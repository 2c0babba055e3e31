//! Signed bearer token codec (HS256)
//!
//! Tokens carry exactly three string claims: `username`, `user_uuid` and
//! `expires`. Decoding is purely cryptographic and structural; it never
//! touches the identity store.

use crate::{config::SecurityConfig, error::AppError};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub user_uuid: String,
    /// RFC 3339 timestamp
    pub expires: String,
}

/// Stateless token signer/verifier
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: TimeDelta,
    enforce_expiry: bool,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl_secs: u64, enforce_expiry: bool) -> Result<Self, AppError> {
        // Ensure secret is at least 32 bytes for HS256
        if secret.len() < 32 {
            return Err(AppError::Config("JWT secret too short (min 32 chars)".to_string()));
        }

        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| AppError::Config(format!("token ttl out of range: {}s", ttl_secs)))?;

        // `expires` is a custom string claim, so the registered `exp` check is off
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            enforce_expiry,
        })
    }

    /// Create codec from config
    pub fn from_config(config: &SecurityConfig) -> Result<Self, AppError> {
        Self::new(
            config.jwt_secret.expose_secret(),
            config.token_ttl_secs,
            config.enforce_token_expiry,
        )
    }

    /// Sign a token for `username` / `user_uuid`
    pub fn issue(&self, username: &str, user_uuid: Uuid) -> Result<String, AppError> {
        let expires = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal("token expiry overflows".to_string()))?;

        let claims = Claims {
            username: username.to_string(),
            user_uuid: user_uuid.to_string(),
            expires: expires.to_rfc3339(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to sign token: {:?}", e);
            AppError::Internal(format!("Failed to sign token: {}", e))
        })
    }

    /// Verify signature and claim shape. Never returns partial claims.
    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!("Token validation failed: {:?}", e);
                AppError::Unauthorized
            })?
            .claims;

        if self.enforce_expiry {
            let expires = DateTime::parse_from_rfc3339(&claims.expires).map_err(|_| {
                tracing::debug!(expires = %claims.expires, "Unparseable expires claim");
                AppError::Unauthorized
            })?;
            if expires < Utc::now() {
                tracing::debug!(expires = %claims.expires, "Token expired");
                return Err(AppError::Unauthorized);
            }
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test_secret_key_32_characters_long!";

    fn codec() -> TokenCodec {
        TokenCodec::new(SECRET, 3600, true).unwrap()
    }

    fn sign_raw(value: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &value,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn future() -> String {
        (Utc::now() + TimeDelta::hours(1)).to_rfc3339()
    }

    #[test]
    fn test_issue_and_decode_round_trip() {
        let codec = codec();
        let user_uuid = Uuid::new_v4();

        let token = codec.issue("alice", user_uuid).unwrap();
        let claims = codec.decode(&token).unwrap();

        assert_eq!(claims.username, "alice");
        assert_eq!(claims.user_uuid, user_uuid.to_string());
        assert!(DateTime::parse_from_rfc3339(&claims.expires).is_ok());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let codec = codec();
        let token = codec.issue("alice", Uuid::new_v4()).unwrap();

        for i in 0..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(codec.decode(&tampered).is_err(), "byte {} flip accepted", i);
        }
    }

    #[test]
    fn test_missing_claims_rejected() {
        let codec = codec();
        let uuid = Uuid::new_v4().to_string();

        let missing_username = sign_raw(json!({ "user_uuid": uuid, "expires": future() }));
        let missing_uuid = sign_raw(json!({ "username": "alice", "expires": future() }));
        let missing_expires = sign_raw(json!({ "username": "alice", "user_uuid": uuid }));

        assert!(codec.decode(&missing_username).is_err());
        assert!(codec.decode(&missing_uuid).is_err());
        assert!(codec.decode(&missing_expires).is_err());
    }

    #[test]
    fn test_mistyped_claim_rejected() {
        let codec = codec();
        let token = sign_raw(json!({
            "username": "alice",
            "user_uuid": Uuid::new_v4().to_string(),
            "expires": 1_900_000_000,
        }));

        assert!(codec.decode(&token).is_err());
    }

    #[test]
    fn test_complete_raw_token_accepted() {
        let codec = codec();
        let token = sign_raw(json!({
            "username": "alice",
            "user_uuid": Uuid::new_v4().to_string(),
            "expires": future(),
        }));

        assert!(codec.decode(&token).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = TokenCodec::new("another_secret_key_32_characters_long", 3600, true).unwrap();
        let token = other.issue("alice", Uuid::new_v4()).unwrap();

        assert!(codec().decode(&token).is_err());
    }

    #[test]
    fn test_expired_token_depends_on_enforcement() {
        let token = sign_raw(json!({
            "username": "alice",
            "user_uuid": Uuid::new_v4().to_string(),
            "expires": (Utc::now() - TimeDelta::hours(1)).to_rfc3339(),
        }));

        assert!(codec().decode(&token).is_err());

        let lenient = TokenCodec::new(SECRET, 3600, false).unwrap();
        assert!(lenient.decode(&token).is_ok());
    }

    #[test]
    fn test_invalid_token_fails() {
        assert!(codec().decode("invalid_token").is_err());
        assert!(codec().decode("").is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(TokenCodec::new("short", 3600, true).is_err());
    }

    #[test]
    fn test_huge_ttl_is_an_error_not_a_panic() {
        assert!(matches!(
            TokenCodec::new(SECRET, u64::MAX, true),
            Err(AppError::Config(_))
        ));

        // in range for TimeDelta but past the last representable date
        let far = TokenCodec::new(SECRET, i64::MAX as u64 / 1000, true).unwrap();
        assert!(matches!(
            far.issue("alice", Uuid::new_v4()),
            Err(AppError::Internal(_))
        ));
    }
}
