//! Tenant secret and refresh token generation

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

const SERVICE_KEY_PREFIX: &str = "authz_sk_";

/// Random secret generator
pub struct ApiKeyGenerator;

impl ApiKeyGenerator {
    fn random(len: usize) -> String {
        thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    /// Generate a service api key (the tenant's Client-Secret)
    /// Format: authz_sk_<32-char-random>
    pub fn generate_service_key() -> String {
        format!("{}{}", SERVICE_KEY_PREFIX, Self::random(32))
    }

    /// Generate an opaque refresh token
    pub fn generate_refresh_token() -> String {
        Self::random(48)
    }

    /// Hash a secret for storage using SHA-256
    pub fn hash(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_service_key() {
        let key = ApiKeyGenerator::generate_service_key();
        assert!(key.starts_with("authz_sk_"));
        assert_eq!(key.len(), 41); // "authz_sk_" (9 chars) + 32 chars
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let a = ApiKeyGenerator::generate_refresh_token();
        let b = ApiKeyGenerator::generate_refresh_token();
        assert_eq!(a.len(), 48);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let key = "test_key_123456789012345678901234567890";
        assert_eq!(ApiKeyGenerator::hash(key), ApiKeyGenerator::hash(key));
        assert_ne!(ApiKeyGenerator::hash(key), ApiKeyGenerator::hash("other"));
    }

    #[test]
    fn test_hash_length() {
        // SHA-256 produces 64 hex characters
        assert_eq!(ApiKeyGenerator::hash("test_key").len(), 64);
    }
}
