//! Password hashing and verification using Argon2id

use crate::error::AppError;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

/// Password hasher
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Create hasher with OWASP recommended parameters
    pub fn new() -> Self {
        // m=19MiB, t=2 iterations, p=1 lane
        let params = Params::new(19 * 1024, 2, 1, None).unwrap_or_default();

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        Self { argon2 }
    }

    /// Hash a password
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!("Failed to hash password: {:?}", e);
                AppError::Internal(format!("Failed to hash password: {}", e))
            })?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a hash
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), AppError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::debug!("Failed to parse password hash: {:?}", e);
            AppError::Internal(format!("Failed to parse password hash: {}", e))
        })?;

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AppError::Unauthorized)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new();
        let password = "TestPassword123!";

        let hash = hasher.hash(password).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        hasher.verify(password, &hash).unwrap();
    }

    #[test]
    fn test_verify_fails_with_wrong_password() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("TestPassword123!").unwrap();

        assert!(matches!(
            hasher.verify("WrongPassword", &hash),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_same_password_different_salts() {
        let hasher = PasswordHasher::new();
        let a = hasher.hash("TestPassword123!").unwrap();
        let b = hasher.hash("TestPassword123!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_internal() {
        let hasher = PasswordHasher::new();
        assert!(matches!(
            hasher.verify("anything", "not-a-phc-string"),
            Err(AppError::Internal(_))
        ));
    }
}
