//! Authentication primitives: token codec, password hashing, key generation

pub mod api_key;
pub mod middleware;
pub mod password;
pub mod token;

pub use api_key::ApiKeyGenerator;
pub use middleware::{extract_token, intercept};
pub use password::PasswordHasher;
pub use token::{Claims, TokenCodec};
