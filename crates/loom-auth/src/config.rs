//! `security` configuration section

use crate::error::AuthError;
use crate::AuthResult;
use loom_core::ConfigStore;
use serde::{Deserialize, Serialize};

/// Main security configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Authenticator used when a request names none
    pub authenticator: Option<String>,
    pub hashing: HashingConfig,
    pub token: TokenConfig,
}

impl AuthConfig {
    /// Read the active `security` section, falling back to defaults.
    pub fn from_store(store: &ConfigStore) -> AuthResult<Self> {
        store
            .resolved_section("security")
            .map_err(|e| AuthError::config_error(e.to_string()))
    }
}

/// Password hashing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Handler used for new hashes (pbkdf2, argon2, bcrypt)
    pub default_handler: String,

    /// One of sha224, sha256, sha384, sha512
    pub pbkdf2_internal_algorithm: String,
    pub pbkdf2_rounds: u32,
    /// Salt length in bytes
    pub pbkdf2_salt_length: usize,

    /// Argon2 memory cost in KB
    pub argon2_memory: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,

    pub bcrypt_cost: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            default_handler: "pbkdf2".to_string(),
            pbkdf2_internal_algorithm: "sha512".to_string(),
            pbkdf2_rounds: 200_000,
            pbkdf2_salt_length: 16,
            argon2_memory: 65536, // 64 MB
            argon2_iterations: 3,
            argon2_parallelism: 4,
            bcrypt_cost: 12,
        }
    }
}

impl HashingConfig {
    /// Cheap parameters for tests and local development.
    pub fn development() -> Self {
        Self {
            pbkdf2_rounds: 1_000,
            argon2_memory: 4096, // 4 MB
            argon2_iterations: 2,
            argon2_parallelism: 2,
            bcrypt_cost: 4,
            ..Self::default()
        }
    }
}

/// Token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Secret key for HMAC signing
    pub secret: String,

    /// HS256, HS384 or HS512
    pub algorithm: String,

    /// Access token lifetime in seconds
    pub access_token_lifetime: i64,

    /// Refresh token lifetime in seconds
    pub refresh_token_lifetime: i64,

    pub issuer: Option<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithm: "HS256".to_string(),
            access_token_lifetime: 15 * 60,           // 15 minutes
            refresh_token_lifetime: 7 * 24 * 60 * 60, // 7 days
            issuer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.hashing.default_handler, "pbkdf2");
        assert_eq!(config.token.algorithm, "HS256");
        assert_eq!(config.token.access_token_lifetime, 900);
        assert!(config.authenticator.is_none());
    }

    #[test]
    fn test_from_store() {
        let store = ConfigStore::from_yaml_str(
            "security:\n  hashing:\n    default_handler: bcrypt\n    bcrypt_cost: 10\n  token:\n    secret: s3cret\n    issuer: loom\n",
        )
        .unwrap();
        let config = AuthConfig::from_store(&store).unwrap();
        assert_eq!(config.hashing.default_handler, "bcrypt");
        assert_eq!(config.hashing.bcrypt_cost, 10);
        assert_eq!(config.hashing.pbkdf2_salt_length, 16);
        assert_eq!(config.token.secret, "s3cret");
        assert_eq!(config.token.issuer.as_deref(), Some("loom"));
    }
}
