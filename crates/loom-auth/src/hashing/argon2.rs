//! Argon2id hashing handler

use super::HashingHandler;
use crate::config::HashingConfig;
use crate::error::HashingError;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::thread_rng;

#[derive(Debug, Clone)]
pub struct Argon2Handler {
    memory_cost: u32,
    time_cost: u32,
    parallelism: u32,
}

impl Argon2Handler {
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
        }
    }

    pub fn from_config(config: &HashingConfig) -> Self {
        Self::new(
            config.argon2_memory,
            config.argon2_iterations,
            config.argon2_parallelism,
        )
    }

    fn argon2(&self) -> Result<Argon2<'static>, HashingError> {
        let params = Params::new(self.memory_cost, self.time_cost, self.parallelism, None)
            .map_err(|e| HashingError::backend(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl HashingHandler for Argon2Handler {
    fn name(&self) -> &'static str {
        "argon2"
    }

    fn generate_hash(&self, text: &str) -> Result<String, HashingError> {
        let salt = SaltString::generate(&mut thread_rng());
        let hash = self.argon2()?.hash_password(text.as_bytes(), &salt)?;
        Ok(hash.to_string())
    }

    /// Parameters are read from the stored hash, not from this handler.
    fn is_match(&self, text: &str, full_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(full_hash) else {
            return false;
        };
        match self.argon2() {
            Ok(argon2) => argon2.verify_password(text.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }

    fn recognizes(&self, full_hash: &str) -> bool {
        full_hash.starts_with("$argon2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argon2_round() {
        let handler = Argon2Handler::from_config(&HashingConfig::development());
        let hash = handler.generate_hash("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(handler.recognizes(&hash));
        assert!(handler.is_match("test_password_123", &hash));
        assert!(!handler.is_match("wrong_password", &hash));
        assert!(!handler.is_match("test_password_123", "$argon2id$garbage"));
    }
}
