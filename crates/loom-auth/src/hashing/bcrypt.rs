//! bcrypt hashing handler

use super::HashingHandler;
use crate::config::HashingConfig;
use crate::error::HashingError;

#[derive(Debug, Clone)]
pub struct BcryptHandler {
    cost: u32,
}

impl BcryptHandler {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn from_config(config: &HashingConfig) -> Self {
        Self::new(config.bcrypt_cost)
    }
}

impl HashingHandler for BcryptHandler {
    fn name(&self) -> &'static str {
        "bcrypt"
    }

    fn generate_hash(&self, text: &str) -> Result<String, HashingError> {
        Ok(bcrypt::hash(text, self.cost)?)
    }

    fn is_match(&self, text: &str, full_hash: &str) -> bool {
        bcrypt::verify(text, full_hash).unwrap_or(false)
    }

    fn recognizes(&self, full_hash: &str) -> bool {
        ["$2a$", "$2b$", "$2x$", "$2y$"]
            .iter()
            .any(|prefix| full_hash.starts_with(prefix))
    }
}
