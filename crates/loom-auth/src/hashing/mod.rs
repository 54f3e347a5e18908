//! Password hashing handlers and the manager that dispatches between them.
//!
//! New hashes always use the configured default handler. Matching picks the
//! handler that recognizes the stored hash, so values hashed by a previous
//! default keep working after the default changes.

#[cfg(feature = "argon2")]
mod argon2;
#[cfg(feature = "bcrypt")]
mod bcrypt;
mod pbkdf2;

#[cfg(feature = "argon2")]
pub use self::argon2::Argon2Handler;
#[cfg(feature = "bcrypt")]
pub use self::bcrypt::BcryptHandler;
pub use self::pbkdf2::Pbkdf2Handler;

use crate::config::HashingConfig;
use crate::error::HashingError;
use std::collections::HashMap;
use std::sync::Arc;

/// A single hashing algorithm
pub trait HashingHandler: Send + Sync {
    /// Registration name, e.g. `pbkdf2`
    fn name(&self) -> &'static str;

    /// Hash `text` with a fresh salt.
    fn generate_hash(&self, text: &str) -> Result<String, HashingError>;

    /// Malformed hashes never match.
    fn is_match(&self, text: &str, full_hash: &str) -> bool;

    /// Whether `full_hash` was produced by this handler.
    fn recognizes(&self, full_hash: &str) -> bool;
}

pub struct HashingManager {
    handlers: HashMap<&'static str, Arc<dyn HashingHandler>>,
    default_handler: String,
}

impl HashingManager {
    /// Empty manager; handlers must be registered before use.
    pub fn new(default_handler: impl Into<String>) -> Self {
        Self {
            handlers: HashMap::new(),
            default_handler: default_handler.into(),
        }
    }

    /// Manager with every compiled-in handler registered.
    pub fn from_config(config: &HashingConfig) -> Result<Self, HashingError> {
        let mut manager = Self::new(config.default_handler.clone());
        manager.register(Arc::new(Pbkdf2Handler::from_config(config)), false)?;
        #[cfg(feature = "argon2")]
        manager.register(Arc::new(Argon2Handler::from_config(config)), false)?;
        #[cfg(feature = "bcrypt")]
        manager.register(Arc::new(BcryptHandler::from_config(config)), false)?;
        manager.handler(&config.default_handler)?;
        Ok(manager)
    }

    pub fn register(&mut self, handler: Arc<dyn HashingHandler>, replace: bool) -> Result<(), HashingError> {
        let name = handler.name();
        if self.handlers.contains_key(name) && !replace {
            return Err(HashingError::DuplicateHandler {
                name: name.to_string(),
            });
        }
        tracing::debug!(handler = name, replace, "registered hashing handler");
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn handler(&self, name: &str) -> Result<Arc<dyn HashingHandler>, HashingError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| HashingError::HandlerNotFound {
                name: name.to_string(),
            })
    }

    pub fn default_handler_name(&self) -> &str {
        &self.default_handler
    }

    /// Registered handler names in sorted order.
    pub fn handler_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn generate_hash(&self, text: &str) -> Result<String, HashingError> {
        self.handler(&self.default_handler)?.generate_hash(text)
    }

    pub fn generate_hash_with(&self, handler: &str, text: &str) -> Result<String, HashingError> {
        self.handler(handler)?.generate_hash(text)
    }

    /// Handler that produced `full_hash`.
    pub fn detect(&self, full_hash: &str) -> Result<Arc<dyn HashingHandler>, HashingError> {
        self.handlers
            .values()
            .find(|handler| handler.recognizes(full_hash))
            .cloned()
            .ok_or(HashingError::UnrecognizedHash)
    }

    pub fn is_match(&self, text: &str, full_hash: &str) -> bool {
        match self.detect(full_hash) {
            Ok(handler) => handler.is_match(text, full_hash),
            Err(_) => {
                tracing::debug!("hash value not recognized by any handler");
                false
            }
        }
    }

    /// Whether `full_hash` should be regenerated with the default handler.
    pub fn needs_rehash(&self, full_hash: &str) -> bool {
        match self.detect(full_hash) {
            Ok(handler) => handler.name() != self.default_handler,
            Err(_) => true,
        }
    }
}
