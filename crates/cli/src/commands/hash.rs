use clap::Subcommand;
use loom_auth::{AuthConfig, HashingManager};
use loom_core::ConfigStore;

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum HashCommands {
    /// Hash a password with the configured or given handler
    Generate {
        text: String,

        /// Handler name (pbkdf2, argon2, bcrypt)
        #[arg(long)]
        handler: Option<String>,
    },

    /// Check a password against a hash
    Verify { text: String, hash: String },
}

/// Run a hashing command with the handlers of the `security` section.
pub fn run(store: &ConfigStore, command: &HashCommands) -> anyhow::Result<String> {
    let config = AuthConfig::from_store(store)?;
    let hashing = HashingManager::from_config(&config.hashing)?;

    match command {
        HashCommands::Generate { text, handler } => {
            let hash = match handler {
                Some(handler) => hashing.generate_hash_with(handler, text)?,
                None => hashing.generate_hash(text)?,
            };
            Ok(hash)
        }
        HashCommands::Verify { text, hash } => {
            if !hashing.is_match(text, hash) {
                anyhow::bail!("password does not match");
            }
            let mut message = "password matches".to_string();
            if hashing.needs_rehash(hash) {
                message.push_str(", hash should be regenerated");
            }
            Ok(message)
        }
    }
}
