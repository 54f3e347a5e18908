use crate::config::{ConfigError, ConfigStore};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Environment enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testing" | "test" => Ok(Environment::Testing),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue {
                field: "environment".to_string(),
                value: s.to_string(),
                expected: "development, testing, or production".to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_str = match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Production => "production",
        };
        write!(f, "{}", env_str)
    }
}

impl Environment {
    /// Check if environment is development
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }

    /// Check if environment is testing
    pub fn is_testing(&self) -> bool {
        matches!(self, Environment::Testing)
    }

    /// Check if environment is production
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Get debug mode status based on environment
    pub fn debug_mode(&self) -> bool {
        !self.is_production()
    }
}

fn default_name() -> String {
    "loom-app".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application level configuration, read from the `application` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self {
            name: default_name(),
            environment: Environment::Development,
            debug: true,
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            secret_key: None,
        }
    }

    /// Create configuration for testing
    pub fn testing() -> Self {
        Self {
            environment: Environment::Testing,
            port: 0,
            log_level: "warn".to_string(),
            secret_key: Some("test_secret_key".to_string()),
            ..Self::new()
        }
    }

    /// Read the `application` section of a store, falling back to defaults
    /// when the section is absent.
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        if !store.has_section("application") {
            return Ok(Self::new());
        }
        let config: Self = store.section("application")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Ok(env_str) = env::var("ENVIRONMENT") {
            config.environment = env_str.parse()?;
        }

        if let Ok(debug_str) = env::var("DEBUG") {
            config.debug = debug_str.parse().unwrap_or(config.environment.debug_mode());
        } else {
            config.debug = config.environment.debug_mode();
        }

        if let Ok(port_str) = env::var("PORT") {
            config.port = port_str.parse().map_err(|_| ConfigError::InvalidValue {
                field: "port".to_string(),
                value: port_str,
                expected: "valid port number (0-65535)".to_string(),
            })?;
        }

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config.secret_key = env::var("SECRET_KEY").ok().or(config.secret_key);

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::missing_required(
                "name",
                "Set application.name to a non-empty value",
            ));
        }

        if self.environment.is_production() && self.secret_key.is_none() {
            return Err(ConfigError::missing_required(
                "secret_key",
                "A secret key is required in production",
            ));
        }

        Ok(())
    }

    /// Get the bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}
