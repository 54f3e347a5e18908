//! Structured logging bootstrap.

use serde::{Deserialize, Serialize};
use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// `logging` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    #[serde(default = "default_level")]
    pub level: String,
    /// Enable JSON structured logging (vs plain text)
    #[serde(default)]
    pub json_format: bool,
    /// Enable pretty printing for development
    #[serde(default)]
    pub pretty_print: bool,
    /// Include file and line number information
    #[serde(default)]
    pub include_location: bool,
    #[serde(default = "default_true")]
    pub include_target: bool,
    /// Environment filter (supports directives like "loom=debug,tower=info")
    #[serde(default)]
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
            pretty_print: false,
            include_location: false,
            include_target: true,
            env_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create production logging configuration
    pub fn production() -> Self {
        Self {
            json_format: true,
            env_filter: Some("loom=info,tower_http=warn,axum=warn".to_string()),
            ..Self::default()
        }
    }

    /// Create development logging configuration
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            pretty_print: true,
            include_location: true,
            env_filter: Some("loom=debug,tower_http=debug".to_string()),
            ..Self::default()
        }
    }

    /// Create test logging configuration (minimal output)
    pub fn test() -> Self {
        Self {
            level: "error".to_string(),
            include_target: false,
            ..Self::default()
        }
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Override the level, used by CLI `--loglevel` flags.
    pub fn with_level<S: Into<String>>(mut self, level: S) -> Self {
        self.level = level.into();
        self.env_filter = None;
        self
    }

    fn filter_directives(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Initialize structured logging for the process.
///
/// `RUST_LOG` takes precedence over the configured filter.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directives()))?;

    let layer = Layer::new()
        .with_writer(io::stdout)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry.with(layer.json()).try_init()?;
    } else if config.pretty_print {
        registry.with(layer.pretty()).try_init()?;
    } else {
        registry.with(layer).try_init()?;
    }

    Ok(())
}
