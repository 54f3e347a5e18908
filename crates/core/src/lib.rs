//! # loom-core
//!
//! Foundation shared by every loom crate: error types, the sectioned
//! configuration store, the component registry, the package loader, the
//! audit manager, string value deserializers and logging bootstrap.

pub mod audit;
pub mod components;
pub mod config;
pub mod converters;
pub mod errors;
pub mod logging;
pub mod packaging;

pub use audit::{ApplicationInfo, AuditHook, AuditManager, AuditOptions, AuditReport};
pub use components::{ComponentId, ComponentRegistry, DEFAULT_COMPONENT_KEY};
pub use config::{AppConfig, ConfigError, ConfigResult, ConfigStore, Environment};
pub use errors::{ApiError, ApiErrorResponse, CoreError, CoreResult, StatusError};
pub use logging::{init_logging, LoggingConfig};
pub use packaging::{
    Package, PackageContext, PackageKind, PackageLoader, PackagingConfig, PackagingHook,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Framework information
pub const FRAMEWORK_NAME: &str = "loom";

/// Get framework version
pub fn version() -> &'static str {
    VERSION
}

/// Get framework name
pub fn name() -> &'static str {
    FRAMEWORK_NAME
}
