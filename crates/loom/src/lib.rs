//! # loom
//!
//! Application framework with entity reflection and dict conversion, an
//! admin api over registered entities, authentication, password hashing
//! and an in-process task queue.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use loom::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), loom::ApplicationError> {
//!     let store = ConfigStore::from_file("settings.yaml")?;
//!     Application::builder(store).build().await?.run().await
//! }
//! ```

// Re-export sub-crates
pub use loom_admin as admin;
pub use loom_auth as auth;
pub use loom_core as core;
pub use loom_http as http;
pub use loom_orm as orm;
pub use loom_queue as queue;

pub mod application;
pub mod prelude;

pub use application::{
    component_names, shutdown_signal, Application, ApplicationBuilder, ApplicationError,
    ApplicationResult, DEFAULT_AUTHENTICATOR, ENV_PREFIX,
};

// Common types at the crate root
pub use loom_admin::{AdminConfig, AdminManager, AdminPage};
pub use loom_auth::{AuthenticatorManager, HashingManager, TokenService};
pub use loom_core::{AppConfig, ComponentRegistry, ConfigStore, Package, PackageContext};
pub use loom_http::{CoreRequest, CoreResponse, HttpError, HttpResult, RequestContext};
pub use loom_orm::{DatabaseManager, Entity, Session};
pub use loom_queue::{Task, TaskQueueManager};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get framework version
pub fn version() -> &'static str {
    VERSION
}

/// Get framework name
pub fn name() -> &'static str {
    loom_core::FRAMEWORK_NAME
}
