//! # Prelude
//!
//! ```rust
//! use loom::prelude::*;
//! ```

pub use crate::{Application, ApplicationBuilder, ApplicationError};

// Core types
pub use loom_core::{
    AppConfig, ComponentId, ComponentRegistry, ConfigStore, CoreError, CoreResult, Package,
    PackageContext, StatusError,
};

// Entities and sessions
pub use loom_orm::{Entity, FromDict, ModelError, ModelResult, Query, Record, Session, ToDict};

// HTTP
pub use loom_http::{CoreRequest, CoreResponse, HttpError, HttpResult};

pub use loom_admin::{AdminManager, AdminPage};
pub use loom_auth::{Authenticator, HashingManager};
pub use loom_queue::{Task, TaskOutput, TaskQueueManager};

// JSON helper
pub use serde_json::json;

// Common derives
pub use serde::{Deserialize, Serialize};

// Async traits
pub use async_trait::async_trait;
