//! # loom-admin
//!
//! Admin panel support for loom entities: page definitions with list
//! columns, filters, ordering and pagination, CRUD operations guarded by
//! page permissions, and the manager that indexes pages by register name
//! and by entity.

pub mod config;
pub mod error;
pub mod fields;
pub mod manager;
pub mod page;

pub use config::AdminConfig;
pub use error::{AdminError, AdminResult};
pub use fields::{FormFieldType, ListFieldType};
pub use manager::AdminManager;
pub use page::{
    AdminHooks, AdminPage, AdminPageBuilder, AdminPageConfig, AdminPageHandler, DefaultHooks,
    FindParams, FindResult, MethodFn, ServiceOutcome, LIMIT_PARAM, OFFSET_PARAM, ORDER_BY_PARAM,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
