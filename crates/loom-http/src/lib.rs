//! # loom-http
//!
//! The HTTP face of loom, built on axum: the [`CoreRequest`] and
//! [`CoreResponse`] wrappers, the per-request [`RequestContext`], error to
//! response conversion, request scoped transactions, authentication
//! middleware and the admin and audit routes.

pub mod admin;
pub mod audit;
pub mod context;
pub mod error;
pub mod middleware;
pub mod request;
pub mod response;

pub use admin::admin_router;
pub use audit::{audit_router, AuditState, AUDIT_PATH};
pub use context::RequestContext;
pub use error::{error_response, ErrorDetail, HttpError, HttpResult, GENERIC_ERROR_MESSAGE};
pub use middleware::{
    apply_middleware_stack, require_login, AuthenticationFailure, AuthenticationState, MiddlewareStack,
};
pub use request::{CoreRequest, REQUEST_ID_HEADER};
pub use response::CoreResponse;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
