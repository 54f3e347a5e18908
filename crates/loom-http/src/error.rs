//! HTTP error types
//!
//! Errors of every loom crate reach the client through [`HttpError`].
//! Client errors carry their own message. Server errors are logged and
//! answered with a generic message unless debug responses are enabled.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use loom_admin::AdminError;
use loom_auth::AuthError;
use loom_core::{ApiError, ApiErrorResponse, CoreError, StatusError};
use loom_orm::ModelError;
use thiserror::Error;

/// Result type for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;

/// Message sent for server errors outside of debug mode
pub const GENERIC_ERROR_MESSAGE: &str =
    "Application has encountered an error. Please contact the support team if problem persists.";

/// HTTP errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Unauthorized access: {message}")]
    Unauthorized { message: String },

    #[error("Access forbidden: {message}")]
    Forbidden { message: String },

    #[error("Invalid request context key: [{key}]")]
    InvalidContextKey { key: String },

    /// A handler needed the request session but none was opened
    #[error("No database session is bound to the current request")]
    SessionUnavailable,

    #[error("Internal server error: {message}")]
    InternalError { message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl HttpError {
    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        HttpError::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_found<T: Into<String>>(resource: T) -> Self {
        HttpError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn unauthorized<T: Into<String>>(message: T) -> Self {
        HttpError::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden<T: Into<String>>(message: T) -> Self {
        HttpError::Forbidden {
            message: message.into(),
        }
    }

    pub fn internal<T: Into<String>>(message: T) -> Self {
        HttpError::InternalError {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl StatusError for HttpError {
    fn status_code(&self) -> u16 {
        match self {
            HttpError::BadRequest { .. } | HttpError::InvalidContextKey { .. } => 400,
            HttpError::NotFound { .. } => 404,
            HttpError::Unauthorized { .. } => 401,
            HttpError::Forbidden { .. } => 403,
            HttpError::SessionUnavailable | HttpError::InternalError { .. } => 500,
            HttpError::Core(err) => err.status_code(),
            HttpError::Model(err) => err.status_code(),
            HttpError::Admin(err) => err.status_code(),
            HttpError::Auth(err) => err.status_code(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            HttpError::BadRequest { .. } => "BAD_REQUEST",
            HttpError::NotFound { .. } => "NOT_FOUND",
            HttpError::Unauthorized { .. } => "UNAUTHORIZED",
            HttpError::Forbidden { .. } => "FORBIDDEN",
            HttpError::InvalidContextKey { .. } => "INVALID_REQUEST_CONTEXT_KEY",
            HttpError::SessionUnavailable => "SESSION_UNAVAILABLE",
            HttpError::InternalError { .. } => "INTERNAL_ERROR",
            HttpError::Core(err) => err.error_code(),
            HttpError::Model(err) => err.error_code(),
            HttpError::Admin(err) => err.error_code(),
            HttpError::Auth(err) => err.error_code(),
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            HttpError::BadRequest { .. } => Some("Check request format and parameters".to_string()),
            HttpError::Core(err) => err.hint(),
            HttpError::Model(err) => err.hint(),
            HttpError::Admin(err) => err.hint(),
            HttpError::Auth(err) => err.hint(),
            _ => None,
        }
    }
}

/// Detailed message of a server error, kept on the response so the
/// debug layer can restore it.
#[derive(Debug, Clone)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Build the error response for any status-aware error.
///
/// Server errors are logged and masked; the original message travels in
/// an [`ErrorDetail`] response extension.
pub fn error_response<E: StatusError + ?Sized>(error: &E) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !status.is_server_error() {
        tracing::debug!(status = status.as_u16(), code = error.error_code(), "{}", error);
        let body = ApiErrorResponse::from(ApiError::from_status_error(error));
        return (status, Json(body)).into_response();
    }

    tracing::error!(status = status.as_u16(), code = error.error_code(), "{}", error);
    let body = ApiErrorResponse::from(ApiError::new("INTERNAL_SERVER_ERROR", GENERIC_ERROR_MESSAGE));
    let mut response = (status, Json(body)).into_response();
    response.extensions_mut().insert(ErrorDetail {
        code: error.error_code().to_string(),
        message: error.to_string(),
    });
    response
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        error_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};

    async fn body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_codes_follow_wrapped_errors() {
        assert_eq!(HttpError::bad_request("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::SessionUnavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            HttpError::from(AuthError::AccessTokenRequired).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            HttpError::from(AdminError::PageNotFound { name: "x".into() }).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            HttpError::from(AdminError::not_allowed("users", "remove")).error_code(),
            "ADMIN_OPERATION_NOT_ALLOWED"
        );
    }

    #[tokio::test]
    async fn test_client_errors_keep_their_message() {
        let response = HttpError::from(AuthError::TokensUserMismatch).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.extensions().get::<ErrorDetail>().is_none());
        assert_eq!(
            body(response).await,
            json!({"error": {
                "code": "TOKENS_USER_MISMATCH",
                "message": "Provided access and refresh tokens do not belong to the same user",
            }})
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_masked() {
        let response = HttpError::internal("disk on fire").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = response.extensions().get::<ErrorDetail>().cloned().unwrap();
        assert_eq!(detail.message, "Internal server error: disk on fire");

        let body = body(response).await;
        assert_eq!(body["error"]["code"], json!("INTERNAL_SERVER_ERROR"));
        assert_eq!(body["error"]["message"], json!(GENERIC_ERROR_MESSAGE));
    }
}
