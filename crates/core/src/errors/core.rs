use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core error type for the loom framework
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid component name: {message}")]
    InvalidComponentName { message: String },

    #[error("Component '{name}' with key '{key}' is already registered")]
    DuplicateComponent { name: String, key: String },

    #[error("Component not found: {name}")]
    ComponentNotFound { name: String },

    #[error("Component '{name}' is registered with a different type")]
    ComponentTypeMismatch { name: String },

    #[error("Invalid package name: {name}")]
    InvalidPackageName { name: String },

    #[error("Package '{name}' is already registered")]
    DuplicatePackage { name: String },

    #[error("Package '{package}' declares component '{component}' but did not register it")]
    ComponentNotRegistered { package: String, component: String },

    #[error("Unresolved package dependencies: {details}")]
    UnresolvedDependencies { details: String },

    #[error("Package '{package}' failed to load: {message}")]
    PackageLoad { package: String, message: String },

    #[error("Audit hook '{name}' is already registered")]
    DuplicateAuditHook { name: String },

    #[error("Lock error on resource: {resource}")]
    LockError { resource: String },

    #[error("API error: {code} - {message}")]
    Api {
        code: String,
        message: String,
        hint: Option<String>,
    },
}

impl CoreError {
    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new component not found error
    pub fn component_not_found(name: impl Into<String>) -> Self {
        Self::ComponentNotFound { name: name.into() }
    }

    /// Create a package load failure
    pub fn package_load(package: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PackageLoad {
            package: package.into(),
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api_error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
            hint: None,
        }
    }

    /// Add a hint to an API error
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        if let Self::Api {
            hint: ref mut h, ..
        } = self
        {
            *h = Some(hint.into());
        }
        self
    }

    /// Check if the error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if the error is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. }
                | Self::DuplicateComponent { .. }
                | Self::DuplicatePackage { .. }
                | Self::InvalidPackageName { .. }
                | Self::InvalidComponentName { .. }
        )
    }
}

/// Errors that know how they should be reported over HTTP.
///
/// Every crate implements this for its own error enum so that the HTTP
/// layer can turn any of them into an [`ApiErrorResponse`].
pub trait StatusError: std::error::Error + Send + Sync + 'static {
    /// HTTP status code for the error
    fn status_code(&self) -> u16;

    /// Stable machine readable error code
    fn error_code(&self) -> &'static str;

    /// Optional hint shown to API clients
    fn hint(&self) -> Option<String> {
        None
    }

    /// Client errors carry their message to the caller as-is.
    fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl StatusError for CoreError {
    fn status_code(&self) -> u16 {
        match self {
            CoreError::Validation { .. } => 400,
            CoreError::ComponentNotFound { .. } => 404,
            CoreError::Api { .. } => 400,
            _ => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "VALIDATION_ERROR",
            CoreError::ComponentNotFound { .. } => "COMPONENT_NOT_FOUND",
            CoreError::Api { .. } => "API_ERROR",
            e if e.is_configuration() => "CONFIG_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }

    fn hint(&self) -> Option<String> {
        match self {
            CoreError::Api { hint, .. } => hint.clone(),
            _ => None,
        }
    }
}

/// API error response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

/// API error structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            hint: None,
        }
    }

    /// Add a hint to the API error
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Build an API error from any status-aware error
    pub fn from_status_error<E: StatusError + ?Sized>(error: &E) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            hint: error.hint(),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Api {
                code,
                message,
                hint,
            } => Self {
                code,
                message,
                hint,
            },
            other => Self::from_status_error(&other),
        }
    }
}

impl From<ApiError> for ApiErrorResponse {
    fn from(error: ApiError) -> Self {
        Self { error }
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CoreError::validation("bad").status_code(), 400);
        assert_eq!(CoreError::component_not_found("x").status_code(), 404);
        assert_eq!(CoreError::configuration("x").status_code(), 500);
    }

    #[test]
    fn test_api_error_conversion() {
        let api: ApiError = CoreError::DuplicateComponent {
            name: "database".to_string(),
            key: "default".to_string(),
        }
        .into();
        assert_eq!(api.code, "CONFIG_ERROR");
        assert!(api.message.contains("database"));

        let api: ApiError = CoreError::api_error("CUSTOM", "boom")
            .with_hint("retry later")
            .into();
        assert_eq!(api.code, "CUSTOM");
        assert_eq!(api.hint.as_deref(), Some("retry later"));
    }
}
