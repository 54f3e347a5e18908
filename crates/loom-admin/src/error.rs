//! Error types for admin pages and the admin manager

use loom_core::StatusError;
use loom_orm::ModelError;
use thiserror::Error;

/// Admin error
#[derive(Debug, Clone, Error)]
pub enum AdminError {
    /// Page definition is invalid
    #[error("Invalid admin page '{page}': {message}")]
    InvalidPage { page: String, message: String },

    /// A list field is neither an attribute nor a method of the page
    #[error("Invalid list field '{field}' on admin page '{page}'")]
    InvalidListField { page: String, field: String },

    /// A page with no selectable list field
    #[error("Admin page '{page}' must have at least one selectable list field")]
    ListFieldRequired { page: String },

    #[error("Invalid method name '{name}' on admin page '{page}'")]
    InvalidMethodName { page: String, name: String },

    #[error("Admin page with register name '{name}' is already registered")]
    DuplicatePage { name: String },

    #[error("Admin page for entity '{entity}' is already registered")]
    DuplicateEntity { entity: String },

    #[error("Admin page '{name}' not found")]
    PageNotFound { name: String },

    /// Main metadata was requested before pages were populated
    #[error("Admin pages have not been loaded yet")]
    PagesNotLoaded,

    #[error("Operation '{operation}' is not allowed on admin page '{page}'")]
    OperationNotAllowed { page: String, operation: String },

    /// Single entity operations need a single column primary key
    #[error("Admin page '{page}' has a composite primary key")]
    CompositePrimaryKey { page: String },

    #[error("Required values not provided: {}", .values.join(", "))]
    RequiredValuesNotProvided { values: Vec<String> },

    #[error("Entity with primary key '{pk}' not found on admin page '{page}'")]
    EntityNotFound { page: String, pk: String },

    #[error("Admin configuration error: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl AdminError {
    pub fn invalid_page(page: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPage {
            page: page.into(),
            message: message.into(),
        }
    }

    pub fn not_allowed(page: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::OperationNotAllowed {
            page: page.into(),
            operation: operation.into(),
        }
    }
}

impl StatusError for AdminError {
    fn status_code(&self) -> u16 {
        match self {
            AdminError::PageNotFound { .. } | AdminError::EntityNotFound { .. } => 404,
            AdminError::OperationNotAllowed { .. } | AdminError::CompositePrimaryKey { .. } => 403,
            AdminError::InvalidMethodName { .. } | AdminError::RequiredValuesNotProvided { .. } => 400,
            AdminError::Model(err) => err.status_code(),
            _ => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AdminError::InvalidPage { .. } => "INVALID_ADMIN_PAGE",
            AdminError::InvalidListField { .. } => "INVALID_LIST_FIELD",
            AdminError::ListFieldRequired { .. } => "LIST_FIELD_REQUIRED",
            AdminError::InvalidMethodName { .. } => "INVALID_METHOD_NAME",
            AdminError::DuplicatePage { .. } => "DUPLICATED_ADMIN_PAGE",
            AdminError::DuplicateEntity { .. } => "DUPLICATED_ADMIN_ENTITY",
            AdminError::PageNotFound { .. } => "ADMIN_PAGE_NOT_FOUND",
            AdminError::PagesNotLoaded => "ADMIN_PAGES_NOT_LOADED",
            AdminError::OperationNotAllowed { .. } => "ADMIN_OPERATION_NOT_ALLOWED",
            AdminError::CompositePrimaryKey { .. } => "COMPOSITE_PRIMARY_KEY",
            AdminError::RequiredValuesNotProvided { .. } => "REQUIRED_VALUES_NOT_PROVIDED",
            AdminError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            AdminError::Configuration { .. } => "ADMIN_CONFIGURATION_ERROR",
            AdminError::Model(err) => err.error_code(),
        }
    }
}

pub type AdminResult<T> = Result<T, AdminError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AdminError::DuplicatePage { name: "users".into() }.error_code(),
            "DUPLICATED_ADMIN_PAGE"
        );
        assert_eq!(AdminError::PagesNotLoaded.error_code(), "ADMIN_PAGES_NOT_LOADED");
        assert_eq!(
            AdminError::Model(ModelError::MissingPrimaryKey).error_code(),
            "MISSING_PRIMARY_KEY"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AdminError::PageNotFound { name: "x".into() }.status_code(), 404);
        assert_eq!(AdminError::not_allowed("users", "remove").status_code(), 403);
        assert_eq!(
            AdminError::RequiredValuesNotProvided { values: vec!["a".into()] }.status_code(),
            400
        );
        assert_eq!(AdminError::invalid_page("users", "no name").status_code(), 500);
        assert_eq!(
            AdminError::Model(ModelError::DepthExceeded {
                entity: "User".into(),
                depth: 9,
                max: 5
            })
            .status_code(),
            400
        );
    }

    #[test]
    fn test_required_values_message() {
        let err = AdminError::RequiredValuesNotProvided {
            values: vec!["password".into(), "confirm".into()],
        };
        assert_eq!(err.to_string(), "Required values not provided: password, confirm");
    }
}
