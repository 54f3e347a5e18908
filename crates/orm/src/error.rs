//! Error types for the ORM layer
//!
//! Covers conversion, validation, query building and session failures.

use loom_core::StatusError;
use std::collections::BTreeMap;
use std::fmt;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Field level validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.errors {
            self.errors.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when empty, the collected errors otherwise.
    pub fn into_result(self) -> ModelResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ModelError::Validation(self))
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.errors).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Error types for ORM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Requested columns {columns:?} are not available on entity '{entity}'")]
    ColumnNotFound { entity: String, columns: Vec<String> },

    #[error("Conversion depth {depth} for entity '{entity}' exceeds the maximum of {max}")]
    DepthExceeded { entity: String, depth: u32, max: u32 },

    #[error("Validation error: {0}")]
    Validation(ValidationErrors),

    #[error("Invalid attribute '{attribute}' on entity '{entity}': {message}")]
    InvalidAttribute { entity: String, attribute: String, message: String },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Primary key is missing or invalid")]
    MissingPrimaryKey,

    #[error("Relationship error: {0}")]
    Relationship(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Session factory with request_bounded={request_bounded} is already registered")]
    DuplicateSessionFactory { request_bounded: bool },

    #[error("No session factory registered with request_bounded={request_bounded}")]
    SessionFactoryNotFound { request_bounded: bool },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ModelError {
    pub fn invalid_attribute(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ModelError::InvalidAttribute {
            entity: entity.into(),
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Single field validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, message);
        ModelError::Validation(errors)
    }

    pub fn is_column_not_found(&self) -> bool {
        matches!(self, ModelError::ColumnNotFound { .. })
    }

    pub fn is_depth_exceeded(&self) -> bool {
        matches!(self, ModelError::DepthExceeded { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ModelError::Validation(_))
    }
}

impl StatusError for ModelError {
    fn status_code(&self) -> u16 {
        match self {
            ModelError::ColumnNotFound { .. }
            | ModelError::DepthExceeded { .. }
            | ModelError::Validation(_)
            | ModelError::InvalidAttribute { .. }
            | ModelError::MissingPrimaryKey => 400,
            ModelError::NotFound(_) => 404,
            _ => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ModelError::ColumnNotFound { .. } => "COLUMN_NOT_FOUND",
            ModelError::DepthExceeded { .. } => "DEPTH_EXCEEDED",
            ModelError::Validation(_) => "VALIDATION_ERROR",
            ModelError::InvalidAttribute { .. } => "INVALID_ATTRIBUTE",
            ModelError::NotFound(_) => "NOT_FOUND",
            ModelError::MissingPrimaryKey => "MISSING_PRIMARY_KEY",
            ModelError::DuplicateSessionFactory { .. }
            | ModelError::SessionFactoryNotFound { .. }
            | ModelError::Configuration(_) => "CONFIG_ERROR",
            _ => "DATABASE_ERROR",
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ModelError::NotFound("row".to_string()),
            other => ModelError::Database(other.to_string()),
        }
    }
}
