//! Authentication, authorization and hashing error types

use loom_core::StatusError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication and authorization errors
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthError {
    /// Access token missing from the request
    #[error("Access token is required for authentication")]
    AccessTokenRequired,

    /// Refresh token missing from the request
    #[error("Refresh token is required for authentication")]
    RefreshTokenRequired,

    #[error("Provided access token is invalid")]
    InvalidAccessToken,

    #[error("Provided refresh token is invalid")]
    InvalidRefreshToken,

    /// Token was issued by another authenticator
    #[error("Token is generated using another authenticator with name [{name}]")]
    InvalidTokenAuthenticator { name: String },

    #[error("Provided access and refresh tokens do not belong to the same user")]
    TokensUserMismatch,

    #[error("User credentials are revoked")]
    CredentialsRevoked,

    /// No user matches the credentials
    #[error("User not found")]
    UserNotFound,

    /// Token-related errors
    #[error("Token error: {message}")]
    TokenError { message: String },

    #[error("Authenticator [{name}] not found")]
    AuthenticatorNotFound { name: String },

    #[error("Authenticator [{name}] is already registered")]
    DuplicateAuthenticator { name: String },

    #[error("Permission [{permission}] is already registered")]
    DuplicatePermission { permission: String },

    #[error("Permission not found: {permission}")]
    PermissionNotFound { permission: String },

    /// Authorization/permission errors
    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    /// Configuration errors
    #[error("Authentication configuration error: {message}")]
    ConfigurationError { message: String },

    /// Cryptographic errors
    #[error("Cryptographic error: {message}")]
    CryptographicError { message: String },
}

impl AuthError {
    /// Get the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::AccessTokenRequired => "ACCESS_TOKEN_REQUIRED",
            AuthError::RefreshTokenRequired => "REFRESH_TOKEN_REQUIRED",
            AuthError::InvalidAccessToken => "INVALID_ACCESS_TOKEN",
            AuthError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            AuthError::InvalidTokenAuthenticator { .. } => "INVALID_TOKEN_AUTHENTICATOR",
            AuthError::TokensUserMismatch => "TOKENS_USER_MISMATCH",
            AuthError::CredentialsRevoked => "CREDENTIALS_REVOKED",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::TokenError { .. } => "TOKEN_ERROR",
            AuthError::AuthenticatorNotFound { .. } => "AUTHENTICATOR_NOT_FOUND",
            AuthError::DuplicateAuthenticator { .. } => "DUPLICATED_AUTHENTICATOR",
            AuthError::DuplicatePermission { .. } => "DUPLICATED_PERMISSION",
            AuthError::PermissionNotFound { .. } => "PERMISSION_NOT_FOUND",
            AuthError::AccessDenied { .. } => "ACCESS_DENIED",
            AuthError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            AuthError::CryptographicError { .. } => "CRYPTOGRAPHIC_ERROR",
        }
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::AccessTokenRequired
            | AuthError::RefreshTokenRequired
            | AuthError::InvalidAccessToken
            | AuthError::InvalidRefreshToken
            | AuthError::InvalidTokenAuthenticator { .. }
            | AuthError::TokensUserMismatch
            | AuthError::CredentialsRevoked
            | AuthError::UserNotFound // Don't reveal user existence
            | AuthError::TokenError { .. } => 401,
            AuthError::AccessDenied { .. } | AuthError::PermissionNotFound { .. } => 403,
            AuthError::AuthenticatorNotFound { .. }
            | AuthError::DuplicateAuthenticator { .. }
            | AuthError::DuplicatePermission { .. }
            | AuthError::ConfigurationError { .. }
            | AuthError::CryptographicError { .. } => 500,
        }
    }

    /// Create a token error
    pub fn token_error(message: impl Into<String>) -> Self {
        Self::TokenError {
            message: message.into(),
        }
    }

    /// Create an access denied error
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Create a cryptographic error
    pub fn crypto_error(message: impl Into<String>) -> Self {
        Self::CryptographicError {
            message: message.into(),
        }
    }
}

impl StatusError for AuthError {
    fn status_code(&self) -> u16 {
        AuthError::status_code(self)
    }

    fn error_code(&self) -> &'static str {
        AuthError::error_code(self)
    }
}

/// Password hashing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashingError {
    #[error("Hashing handler [{name}] is already registered")]
    DuplicateHandler { name: String },

    #[error("Hashing handler [{name}] not found")]
    HandlerNotFound { name: String },

    /// No registered handler recognizes a stored hash
    #[error("Hash value is not recognized by any hashing handler")]
    UnrecognizedHash,

    #[error("Internal algorithm [{algorithm}] is invalid")]
    InvalidInternalAlgorithm { algorithm: String },

    #[error("Hashing rounds [{rounds}] is invalid")]
    InvalidRounds { rounds: u32 },

    #[error("Salt length [{length}] is invalid")]
    InvalidSaltLength { length: usize },

    #[error("Input hash value is not a valid [{handler}] hash")]
    InvalidHash { handler: String },

    #[error("Hashing failed: {message}")]
    Backend { message: String },
}

impl HashingError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl From<HashingError> for AuthError {
    fn from(err: HashingError) -> Self {
        match &err {
            HashingError::DuplicateHandler { .. } | HashingError::HandlerNotFound { .. } => {
                AuthError::config_error(err.to_string())
            }
            _ => AuthError::crypto_error(err.to_string()),
        }
    }
}

// Conversion from common error types
#[cfg(feature = "jwt")]
impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::token_error(err.to_string())
    }
}

#[cfg(feature = "bcrypt")]
impl From<bcrypt::BcryptError> for HashingError {
    fn from(err: bcrypt::BcryptError) -> Self {
        Self::backend(err.to_string())
    }
}

#[cfg(feature = "argon2")]
impl From<argon2::password_hash::Error> for HashingError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::backend(err.to_string())
    }
}
