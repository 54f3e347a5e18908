//! # loom-auth: hashing, tokens, authenticators and permissions
//!
//! Password hashing with PBKDF2, Argon2 and bcrypt handlers, JWT access and
//! refresh tokens, request authenticators and a permission registry.

pub mod authentication;
pub mod config;
pub mod error;
pub mod hashing;
pub mod permission;
#[cfg(feature = "jwt")]
pub mod token;

pub use authentication::{
    extract_token, Authenticator, AuthenticatorManager, CredentialSource, IdentitySink, LoginTokens,
    UserProvider, ACCESS_TOKEN_HEADER, REFRESH_TOKEN_COOKIE,
};
#[cfg(feature = "jwt")]
pub use authentication::TokenAuthenticator;
pub use config::{AuthConfig, HashingConfig, TokenConfig};
pub use error::{AuthError, HashingError};
pub use hashing::{HashingHandler, HashingManager, Pbkdf2Handler};
#[cfg(feature = "argon2")]
pub use hashing::Argon2Handler;
#[cfg(feature = "bcrypt")]
pub use hashing::BcryptHandler;
pub use permission::{Permission, PermissionManager};
#[cfg(feature = "jwt")]
pub use token::{TokenClaims, TokenService, TokenType};

/// Authentication result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Authentication system version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
