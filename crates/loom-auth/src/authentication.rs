//! Authenticators
//!
//! An authenticator reads credentials from a request through
//! [`CredentialSource`] and, on success, records the current user on the
//! request through [`IdentitySink`].

use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "jwt")]
use crate::hashing::HashingManager;
#[cfg(feature = "jwt")]
use crate::token::{TokenClaims, TokenService, TokenType};

/// Header carrying the access token
pub const ACCESS_TOKEN_HEADER: &str = "Authorization";

/// Cookie carrying the refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "Refresh-Auth";

/// Read access to request credentials
pub trait CredentialSource: Send + Sync {
    fn header(&self, name: &str) -> Option<String>;
    fn cookie(&self, name: &str) -> Option<String>;
}

/// Write access to the authenticated identity of a request
pub trait IdentitySink: Send + Sync {
    fn set_current_user(&self, identity: Value, info: Map<String, Value>);
    fn set_component_custom_key(&self, key: String);
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &str;

    /// Authenticate the request or fail without touching `sink`.
    async fn authenticate(&self, source: &dyn CredentialSource, sink: &dyn IdentitySink) -> AuthResult<()>;
}

/// Application access to users
#[async_trait]
pub trait UserProvider: Send + Sync + 'static {
    type User: Send + Sync;

    async fn get_user(&self, identity: &Value) -> AuthResult<Option<Self::User>>;

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Self::User>>;

    fn identity(&self, user: &Self::User) -> Value;

    fn password_hash(&self, user: &Self::User) -> Option<String>;

    /// Extra information stored next to the identity on the request.
    fn user_info(&self, _user: &Self::User) -> Map<String, Value> {
        Map::new()
    }

    /// Scope key for component lookup, e.g. a tenant.
    fn custom_component_key(&self, _user: &Self::User) -> Option<String> {
        None
    }

    async fn is_revoked(&self, _jti: &str) -> AuthResult<bool> {
        Ok(false)
    }
}

/// Tokens issued on login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Strip an optional `Bearer ` prefix; blank values count as missing.
pub fn extract_token(value: Option<String>) -> Option<String> {
    let value = value?;
    let token = value.strip_prefix("Bearer ").unwrap_or(&value).trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Access/refresh token authenticator
#[cfg(feature = "jwt")]
pub struct TokenAuthenticator<P: UserProvider> {
    name: String,
    tokens: Arc<TokenService>,
    provider: P,
    refresh_token: bool,
}

#[cfg(feature = "jwt")]
impl<P: UserProvider> TokenAuthenticator<P> {
    pub fn new(name: impl Into<String>, tokens: Arc<TokenService>, provider: P) -> Self {
        Self {
            name: name.into(),
            tokens,
            provider,
            refresh_token: true,
        }
    }

    /// Whether a refresh token cookie is required next to the access token.
    pub fn with_refresh_token(mut self, enabled: bool) -> Self {
        self.refresh_token = enabled;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Check the password and issue fresh tokens.
    pub async fn login(&self, username: &str, password: &str, hashing: &HashingManager) -> AuthResult<LoginTokens> {
        let user = self
            .provider
            .find_by_username(username)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let hash = self.provider.password_hash(&user).ok_or(AuthError::UserNotFound)?;
        if !hashing.is_match(password, &hash) {
            tracing::debug!(authenticator = %self.name, "password mismatch on login");
            return Err(AuthError::UserNotFound);
        }

        let identity = self.provider.identity(&user);
        let access_token = self
            .tokens
            .generate_access_token(&self.name, identity.clone(), true, Map::new())?;
        let refresh_token = if self.refresh_token {
            Some(self.tokens.generate_refresh_token(&self.name, identity, Map::new())?)
        } else {
            None
        };
        Ok(LoginTokens {
            access_token,
            refresh_token,
        })
    }

    /// Issue a new, non-fresh access token from the refresh token cookie.
    pub async fn refresh_access_token(&self, source: &dyn CredentialSource) -> AuthResult<String> {
        let token = extract_token(source.cookie(REFRESH_TOKEN_COOKIE)).ok_or(AuthError::RefreshTokenRequired)?;
        let claims = self.validate(&token, TokenType::Refresh)?;
        self.check_revoked(&claims).await?;
        let user = self
            .provider
            .get_user(&claims.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        self.tokens
            .generate_access_token(&self.name, self.provider.identity(&user), false, Map::new())
    }

    fn validate(&self, token: &str, expected: TokenType) -> AuthResult<TokenClaims> {
        let invalid = || match expected {
            TokenType::Access => AuthError::InvalidAccessToken,
            TokenType::Refresh => AuthError::InvalidRefreshToken,
        };

        let claims = self.tokens.decode(token).map_err(|e| {
            tracing::debug!(authenticator = %self.name, token_type = %expected, error = %e, "token rejected");
            invalid()
        })?;
        if claims.token_type != expected || claims.sub.is_null() {
            return Err(invalid());
        }
        if claims.auth != self.name {
            return Err(AuthError::InvalidTokenAuthenticator { name: claims.auth });
        }
        Ok(claims)
    }

    async fn check_revoked(&self, claims: &TokenClaims) -> AuthResult<()> {
        if self.provider.is_revoked(&claims.jti).await? {
            return Err(AuthError::CredentialsRevoked);
        }
        Ok(())
    }
}

#[cfg(feature = "jwt")]
#[async_trait]
impl<P: UserProvider> Authenticator for TokenAuthenticator<P> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self, source: &dyn CredentialSource, sink: &dyn IdentitySink) -> AuthResult<()> {
        let access_token =
            extract_token(source.header(ACCESS_TOKEN_HEADER)).ok_or(AuthError::AccessTokenRequired)?;
        let refresh_token = if self.refresh_token {
            Some(extract_token(source.cookie(REFRESH_TOKEN_COOKIE)).ok_or(AuthError::RefreshTokenRequired)?)
        } else {
            None
        };

        let access = self.validate(&access_token, TokenType::Access)?;
        if let Some(refresh_token) = refresh_token {
            let refresh = self.validate(&refresh_token, TokenType::Refresh)?;
            if refresh.sub != access.sub {
                return Err(AuthError::TokensUserMismatch);
            }
            self.check_revoked(&refresh).await?;
        }
        self.check_revoked(&access).await?;

        let user = self
            .provider
            .get_user(&access.sub)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let identity = self.provider.identity(&user);
        if identity != access.sub {
            return Err(AuthError::TokensUserMismatch);
        }

        let mut info = Map::new();
        info.insert("is_fresh".to_string(), Value::Bool(access.is_fresh));
        info.extend(self.provider.user_info(&user));

        sink.set_current_user(identity, info);
        if let Some(key) = self.provider.custom_component_key(&user) {
            sink.set_component_custom_key(key);
        }
        tracing::debug!(authenticator = %self.name, "request authenticated");
        Ok(())
    }
}

/// Registry of authenticators by name
pub struct AuthenticatorManager {
    authenticators: RwLock<HashMap<String, Arc<dyn Authenticator>>>,
    default_authenticator: String,
}

impl AuthenticatorManager {
    pub fn new(default_authenticator: impl Into<String>) -> Self {
        Self {
            authenticators: RwLock::new(HashMap::new()),
            default_authenticator: default_authenticator.into(),
        }
    }

    pub fn register(&self, authenticator: Arc<dyn Authenticator>, replace: bool) -> AuthResult<()> {
        let name = authenticator.name().to_string();
        let mut authenticators = self.authenticators.write();
        if authenticators.contains_key(&name) && !replace {
            return Err(AuthError::DuplicateAuthenticator { name });
        }
        tracing::debug!(authenticator = %name, replace, "registered authenticator");
        authenticators.insert(name, authenticator);
        Ok(())
    }

    pub fn get(&self, name: &str) -> AuthResult<Arc<dyn Authenticator>> {
        self.authenticators
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::AuthenticatorNotFound {
                name: name.to_string(),
            })
    }

    pub fn default_authenticator(&self) -> AuthResult<Arc<dyn Authenticator>> {
        self.get(&self.default_authenticator)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.authenticators.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Authenticate with the named authenticator, or the default one.
    pub async fn authenticate(
        &self,
        name: Option<&str>,
        source: &dyn CredentialSource,
        sink: &dyn IdentitySink,
    ) -> AuthResult<()> {
        let authenticator = match name {
            Some(name) => self.get(name)?,
            None => self.default_authenticator()?,
        };
        authenticator.authenticate(source, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails(&'static str);

    #[async_trait]
    impl Authenticator for AlwaysFails {
        fn name(&self) -> &str {
            self.0
        }

        async fn authenticate(&self, _: &dyn CredentialSource, _: &dyn IdentitySink) -> AuthResult<()> {
            Err(AuthError::AccessTokenRequired)
        }
    }

    #[test]
    fn test_extract_token() {
        assert_eq!(extract_token(Some("Bearer abc".into())), Some("abc".into()));
        assert_eq!(extract_token(Some("abc".into())), Some("abc".into()));
        assert_eq!(extract_token(Some("Bearer  ".into())), None);
        assert_eq!(extract_token(None), None);
    }

    #[test]
    fn test_manager_registration() {
        let manager = AuthenticatorManager::new("default");
        manager.register(Arc::new(AlwaysFails("default")), false).unwrap();
        let err = manager
            .register(Arc::new(AlwaysFails("default")), false)
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "DUPLICATED_AUTHENTICATOR");
        manager.register(Arc::new(AlwaysFails("admin")), false).unwrap();
        assert_eq!(manager.names(), vec!["admin", "default"]);
        assert!(matches!(
            manager.get("missing").err(),
            Some(AuthError::AuthenticatorNotFound { .. })
        ));
    }
}
