//! JWT issuing and validation

use crate::config::TokenConfig;
use crate::{AuthError, AuthResult};
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// Token payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User identity
    pub sub: Value,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Name of the authenticator that issued the token
    pub auth: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub is_fresh: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub struct TokenService {
    config: TokenConfig,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.config.issuer)
            .finish()
    }
}

impl TokenService {
    pub fn new(config: TokenConfig) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::config_error("token secret must not be empty"));
        }
        let algorithm = match config.algorithm.to_uppercase().as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => {
                return Err(AuthError::config_error(format!(
                    "unsupported token algorithm [{}]",
                    other
                )))
            }
        };
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Ok(Self {
            config,
            algorithm,
            encoding_key,
            decoding_key,
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn generate_access_token(
        &self,
        authenticator: &str,
        identity: Value,
        is_fresh: bool,
        extra: Map<String, Value>,
    ) -> AuthResult<String> {
        self.generate(authenticator, identity, TokenType::Access, is_fresh, extra)
    }

    pub fn generate_refresh_token(
        &self,
        authenticator: &str,
        identity: Value,
        extra: Map<String, Value>,
    ) -> AuthResult<String> {
        self.generate(authenticator, identity, TokenType::Refresh, false, extra)
    }

    pub fn generate(
        &self,
        authenticator: &str,
        identity: Value,
        token_type: TokenType,
        is_fresh: bool,
        extra: Map<String, Value>,
    ) -> AuthResult<String> {
        let lifetime = match token_type {
            TokenType::Access => self.config.access_token_lifetime,
            TokenType::Refresh => self.config.refresh_token_lifetime,
        };
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: identity,
            token_type,
            auth: authenticator.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + lifetime,
            is_fresh,
            iss: self.config.issuer.clone(),
            extra,
        };
        self.encode(&claims)
    }

    pub fn encode(&self, claims: &TokenClaims) -> AuthResult<String> {
        Ok(encode(&Header::new(self.algorithm), claims, &self.encoding_key)?)
    }

    /// Verify signature, expiry and issuer, returning the claims.
    pub fn decode(&self, token: &str) -> AuthResult<TokenClaims> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        Ok(decode::<TokenClaims>(token, &self.decoding_key, &validation)?.claims)
    }

    /// Header of a token without verifying it.
    pub fn unverified_header(&self, token: &str) -> AuthResult<Header> {
        Ok(decode_header(token)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(issuer: Option<&str>) -> TokenService {
        TokenService::new(TokenConfig {
            secret: "test-secret".into(),
            issuer: issuer.map(str::to_string),
            ..TokenConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_issue_and_decode() {
        let service = service(Some("loom"));
        let mut extra = Map::new();
        extra.insert("scope".into(), json!("admin"));
        let token = service
            .generate_access_token("default", json!(42), true, extra)
            .unwrap();

        let claims = service.decode(&token).unwrap();
        assert_eq!(claims.sub, json!(42));
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.auth, "default");
        assert!(claims.is_fresh);
        assert_eq!(claims.iss.as_deref(), Some("loom"));
        assert_eq!(claims.extra["scope"], json!("admin"));
        assert_eq!(claims.exp - claims.iat, 900);
        assert_eq!(service.unverified_header(&token).unwrap().alg, Algorithm::HS256);
    }

    #[test]
    fn test_rejects_foreign_and_expired_tokens() {
        let issuer = service(Some("loom"));
        let token = service(Some("other"))
            .generate_refresh_token("default", json!(1), Map::new())
            .unwrap();
        assert!(matches!(issuer.decode(&token), Err(AuthError::TokenError { .. })));

        let now = Utc::now().timestamp();
        let expired = issuer
            .encode(&TokenClaims {
                sub: json!(1),
                token_type: TokenType::Access,
                auth: "default".into(),
                jti: "x".into(),
                iat: now - 100,
                exp: now - 50,
                is_fresh: false,
                iss: Some("loom".into()),
                extra: Map::new(),
            })
            .unwrap();
        assert!(issuer.decode(&expired).is_err());
        assert!(issuer.decode("not.a.token").is_err());
    }

    #[test]
    fn test_configuration_errors() {
        assert!(TokenService::new(TokenConfig::default()).is_err());
        let err = TokenService::new(TokenConfig {
            secret: "s".into(),
            algorithm: "RS256".into(),
            ..TokenConfig::default()
        })
        .unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
