//! JWT authentication for the issuing and admin endpoints.
//!
//! Only available with the `jwt-auth` feature. Verification stays public;
//! everything that creates, reads or changes stored licenses sits behind
//! [`require_auth`].
//!
//! # Scopes
//!
//! - `licenses:read` - list, fetch and download licenses
//! - `licenses:write` - generate, amend and delete licenses
//! - `licenses:*` - both
//!
//! # Configuration
//!
//! - `LICENSA_JWT_SECRET` - HS256 secret, or `env:VAR` to read it from `VAR`
//! - `LICENSA_JWT_ISSUER` - expected issuer claim (default: "licensa")
//! - `LICENSA_JWT_AUDIENCE` - expected audience claim (default: "licensa-api")

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::server::api_error::{ApiError, ErrorCode};

/// Scope required for read-only admin routes.
pub const SCOPE_READ: &str = "licenses:read";
/// Scope required for routes that create or change licenses.
pub const SCOPE_WRITE: &str = "licenses:write";

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (operator or service name)
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
    pub aud: String,
    /// Scopes (space-separated list)
    #[serde(default)]
    pub scope: String,
}

impl Claims {
    /// Check if the claims include a specific scope.
    pub fn has_scope(&self, required: &str) -> bool {
        for scope in self.scope.split_whitespace() {
            if scope == "*" || scope == required {
                return true;
            }
            // "licenses:*" matches "licenses:read"
            if let Some(prefix) = scope.strip_suffix(":*") {
                if required.starts_with(prefix) && required.chars().nth(prefix.len()) == Some(':') {
                    return true;
                }
            }
        }

        false
    }
}

/// Caller identity established by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub scopes: Vec<String>,
    pub claims: Claims,
}

impl AuthenticatedUser {
    fn from_claims(claims: Claims) -> Self {
        Self {
            subject: claims.sub.clone(),
            scopes: claims.scope.split_whitespace().map(String::from).collect(),
            claims,
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.claims.has_scope(scope)
    }

    /// Require a specific scope, returning an error if not present.
    pub fn require_scope(&self, scope: &str) -> Result<(), AuthError> {
        if self.has_scope(scope) {
            Ok(())
        } else {
            Err(AuthError::InsufficientScope(scope.to_string()))
        }
    }
}

/// Authentication errors.
#[derive(Debug, Clone)]
pub enum AuthError {
    MissingToken,
    InvalidHeader,
    InvalidToken(String),
    TokenExpired,
    InsufficientScope(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "missing authorization token"),
            AuthError::InvalidHeader => write!(f, "invalid authorization header format"),
            AuthError::InvalidToken(msg) => write!(f, "invalid token: {msg}"),
            AuthError::TokenExpired => write!(f, "token has expired"),
            AuthError::InsufficientScope(scope) => {
                write!(f, "insufficient scope: requires {scope}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let code = match &err {
            AuthError::MissingToken => ErrorCode::MissingToken,
            AuthError::InvalidHeader => ErrorCode::InvalidHeader,
            AuthError::InvalidToken(_) => ErrorCode::InvalidToken,
            AuthError::TokenExpired => ErrorCode::TokenExpired,
            AuthError::InsufficientScope(_) => ErrorCode::InsufficientScope,
        };
        ApiError::with_message(code, err.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// HS256 token validator and issuer.
#[derive(Clone)]
pub struct JwtValidator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    expiration_secs: u64,
}

impl JwtValidator {
    pub fn from_config(config: &AuthConfig) -> LicenseResult<Self> {
        if config.jwt_secret.is_empty() {
            return Err(LicenseError::Config(
                "jwt_secret is required for JWT authentication".to_string(),
            ));
        }

        let secret = if let Some(env_var) = config.jwt_secret.strip_prefix("env:") {
            std::env::var(env_var).map_err(|_| {
                LicenseError::Config(format!(
                    "environment variable '{env_var}' not found for jwt_secret"
                ))
            })?
        } else {
            config.jwt_secret.clone()
        };

        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.set_issuer(&[&config.jwt_issuer]);
        validation.set_audience(&[&config.jwt_audience]);
        validation.validate_exp = true;

        Ok(Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiration_secs: config.token_expiration_secs,
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken(e.to_string()),
        })
    }

    /// Create a new JWT token with the given subject and scopes.
    pub fn create_token(&self, subject: &str, scopes: &[&str]) -> LicenseResult<String> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;

        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + self.expiration_secs,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            scope: scopes.join(" "),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| LicenseError::Config(format!("failed to create token: {e}")))
    }
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration_secs", &self.expiration_secs)
            .finish()
    }
}

/// Authentication settings shared with the middleware.
#[derive(Clone)]
pub struct AuthState {
    pub enabled: bool,
    /// `None` when auth is disabled
    pub validator: Option<Arc<JwtValidator>>,
}

impl AuthState {
    pub fn from_config(config: &AuthConfig) -> LicenseResult<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }

        let validator = JwtValidator::from_config(config)?;
        Ok(Self {
            enabled: true,
            validator: Some(Arc::new(validator)),
        })
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            validator: None,
        }
    }

    /// Validate the `Authorization: Bearer` header of a request.
    fn authenticate(&self, parts: &Parts) -> Result<Option<AuthenticatedUser>, AuthError> {
        let Some(validator) = self.validator.as_ref().filter(|_| self.enabled) else {
            return Ok(None);
        };

        let auth_header = parts
            .headers
            .get("Authorization")
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidHeader)?;

        let token_data = validator.validate_token(token)?;
        Ok(Some(AuthenticatedUser::from_claims(token_data.claims)))
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Scope a request needs: reads need `licenses:read`, anything else `licenses:write`.
pub fn required_scope(method: &Method) -> &'static str {
    if method == Method::GET || method == Method::HEAD {
        SCOPE_READ
    } else {
        SCOPE_WRITE
    }
}

/// Middleware guarding protected routes.
///
/// Passes requests straight through when auth is disabled. Otherwise the
/// bearer token must validate and carry the scope for the request method;
/// the resulting [`AuthenticatedUser`] is stored in the request extensions.
pub async fn require_auth(
    State(auth): State<AuthState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let (mut parts, body) = request.into_parts();

    let user = auth.authenticate(&parts).map_err(|e| {
        warn!("Rejected request to {}: {e}", parts.uri.path());
        e
    })?;

    if let Some(user) = user {
        user.require_scope(required_scope(&parts.method)).map_err(|e| {
            warn!(subject = %user.subject, "Rejected request to {}: {e}", parts.uri.path());
            e
        })?;
        debug!(subject = %user.subject, "Authorized request");
        parts.extensions.insert(user);
    }

    Ok(next.run(Request::from_parts(parts, body)).await)
}

/// Extracts the caller set by [`require_auth`].
///
/// Rejects with `MissingToken` on routes the middleware did not authenticate.
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or(AuthError::MissingToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AuthConfig {
        AuthConfig {
            enabled: true,
            jwt_secret: "test-secret-key-for-testing-only".to_string(),
            jwt_issuer: "licensa".to_string(),
            jwt_audience: "licensa-api".to_string(),
            token_expiration_secs: 3600,
        }
    }

    fn claims(scope: &str) -> Claims {
        Claims {
            sub: "test".to_string(),
            iat: 0,
            exp: u64::MAX,
            iss: "licensa".to_string(),
            aud: "licensa-api".to_string(),
            scope: scope.to_string(),
        }
    }

    #[test]
    fn create_and_validate_token() {
        let validator = JwtValidator::from_config(&test_config()).unwrap();

        let token = validator
            .create_token("ops", &[SCOPE_READ, SCOPE_WRITE])
            .unwrap();

        let token_data = validator.validate_token(&token).unwrap();
        assert_eq!(token_data.claims.sub, "ops");
        assert_eq!(token_data.claims.iss, "licensa");
        assert_eq!(token_data.claims.aud, "licensa-api");
        assert_eq!(token_data.claims.scope, "licenses:read licenses:write");
        assert!(token_data.claims.exp > token_data.claims.iat);
    }

    #[test]
    fn reject_invalid_token() {
        let validator = JwtValidator::from_config(&test_config()).unwrap();
        assert!(matches!(
            validator.validate_token("invalid-token"),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn reject_wrong_secret() {
        let validator = JwtValidator::from_config(&test_config()).unwrap();
        let token = validator.create_token("ops", &[SCOPE_READ]).unwrap();

        let other = JwtValidator::from_config(&AuthConfig {
            jwt_secret: "different-secret".to_string(),
            ..test_config()
        })
        .unwrap();

        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn reject_wrong_audience() {
        let validator = JwtValidator::from_config(&test_config()).unwrap();
        let token = validator.create_token("ops", &[SCOPE_READ]).unwrap();

        let other = JwtValidator::from_config(&AuthConfig {
            jwt_audience: "other-audience".to_string(),
            ..test_config()
        })
        .unwrap();

        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn reject_expired_token() {
        let config = test_config();
        let validator = JwtValidator::from_config(&config).unwrap();
        let now = chrono::Utc::now().timestamp() as u64;

        let expired = Claims {
            iat: now - 7200,
            exp: now - 3600,
            ..claims(SCOPE_READ)
        };
        let token = encode(
            &Header::default(),
            &expired,
            &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            validator.validate_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn scope_matching() {
        let exact = claims("licenses:read");
        assert!(exact.has_scope(SCOPE_READ));
        assert!(!exact.has_scope(SCOPE_WRITE));

        let category = claims("licenses:*");
        assert!(category.has_scope(SCOPE_READ));
        assert!(category.has_scope(SCOPE_WRITE));
        assert!(!category.has_scope("admin:read"));

        assert!(claims("*").has_scope("anything:at:all"));
        assert!(!claims("").has_scope(SCOPE_READ));
    }

    #[test]
    fn required_scope_by_method() {
        assert_eq!(required_scope(&Method::GET), SCOPE_READ);
        assert_eq!(required_scope(&Method::POST), SCOPE_WRITE);
        assert_eq!(required_scope(&Method::PUT), SCOPE_WRITE);
        assert_eq!(required_scope(&Method::DELETE), SCOPE_WRITE);
    }

    #[test]
    fn empty_secret_fails() {
        let config = AuthConfig {
            enabled: true,
            jwt_secret: "".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            JwtValidator::from_config(&config),
            Err(LicenseError::Config(_))
        ));
    }

    #[test]
    fn auth_state_from_config() {
        let disabled = AuthState::from_config(&AuthConfig::default()).unwrap();
        assert!(!disabled.enabled);
        assert!(disabled.validator.is_none());

        let enabled = AuthState::from_config(&test_config()).unwrap();
        assert!(enabled.enabled);
        assert!(enabled.validator.is_some());
    }

    #[test]
    fn auth_errors_use_api_error_codes() {
        let err: ApiError = AuthError::InsufficientScope(SCOPE_WRITE.to_string()).into();
        assert_eq!(err.error.code, ErrorCode::InsufficientScope);
        let err: ApiError = AuthError::MissingToken.into();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
