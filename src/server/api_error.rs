//! Standardized API error responses for all Licensa endpoints.
//!
//! Every error response has the same JSON shape:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "CONFLICT",
//!     "message": "license already exists for owner 'Acme Inc'"
//!   }
//! }
//! ```
//!
//! `details` is omitted unless the error names a field.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::LicenseError;
use crate::validation::ValidationError;

/// Wire codes carried in `error.code`; clients branch on these, not on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // 400
    InvalidRequest,
    InvalidField,
    MalformedLicense,

    // 401 / 403, only produced with the jwt-auth feature
    MissingToken,
    InvalidHeader,
    InvalidToken,
    TokenExpired,
    InsufficientScope,

    // 404 / 409
    NotFound,
    /// Owner already holds a stored license
    Conflict,

    // 5xx
    /// Key material missing or unreadable; the service cannot sign or verify
    KeyUnavailable,
    SigningFailed,
    DatabaseError,
    ConfigError,
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest
            | ErrorCode::InvalidField
            | ErrorCode::MalformedLicense
            | ErrorCode::InvalidHeader => StatusCode::BAD_REQUEST,

            ErrorCode::MissingToken | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::InsufficientScope => StatusCode::FORBIDDEN,

            ErrorCode::NotFound => StatusCode::NOT_FOUND,

            ErrorCode::Conflict => StatusCode::CONFLICT,

            ErrorCode::SigningFailed
            | ErrorCode::DatabaseError
            | ErrorCode::ConfigError
            | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,

            ErrorCode::KeyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Message used when the underlying detail must not reach the client.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Request body could not be read",
            ErrorCode::InvalidField => "Request contains an invalid field",
            ErrorCode::MalformedLicense => "License key is malformed",
            ErrorCode::MissingToken => "Bearer token required",
            ErrorCode::InvalidHeader => "Authorization header must be 'Bearer <token>'",
            ErrorCode::InvalidToken => "Bearer token rejected",
            ErrorCode::TokenExpired => "Bearer token expired",
            ErrorCode::InsufficientScope => "Token scopes do not allow this operation",
            ErrorCode::NotFound => "No such license",
            ErrorCode::Conflict => "A license already exists for this owner",
            ErrorCode::KeyUnavailable => "Signing key is unavailable",
            ErrorCode::SigningFailed => "License could not be signed",
            ErrorCode::DatabaseError => "License store is unavailable",
            ErrorCode::ConfigError => "Server is misconfigured",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    /// `{"field": ...}` for field validation failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// JSON error envelope returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

impl ApiError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: code.default_message().to_string(),
                details: None,
            },
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    pub fn invalid_field(field: &str, reason: &str) -> Self {
        Self::with_details(
            ErrorCode::InvalidField,
            format!("{field} {reason}"),
            serde_json::json!({ "field": field }),
        )
    }

    pub fn not_found(what: &str) -> Self {
        Self::with_message(ErrorCode::NotFound, format!("{what} not found"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error.code, self.error.message)
    }
}

impl std::error::Error for ApiError {}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::invalid_field(&err.field, &err.message)
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::Validation(e) => e.into(),
            LicenseError::Conflict(msg) => ApiError::with_message(ErrorCode::Conflict, msg),
            LicenseError::Decode(msg) => ApiError::with_message(ErrorCode::MalformedLicense, msg),
            LicenseError::NotFound(msg) => ApiError::with_message(ErrorCode::NotFound, msg),
            // Server-side failures: log the detail, return the generic message.
            LicenseError::Key(msg) => {
                error!("Key unavailable: {msg}");
                ApiError::new(ErrorCode::KeyUnavailable)
            }
            LicenseError::Signing(msg) => {
                error!("Signing failed: {msg}");
                ApiError::new(ErrorCode::SigningFailed)
            }
            LicenseError::Store(msg) => {
                error!("Store failure: {msg}");
                ApiError::new(ErrorCode::DatabaseError)
            }
            LicenseError::Config(msg) => {
                error!("Configuration error: {msg}");
                ApiError::new(ErrorCode::ConfigError)
            }
        }
    }
}
