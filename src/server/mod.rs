// src/server/mod.rs

//! Server-side components for Licensa.
//!
//! This module contains:
//! - `database`   → SQL license store over SQLite/Postgres
//! - `handlers`   → Axum handlers for generate/verify/health
//! - `admin`      → Admin API for license CRUD + download (requires `admin-api` feature)
//! - `routes`     → Router builder
//! - `api_error`  → Standard JSON error body
//! - `logging`    → Request logging middleware and license events
//! - `auth`       → JWT authentication middleware (requires `jwt-auth` feature)
//! - `bootstrap`  → `token create` CLI (requires `jwt-auth` feature)

pub mod api_error;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod routes;

#[cfg(feature = "jwt-auth")]
pub mod auth;

#[cfg(feature = "jwt-auth")]
pub mod bootstrap;

#[cfg(feature = "admin-api")]
pub mod admin;

pub use api_error::{ApiError, ErrorCode};
pub use database::Database;
pub use handlers::{
    generate_license_handler, health_handler, verify_license_handler, AccessLevel, AppState,
    GenerateLicenseRequest, VerifyLicenseRequest,
};
pub use logging::{
    log_license_event, log_rejected_license, request_logging_middleware, LicenseEvent,
};
pub use routes::build_router;

#[cfg(feature = "jwt-auth")]
pub use auth::{require_auth, AuthError, AuthState, AuthenticatedUser, Claims, JwtValidator};

#[cfg(feature = "jwt-auth")]
pub use bootstrap::{execute_token_command, parse_token_command, TokenCommand};

#[cfg(feature = "admin-api")]
pub use admin::{
    delete_license_handler, download_license_handler, get_license_handler, list_licenses_handler,
    update_license_handler, Actor, DeleteLicenseResponse, UpdateLicenseRequest,
    UpdateLicenseResponse,
};
