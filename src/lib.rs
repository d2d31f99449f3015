//! Licensa - RSA-signed, tamper-evident software licenses
//!
//! A license is a small record (owner, usage limits, validity window) signed
//! with RSA PKCS#1 v1.5 / SHA-256 and handed out as a base64 envelope. Anyone
//! holding the public key can check it offline.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use licensa::issuance::{IssuanceService, LicenseRequest};
//! use licensa::keys::FileKeyProvider;
//! use licensa::store::MemoryStore;
//! use licensa::verification::VerificationService;
//!
//! let keys = Arc::new(FileKeyProvider::new("keys/private_key.pem", "keys/public_key.pem"));
//! let issuer = IssuanceService::new(Arc::new(MemoryStore::new()), keys.clone());
//! let issued = issuer.generate(request).await?;
//!
//! let outcome = VerificationService::new(keys).verify(&issued.license_key)?;
//! assert!(outcome.is_valid());
//! ```
//!
//! # Features
//!
//! - `server` - HTTP server (handlers, database-backed store). Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//! - `admin-api` - License list/get/amend/delete/download endpoints.
//! - `jwt-auth` - JWT bearer auth for the issuing and admin endpoints.
//!
//! ```toml
//! # Library only (no server components)
//! licensa = { version = "0.1", default-features = false }
//!
//! # Server with PostgreSQL, admin API and JWT auth
//! licensa = { version = "0.1", features = ["postgres", "admin-api", "jwt-auth"] }
//! ```

// Core modules (always available)
pub mod config;
pub mod envelope;
pub mod errors;
pub mod issuance;
pub mod keys;
pub mod license;
pub mod signature;
pub mod store;
pub mod validation;
pub mod verification;

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;

pub use errors::{LicenseError, LicenseResult};
pub use license::LicenseRecord;
pub use verification::VerificationOutcome;
