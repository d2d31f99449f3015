//! Error types shared by the signing core, the store and the HTTP layer.
//!
//! Signature mismatch and expiry are not errors: they are reported through
//! [`crate::verification::VerificationOutcome`].

use thiserror::Error;

use crate::validation::ValidationError;

/// Every failure the license core can produce.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Caller supplied an invalid field value.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The owner already holds a license.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Key material is missing or malformed.
    #[error("key error: {0}")]
    Key(String),

    /// The cryptographic backend failed while signing.
    #[error("signing error: {0}")]
    Signing(String),

    /// The presented envelope could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Opaque persistence failure.
    #[error("store error: {0}")]
    Store(String),

    /// No license exists with the requested id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenient result alias used throughout the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;
