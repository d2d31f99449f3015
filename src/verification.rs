//! Offline license verification.
//!
//! Verification never consults the store: the envelope carries everything
//! needed, and the public key decides whether to trust it. A bad signature is
//! reported as [`VerificationOutcome::Invalid`] before expiry is looked at,
//! since the expiry of a forged record means nothing.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::envelope;
use crate::errors::LicenseResult;
use crate::keys::KeyProvider;
use crate::license::canonicalize;
use crate::signature;

/// Classification of a presented envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerificationOutcome {
    /// Authentic and within its validity window.
    Valid {
        license_id: String,
        owner: String,
        max_users: i64,
        max_messages: i64,
        #[serde(with = "crate::license::rfc3339_utc")]
        expires_at: DateTime<Utc>,
    },
    /// Authentic but past `expires_at`.
    Expired {
        license_id: String,
        owner: String,
        #[serde(with = "crate::license::rfc3339_utc")]
        expires_at: DateTime<Utc>,
    },
    /// Signature does not match the record.
    Invalid,
}

impl VerificationOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            VerificationOutcome::Valid { .. } => "valid",
            VerificationOutcome::Expired { .. } => "expired",
            VerificationOutcome::Invalid => "invalid",
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationOutcome::Valid { .. })
    }
}

/// Checks envelopes against the public key.
#[derive(Clone)]
pub struct VerificationService {
    keys: Arc<dyn KeyProvider>,
}

impl VerificationService {
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self { keys }
    }

    /// Verify `envelope` against the current time.
    ///
    /// Errors are limited to a malformed envelope (`Decode`) and unusable key
    /// material (`Key`); every other result is an outcome.
    pub fn verify(&self, envelope: &str) -> LicenseResult<VerificationOutcome> {
        self.verify_at(envelope, Utc::now())
    }

    /// Verify `envelope` as of `now`.
    pub fn verify_at(
        &self,
        envelope: &str,
        now: DateTime<Utc>,
    ) -> LicenseResult<VerificationOutcome> {
        let record = envelope::decode(envelope)?;
        let public_key = self.keys.public_key()?;

        let authentic = match B64.decode(record.signature.trim()) {
            Ok(sig) => signature::verify(&canonicalize(&record), &sig, &public_key),
            Err(e) => {
                debug!("Signature of license_id={} is not base64: {e}", record.license_id);
                false
            }
        };

        if !authentic {
            warn!("Invalid signature for license_id={}", record.license_id);
            return Ok(VerificationOutcome::Invalid);
        }

        if record.is_expired_at(now) {
            return Ok(VerificationOutcome::Expired {
                license_id: record.license_id,
                owner: record.owner,
                expires_at: record.expires_at,
            });
        }

        Ok(VerificationOutcome::Valid {
            license_id: record.license_id,
            owner: record.owner,
            max_users: record.max_users,
            max_messages: record.max_messages,
            expires_at: record.expires_at,
        })
    }
}
