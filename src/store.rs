//! Persistence collaborator for issued licenses.
//!
//! The store owns the one-license-per-owner rule: `insert` must report a
//! duplicate owner as [`LicenseError::Conflict`], distinct from any other
//! failure, because the services' own pre-check is not atomic with the insert.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{LicenseError, LicenseResult};
use crate::license::LicenseRecord;

/// Administrative edit of a stored license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseAmendment {
    pub owner: String,
    pub max_users: i64,
    pub max_messages: i64,
    #[serde(with = "crate::license::rfc3339_utc")]
    pub expires_at: DateTime<Utc>,
}

impl LicenseAmendment {
    /// Apply the amendment to `record`, leaving id, issue time and signature.
    pub fn apply_to(&self, record: &mut LicenseRecord) {
        record.owner = self.owner.clone();
        record.max_users = self.max_users;
        record.max_messages = self.max_messages;
        record.expires_at = self.expires_at;
    }
}

/// Record store used by issuance and the admin API.
#[async_trait]
pub trait LicenseStore: Send + Sync {
    /// Number of stored licenses held by `owner`.
    async fn count_active_by_owner(&self, owner: &str) -> LicenseResult<i64>;

    /// Insert a new record. A duplicate owner or id is a `Conflict`.
    async fn insert(&self, record: &LicenseRecord) -> LicenseResult<()>;

    /// All stored records.
    async fn list(&self) -> LicenseResult<Vec<LicenseRecord>>;

    async fn get_by_id(&self, license_id: &str) -> LicenseResult<Option<LicenseRecord>>;

    /// Overwrite the editable fields and the signature.
    ///
    /// Returns `Ok(false)` if no record has that id.
    async fn update_fields(
        &self,
        license_id: &str,
        amendment: &LicenseAmendment,
        signature: &str,
    ) -> LicenseResult<bool>;

    /// Returns `Ok(false)` if no record has that id.
    async fn delete_by_id(&self, license_id: &str) -> LicenseResult<bool>;

    /// Liveness probe for the backing storage.
    async fn health_check(&self) -> LicenseResult<()> {
        Ok(())
    }
}

/// In-memory store keyed by license id.
///
/// Uniqueness checks and writes happen under one lock, so concurrent inserts
/// for the same owner cannot both succeed.
#[derive(Debug, Default)]
pub struct MemoryStore {
    licenses: Mutex<HashMap<String, LicenseRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> LicenseResult<std::sync::MutexGuard<'_, HashMap<String, LicenseRecord>>> {
        self.licenses
            .lock()
            .map_err(|_| LicenseError::Store("failed to acquire license store lock".into()))
    }
}

#[async_trait]
impl LicenseStore for MemoryStore {
    async fn count_active_by_owner(&self, owner: &str) -> LicenseResult<i64> {
        let db = self.lock()?;
        Ok(db.values().filter(|l| l.owner == owner).count() as i64)
    }

    async fn insert(&self, record: &LicenseRecord) -> LicenseResult<()> {
        let mut db = self.lock()?;

        if db.contains_key(&record.license_id) {
            return Err(LicenseError::Conflict(format!(
                "license id already exists: {}",
                record.license_id
            )));
        }
        if db.values().any(|l| l.owner == record.owner) {
            return Err(LicenseError::Conflict(format!(
                "license already exists for owner '{}'",
                record.owner
            )));
        }

        db.insert(record.license_id.clone(), record.clone());
        Ok(())
    }

    async fn list(&self) -> LicenseResult<Vec<LicenseRecord>> {
        let db = self.lock()?;
        let mut licenses: Vec<LicenseRecord> = db.values().cloned().collect();
        licenses.sort_by(|a, b| {
            a.issued_at
                .cmp(&b.issued_at)
                .then_with(|| a.license_id.cmp(&b.license_id))
        });
        Ok(licenses)
    }

    async fn get_by_id(&self, license_id: &str) -> LicenseResult<Option<LicenseRecord>> {
        let db = self.lock()?;
        Ok(db.get(license_id).cloned())
    }

    async fn update_fields(
        &self,
        license_id: &str,
        amendment: &LicenseAmendment,
        signature: &str,
    ) -> LicenseResult<bool> {
        let mut db = self.lock()?;

        if !db.contains_key(license_id) {
            return Ok(false);
        }
        if db
            .values()
            .any(|l| l.owner == amendment.owner && l.license_id != license_id)
        {
            return Err(LicenseError::Conflict(format!(
                "license already exists for owner '{}'",
                amendment.owner
            )));
        }

        match db.get_mut(license_id) {
            Some(record) => {
                amendment.apply_to(record);
                record.signature = signature.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, license_id: &str) -> LicenseResult<bool> {
        let mut db = self.lock()?;
        Ok(db.remove(license_id).is_some())
    }
}
