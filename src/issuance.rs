//! License issuance and administration.
//!
//! `generate` validates the request, signs the canonical form of a fresh
//! record and hands it to the store. Nothing is returned to the caller unless
//! the store accepted the record.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::envelope;
use crate::errors::{LicenseError, LicenseResult};
use crate::keys::KeyProvider;
use crate::license::{canonicalize, LicenseRecord};
use crate::signature;
use crate::store::{LicenseAmendment, LicenseStore};
use crate::validation::{validate_after, validate_owner, validate_positive};

/// Caller input for a new license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRequest {
    pub owner: String,
    pub max_users: i64,
    pub max_messages: i64,
    #[serde(with = "crate::license::rfc3339_utc")]
    pub expires_at: DateTime<Utc>,
}

/// Result of a successful issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedLicense {
    /// The envelope to hand to the licensee.
    pub license_key: String,
    pub license_id: String,
    #[serde(with = "crate::license::rfc3339_utc")]
    pub expires_at: DateTime<Utc>,
}

/// A stored license re-encoded for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseDownload {
    pub filename: String,
    pub envelope: String,
}

/// Issues, amends and serves licenses.
#[derive(Clone)]
pub struct IssuanceService {
    store: Arc<dyn LicenseStore>,
    keys: Arc<dyn KeyProvider>,
}

impl IssuanceService {
    pub fn new(store: Arc<dyn LicenseStore>, keys: Arc<dyn KeyProvider>) -> Self {
        Self { store, keys }
    }

    /// Issue a new signed license for `request.owner`.
    ///
    /// Errors:
    /// - `Validation` for bad input
    /// - `Conflict` if the owner already holds a license
    /// - `Key` / `Signing` if the record cannot be signed
    /// - `Store` if persistence fails
    pub async fn generate(&self, request: LicenseRequest) -> LicenseResult<IssuedLicense> {
        let now = Utc::now();
        let expires_at = request.expires_at.trunc_subsecs(6);
        let request = LicenseRequest {
            owner: request.owner.trim().to_string(),
            ..request
        };

        validate_owner(&request.owner, "owner")?;
        validate_positive(request.max_users, "max_users")?;
        validate_positive(request.max_messages, "max_messages")?;
        validate_after(expires_at, now, "expires_at")?;

        // Advisory only: the store's insert is the authoritative check.
        if self.store.count_active_by_owner(&request.owner).await? > 0 {
            warn!("License already exists for owner={}", request.owner);
            return Err(LicenseError::Conflict(format!(
                "license already exists for owner '{}'",
                request.owner
            )));
        }

        let mut record = LicenseRecord {
            owner: request.owner,
            license_id: Uuid::new_v4().to_string(),
            max_users: request.max_users,
            max_messages: request.max_messages,
            issued_at: now.trunc_subsecs(0),
            expires_at,
            signature: String::new(),
        };
        record.signature = self.sign_record(&record)?;

        self.store.insert(&record).await.map_err(|e| {
            match &e {
                LicenseError::Conflict(_) => {
                    warn!("Concurrent issuance lost for owner={}", record.owner)
                }
                _ => error!(
                    "Failed to persist license_id={}: {e}",
                    record.license_id
                ),
            }
            e
        })?;

        info!(
            "Issued license_id={} owner={} expires_at={}",
            record.license_id, record.owner, record.expires_at
        );

        Ok(IssuedLicense {
            license_key: envelope::encode(&record),
            license_id: record.license_id,
            expires_at: record.expires_at,
        })
    }

    pub async fn list(&self) -> LicenseResult<Vec<LicenseRecord>> {
        self.store.list().await
    }

    pub async fn get(&self, license_id: &str) -> LicenseResult<LicenseRecord> {
        self.store
            .get_by_id(license_id)
            .await?
            .ok_or_else(|| LicenseError::NotFound(format!("license not found: {license_id}")))
    }

    /// Change the editable fields of a license and sign it again.
    ///
    /// The new expiry only has to follow the original issue time, so an
    /// administrator can end a license early.
    pub async fn amend(
        &self,
        license_id: &str,
        amendment: LicenseAmendment,
    ) -> LicenseResult<LicenseRecord> {
        let mut record = self.get(license_id).await?;

        let amendment = LicenseAmendment {
            owner: amendment.owner.trim().to_string(),
            expires_at: amendment.expires_at.trunc_subsecs(6),
            ..amendment
        };

        validate_owner(&amendment.owner, "owner")?;
        validate_positive(amendment.max_users, "max_users")?;
        validate_positive(amendment.max_messages, "max_messages")?;
        validate_after(amendment.expires_at, record.issued_at, "expires_at")?;

        amendment.apply_to(&mut record);
        record.signature = self.sign_record(&record)?;

        if !self
            .store
            .update_fields(license_id, &amendment, &record.signature)
            .await?
        {
            return Err(LicenseError::NotFound(format!(
                "license not found: {license_id}"
            )));
        }

        info!("Amended and re-signed license_id={}", license_id);
        Ok(record)
    }

    pub async fn delete(&self, license_id: &str) -> LicenseResult<()> {
        if self.store.delete_by_id(license_id).await? {
            info!("Deleted license_id={}", license_id);
            Ok(())
        } else {
            Err(LicenseError::NotFound(format!(
                "license not found: {license_id}"
            )))
        }
    }

    /// Re-encode a stored license as a `.lic` download. Does not re-sign.
    pub async fn download(&self, license_id: &str) -> LicenseResult<LicenseDownload> {
        let record = self.get(license_id).await?;
        Ok(LicenseDownload {
            filename: envelope::download_filename(&record.license_id),
            envelope: envelope::encode(&record),
        })
    }

    /// Whether the store is reachable.
    pub async fn health_check(&self) -> LicenseResult<()> {
        self.store.health_check().await
    }

    fn sign_record(&self, record: &LicenseRecord) -> LicenseResult<String> {
        let key = self.keys.private_key()?;
        let signature = signature::sign(&canonicalize(record), &key).map_err(|e| {
            error!("Signing failed for license_id={}: {e}", record.license_id);
            e
        })?;
        Ok(B64.encode(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::StaticKeyProvider;
    use crate::store::MemoryStore;
    use chrono::Duration;

    const PRIVATE_PEM: &str = include_str!("../tests/fixtures/private_key.pem");

    fn service() -> (IssuanceService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(StaticKeyProvider::from_private_pem(PRIVATE_PEM).unwrap());
        (IssuanceService::new(store.clone(), keys), store)
    }

    fn request(owner: &str) -> LicenseRequest {
        LicenseRequest {
            owner: owner.to_string(),
            max_users: 100,
            max_messages: 10000,
            expires_at: Utc::now() + Duration::days(30),
        }
    }

    #[tokio::test]
    async fn generate_persists_signed_record() {
        let (service, store) = service();
        let issued = service.generate(request("Acme Inc")).await.unwrap();

        let stored = store.get_by_id(&issued.license_id).await.unwrap().unwrap();
        assert!(!stored.signature.is_empty());
        assert_eq!(stored.issued_at.timestamp_subsec_nanos(), 0);
        assert_eq!(envelope::decode(&issued.license_key).unwrap(), stored);
        assert_eq!(issued.expires_at, stored.expires_at);
    }

    #[tokio::test]
    async fn rejects_invalid_requests() {
        let (service, store) = service();

        let mut bad = request("  ");
        assert!(matches!(
            service.generate(bad.clone()).await,
            Err(LicenseError::Validation(_))
        ));

        bad = request("Acme Inc");
        bad.max_users = 0;
        assert!(matches!(
            service.generate(bad).await,
            Err(LicenseError::Validation(e)) if e.field == "max_users"
        ));

        bad = request("Acme Inc");
        bad.max_messages = -1;
        assert!(matches!(
            service.generate(bad).await,
            Err(LicenseError::Validation(e)) if e.field == "max_messages"
        ));

        bad = request("Acme Inc");
        bad.expires_at = Utc::now() - Duration::seconds(1);
        assert!(matches!(
            service.generate(bad).await,
            Err(LicenseError::Validation(e)) if e.field == "expires_at"
        ));

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_license_for_owner_conflicts() {
        let (service, _) = service();
        service.generate(request("Acme Inc")).await.unwrap();

        assert!(matches!(
            service.generate(request("Acme Inc")).await,
            Err(LicenseError::Conflict(_))
        ));
        service.generate(request("Globex")).await.unwrap();
    }

    #[tokio::test]
    async fn owner_is_trimmed_before_uniqueness_check() {
        let (service, store) = service();
        let issued = service.generate(request("  Acme Inc ")).await.unwrap();

        let stored = store.get_by_id(&issued.license_id).await.unwrap().unwrap();
        assert_eq!(stored.owner, "Acme Inc");
        assert!(matches!(
            service.generate(request("Acme Inc")).await,
            Err(LicenseError::Conflict(_))
        ));

        let other = service.generate(request("Globex")).await.unwrap();
        let result = service
            .amend(
                &other.license_id,
                LicenseAmendment {
                    owner: "Acme Inc\t".to_string(),
                    max_users: 1,
                    max_messages: 1,
                    expires_at: other.expires_at,
                },
            )
            .await;
        assert!(matches!(result, Err(LicenseError::Conflict(_))));
    }

    #[tokio::test]
    async fn key_failure_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let public_only = StaticKeyProvider::verify_only(
            crate::signature::PrivateKey::from_pem(PRIVATE_PEM)
                .unwrap()
                .public_key()
                .clone(),
        );
        let service = IssuanceService::new(store.clone(), Arc::new(public_only));

        assert!(matches!(
            service.generate(request("Acme Inc")).await,
            Err(LicenseError::Key(_))
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn amend_resigns_and_delete_removes() {
        let (service, _) = service();
        let issued = service.generate(request("Acme Inc")).await.unwrap();
        let original = service.get(&issued.license_id).await.unwrap();

        let amended = service
            .amend(
                &issued.license_id,
                LicenseAmendment {
                    owner: "Acme Inc".to_string(),
                    max_users: 999,
                    max_messages: 10000,
                    expires_at: original.expires_at,
                },
            )
            .await
            .unwrap();

        assert_eq!(amended.max_users, 999);
        assert_ne!(amended.signature, original.signature);
        assert_eq!(service.get(&issued.license_id).await.unwrap(), amended);

        service.delete(&issued.license_id).await.unwrap();
        assert!(matches!(
            service.get(&issued.license_id).await,
            Err(LicenseError::NotFound(_))
        ));
        assert!(matches!(
            service.delete(&issued.license_id).await,
            Err(LicenseError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn amend_rejects_expiry_before_issue() {
        let (service, _) = service();
        let issued = service.generate(request("Acme Inc")).await.unwrap();
        let record = service.get(&issued.license_id).await.unwrap();

        let result = service
            .amend(
                &issued.license_id,
                LicenseAmendment {
                    owner: record.owner.clone(),
                    max_users: 1,
                    max_messages: 1,
                    expires_at: record.issued_at,
                },
            )
            .await;
        assert!(matches!(result, Err(LicenseError::Validation(_))));
    }

    #[tokio::test]
    async fn download_reencodes_stored_record() {
        let (service, _) = service();
        let issued = service.generate(request("Acme Inc")).await.unwrap();

        let download = service.download(&issued.license_id).await.unwrap();
        assert_eq!(
            download.filename,
            format!("license_{}.lic", issued.license_id)
        );
        assert_eq!(
            envelope::decode(&download.envelope).unwrap(),
            envelope::decode(&issued.license_key).unwrap()
        );
        assert!(matches!(
            service.download("missing").await,
            Err(LicenseError::NotFound(_))
        ));
    }
}
