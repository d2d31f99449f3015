use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::issuance::{IssuanceService, IssuedLicense, LicenseRequest};
use crate::keys::KeyProvider;
use crate::server::api_error::{ApiError, ErrorCode};
use crate::server::database::Database;
use crate::envelope;
use crate::server::logging::{
    log_license_event, log_rejected_license, HealthResponse, LicenseEvent,
};
use crate::store::LicenseStore;
use crate::validation::parse_datetime;
use crate::verification::{VerificationOutcome, VerificationService};

#[cfg(feature = "jwt-auth")]
use crate::server::auth::AuthState;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub keys: Arc<dyn KeyProvider>,
    pub issuance: IssuanceService,
    pub verification: VerificationService,
    #[cfg(feature = "jwt-auth")]
    pub auth: AuthState,
}

impl AppState {
    /// Wire both services to `db` and `keys`. Auth starts disabled.
    pub fn new(db: Arc<Database>, keys: Arc<dyn KeyProvider>) -> Self {
        let store: Arc<dyn LicenseStore> = db.clone();
        Self {
            issuance: IssuanceService::new(store, keys.clone()),
            verification: VerificationService::new(keys.clone()),
            db,
            keys,
            #[cfg(feature = "jwt-auth")]
            auth: AuthState::disabled(),
        }
    }

    #[cfg(feature = "jwt-auth")]
    pub fn with_auth(mut self, auth: AuthState) -> Self {
        self.auth = auth;
        self
    }

    /// Whether generate and the admin routes sit behind bearer auth.
    pub fn routes_protected(&self) -> bool {
        #[cfg(feature = "jwt-auth")]
        {
            self.auth.enabled
        }
        #[cfg(not(feature = "jwt-auth"))]
        {
            false
        }
    }
}

/// Usage limits as sent by license clients.
#[derive(Debug, Deserialize, Serialize)]
pub struct AccessLevel {
    pub max_users: i64,
    pub max_messages: i64,
}

/// Request body for `POST /api/license/generate`.
#[derive(Debug, Deserialize, Serialize)]
pub struct GenerateLicenseRequest {
    pub owner: String,
    pub access_level: AccessLevel,
    /// RFC 3339, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`
    pub expiration_date: String,
}

/// Request body for `POST /api/license/verify`.
#[derive(Debug, Deserialize, Serialize)]
pub struct VerifyLicenseRequest {
    pub license_key: String,
}

/// Turn an axum JSON rejection into the standard error body.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::with_message(ErrorCode::InvalidRequest, e.body_text()))
}

/// Issue a new license.
///
/// Returns the envelope on success. Validation failures are 400, an owner
/// that already holds a license is 409.
pub async fn generate_license_handler(
    State(state): State<AppState>,
    payload: Result<Json<GenerateLicenseRequest>, JsonRejection>,
) -> Result<Json<IssuedLicense>, ApiError> {
    let payload = json_body(payload)?;
    info!("Generating license for owner={}", payload.owner);

    let expires_at = parse_datetime(&payload.expiration_date, "expiration_date")?;

    let issued = state
        .issuance
        .generate(LicenseRequest {
            owner: payload.owner,
            max_users: payload.access_level.max_users,
            max_messages: payload.access_level.max_messages,
            expires_at,
        })
        .await?;

    log_license_event(LicenseEvent::Issued, &issued.license_id, None);

    Ok(Json(issued))
}

/// Verify a presented license key.
///
/// All three outcomes are 200 with a `status` field; only a key that cannot
/// be decoded at all is an error (400 `MALFORMED_LICENSE`).
pub async fn verify_license_handler(
    State(state): State<AppState>,
    payload: Result<Json<VerifyLicenseRequest>, JsonRejection>,
) -> Result<Json<VerificationOutcome>, ApiError> {
    let payload = json_body(payload)?;

    let outcome = state.verification.verify(&payload.license_key)?;

    match &outcome {
        VerificationOutcome::Valid { license_id, .. } => {
            log_license_event(LicenseEvent::Verified, license_id, None)
        }
        VerificationOutcome::Expired {
            license_id,
            expires_at,
            ..
        } => log_license_event(
            LicenseEvent::Expired,
            license_id,
            Some(&format!("expired at {expires_at}")),
        ),
        VerificationOutcome::Invalid => log_rejected_license(
            envelope::claimed_license_id(&payload.license_key).as_deref(),
            "signature mismatch",
        ),
    }

    Ok(Json(outcome))
}

/// Liveness and dependency check.
///
/// Returns 200 when healthy, 503 when the database or the verification key
/// is unavailable.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_connected = state.issuance.health_check().await.is_ok();
    let keys_loaded = state.keys.public_key().is_ok();

    let health = HealthResponse::new(db_connected, state.db.db_type(), keys_loaded);
    let status = if db_connected && keys_loaded {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(health))
}
