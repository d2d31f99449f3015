//! Admin API handlers for license management.
//!
//! Requires the `admin-api` feature. With `jwt-auth` enabled every route here
//! sits behind [`crate::server::auth::require_auth`].
//!
//! # Endpoints
//!
//! - `GET /api/admin/licenses` - List all licenses
//! - `GET /api/admin/licenses/{license_id}` - Get a license by ID
//! - `PUT /api/admin/licenses/{license_id}` - Amend and re-sign a license
//! - `DELETE /api/admin/licenses/{license_id}` - Delete a license
//! - `GET /api/admin/licenses/{license_id}/download` - Download as `.lic`

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::license::LicenseRecord;
use crate::server::api_error::ApiError;
use crate::server::handlers::{json_body, AppState};
use crate::server::logging::{log_license_event, LicenseEvent};
use crate::store::LicenseAmendment;
use crate::validation::{parse_datetime, validate_uuid};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for amending a license. All fields are required.
#[derive(Debug, Deserialize, Serialize)]
pub struct UpdateLicenseRequest {
    pub owner: String,
    pub max_users: i64,
    pub max_messages: i64,
    /// RFC 3339, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`
    pub expires_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateLicenseResponse {
    pub status: String,
    pub license: LicenseRecord,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteLicenseResponse {
    pub status: String,
    pub license_id: String,
}

/// Token subject behind an admin request, `None` when auth is off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor(pub Option<String>);

impl Actor {
    fn audit_detail(&self) -> String {
        format!("by {}", self.0.as_deref().unwrap_or("anonymous"))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    #[allow(unused_variables)]
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        #[cfg(feature = "jwt-auth")]
        {
            let user =
                crate::server::auth::AuthenticatedUser::from_request_parts(parts, state).await;
            Ok(Actor(user.ok().map(|u| u.subject)))
        }
        #[cfg(not(feature = "jwt-auth"))]
        {
            Ok(Actor(None))
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// List every stored license, oldest first.
pub async fn list_licenses_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<LicenseRecord>>, ApiError> {
    let licenses = state.issuance.list().await?;
    info!("Listed {} licenses", licenses.len());
    Ok(Json(licenses))
}

pub async fn get_license_handler(
    State(state): State<AppState>,
    Path(license_id): Path<String>,
) -> Result<Json<LicenseRecord>, ApiError> {
    validate_uuid(&license_id, "license_id")?;
    Ok(Json(state.issuance.get(&license_id).await?))
}

/// Amend a license.
///
/// The record is signed again with the new field values, so previously
/// handed-out envelopes for this id stop verifying.
pub async fn update_license_handler(
    State(state): State<AppState>,
    actor: Actor,
    Path(license_id): Path<String>,
    payload: Result<Json<UpdateLicenseRequest>, JsonRejection>,
) -> Result<Json<UpdateLicenseResponse>, ApiError> {
    validate_uuid(&license_id, "license_id")?;
    let payload = json_body(payload)?;

    let amendment = LicenseAmendment {
        owner: payload.owner,
        max_users: payload.max_users,
        max_messages: payload.max_messages,
        expires_at: parse_datetime(&payload.expires_at, "expires_at")?,
    };

    let license = state.issuance.amend(&license_id, amendment).await?;
    log_license_event(LicenseEvent::Amended, &license_id, Some(&actor.audit_detail()));

    Ok(Json(UpdateLicenseResponse {
        status: "updated".to_string(),
        license,
    }))
}

pub async fn delete_license_handler(
    State(state): State<AppState>,
    actor: Actor,
    Path(license_id): Path<String>,
) -> Result<Json<DeleteLicenseResponse>, ApiError> {
    validate_uuid(&license_id, "license_id")?;
    state.issuance.delete(&license_id).await?;
    log_license_event(LicenseEvent::Deleted, &license_id, Some(&actor.audit_detail()));

    Ok(Json(DeleteLicenseResponse {
        status: "deleted".to_string(),
        license_id,
    }))
}

/// Serve the stored license as an attachment named `license_<id>.lic`.
pub async fn download_license_handler(
    State(state): State<AppState>,
    Path(license_id): Path<String>,
) -> Result<Response, ApiError> {
    validate_uuid(&license_id, "license_id")?;
    let download = state.issuance.download(&license_id).await?;
    log_license_event(LicenseEvent::Downloaded, &license_id, None);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", download.filename),
            ),
        ],
        download.envelope,
    )
        .into_response())
}
