//! Request logging middleware and license audit events.
//!
//! Every request gets an id (the caller's `X-Request-Id` or a fresh UUID), a
//! tracing span carrying method and path, and the id echoed back in the
//! response headers. License lifecycle changes are
//! logged through [`log_license_event`] inside that span.
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::middleware;
//! use licensa::server::logging::request_logging_middleware;
//!
//! let app = Router::new()
//!     .route("/health", get(health_handler))
//!     .layer(middleware::from_fn(request_logging_middleware));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// License lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// A new license was signed and stored
    Issued,
    /// A presented license verified as valid
    Verified,
    /// A presented license failed signature verification
    Rejected,
    /// A presented license was authentic but expired
    Expired,
    /// An administrator changed and re-signed a license
    Amended,
    /// An administrator deleted a license
    Deleted,
    /// A stored license was downloaded as a `.lic` file
    Downloaded,
}

impl LicenseEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseEvent::Issued => "issued",
            LicenseEvent::Verified => "verified",
            LicenseEvent::Rejected => "rejected",
            LicenseEvent::Expired => "expired",
            LicenseEvent::Amended => "amended",
            LicenseEvent::Deleted => "deleted",
            LicenseEvent::Downloaded => "downloaded",
        }
    }

    fn is_warning(self) -> bool {
        matches!(self, LicenseEvent::Rejected)
    }
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log a license lifecycle event.
///
/// Rejections are logged at `warn`; everything else at `info`. Envelopes that
/// fail verification go through [`log_rejected_license`] instead.
pub fn log_license_event(event: LicenseEvent, license_id: &str, details: Option<&str>) {
    let details = details.unwrap_or("");
    if event.is_warning() {
        warn!(event = event.as_str(), license_id, reason = details, "license {}", event);
    } else {
        info!(event = event.as_str(), license_id, details, "license {}", event);
    }
}

/// Log an envelope that failed signature verification.
///
/// The id comes from the untrusted envelope, so it is recorded as
/// `claimed_license_id` rather than `license_id`.
pub fn log_rejected_license(claimed_license_id: Option<&str>, reason: &str) {
    warn!(
        event = LicenseEvent::Rejected.as_str(),
        claimed_license_id = claimed_license_id.unwrap_or("<undecodable>"),
        reason,
        "license {}",
        LicenseEvent::Rejected
    );
}

/// Response header echoing the request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Longest caller-supplied request id that is propagated unchanged.
const MAX_INBOUND_REQUEST_ID: usize = 64;

pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Reuse the caller's `X-Request-Id` when it is short printable ASCII,
/// otherwise mint a fresh UUID.
fn request_id_for(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| {
            !id.is_empty()
                && id.len() <= MAX_INBOUND_REQUEST_ID
                && id.bytes().all(|b| b.is_ascii_graphic())
        })
        .map(str::to_string)
        .unwrap_or_else(generate_request_id)
}

/// Wraps each request in a `request` span, logs its outcome and latency,
/// and stamps the id on the response.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response<Body> {
    let request_id = request_id_for(&request);
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let started = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    span.in_scope(|| {
        if response.status().is_server_error() {
            warn!(status, elapsed_ms, "request failed");
        } else {
            info!(status, elapsed_ms, "request served");
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Body of `GET /health`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Service status ("healthy" or "degraded")
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: DatabaseHealth,
    /// Whether the verification key could be loaded
    pub keys_loaded: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseHealth {
    pub connected: bool,
    /// `sqlite` or `postgres`
    pub db_type: String,
}

impl HealthResponse {
    pub fn new(db_connected: bool, db_type: &str, keys_loaded: bool) -> Self {
        let healthy = db_connected && keys_loaded;
        Self {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            service: "licensa".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                connected: db_connected,
                db_type: db_type.to_string(),
            },
            keys_loaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_id(id: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/health");
        if let Some(id) = id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn fresh_request_id_is_uuid() {
        assert!(Uuid::parse_str(&request_id_for(&request_with_id(None))).is_ok());
    }

    #[test]
    fn inbound_request_id_is_reused_when_sane() {
        assert_eq!(request_id_for(&request_with_id(Some("lb-7f3a"))), "lb-7f3a");

        let oversized = "x".repeat(MAX_INBOUND_REQUEST_ID + 1);
        let replaced = request_id_for(&request_with_id(Some(&oversized)));
        assert!(Uuid::parse_str(&replaced).is_ok());
    }

    #[test]
    fn event_names() {
        assert_eq!(LicenseEvent::Issued.to_string(), "issued");
        assert_eq!(LicenseEvent::Rejected.to_string(), "rejected");
        assert_eq!(LicenseEvent::Downloaded.to_string(), "downloaded");
    }

    #[test]
    fn health_response_healthy() {
        let health = HealthResponse::new(true, "sqlite", true);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.service, "licensa");
        assert!(health.database.connected);
    }

    #[test]
    fn health_response_degraded() {
        assert_eq!(HealthResponse::new(false, "postgres", true).status, "degraded");
        assert_eq!(HealthResponse::new(true, "sqlite", false).status, "degraded");
    }
}
