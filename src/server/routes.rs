use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::server::handlers::{
    generate_license_handler, health_handler, verify_license_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

#[cfg(feature = "admin-api")]
use crate::server::admin::{
    delete_license_handler, download_license_handler, get_license_handler, list_licenses_handler,
    update_license_handler,
};

#[cfg(feature = "jwt-auth")]
use crate::server::auth::require_auth;

/// Build the main application router for the Licensa server.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /api/license/verify` - Verify a license key
///
/// ## Protected (JWT when `jwt-auth` is enabled and configured)
/// - `POST /api/license/generate` - Issue a license
///
/// ## Admin endpoints (requires `admin-api` feature, protected)
/// - `GET /api/admin/licenses` - List licenses
/// - `GET /api/admin/licenses/{license_id}` - Get a license
/// - `PUT /api/admin/licenses/{license_id}` - Amend and re-sign a license
/// - `DELETE /api/admin/licenses/{license_id}` - Delete a license
/// - `GET /api/admin/licenses/{license_id}/download` - Download `.lic` file
pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/api/license/verify", post(verify_license_handler));

    let protected = Router::new().route("/api/license/generate", post(generate_license_handler));

    #[cfg(feature = "admin-api")]
    let protected = protected
        .route("/api/admin/licenses", get(list_licenses_handler))
        .route(
            "/api/admin/licenses/:license_id",
            get(get_license_handler)
                .put(update_license_handler)
                .delete(delete_license_handler),
        )
        .route(
            "/api/admin/licenses/:license_id/download",
            get(download_license_handler),
        );

    #[cfg(feature = "jwt-auth")]
    let protected = if state.auth.enabled {
        protected.route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ))
    } else {
        protected
    };

    public
        .merge(protected)
        .layer(middleware::from_fn(request_logging_middleware))
        .with_state(state)
}
