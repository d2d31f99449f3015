use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use licensa::config::{get_config, LicensaConfig};
use licensa::errors::{LicenseError, LicenseResult};
use licensa::keys::{CachedKeyProvider, FileKeyProvider, KeyProvider};
use licensa::server::{build_router, AppState, Database};

fn init_tracing(config: &LicensaConfig) {
    if !config.logging.enabled {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn key_provider(config: &LicensaConfig) -> Arc<dyn KeyProvider> {
    let files = FileKeyProvider::from_config(&config.keys);
    if config.keys.cache {
        Arc::new(CachedKeyProvider::new(files))
    } else {
        Arc::new(files)
    }
}

async fn run() -> LicenseResult<()> {
    let config = get_config()?;
    init_tracing(config);

    #[cfg(feature = "jwt-auth")]
    {
        let args: Vec<String> = std::env::args().collect();
        let cmd = licensa::server::parse_token_command(&args);
        if licensa::server::execute_token_command(&config.auth, cmd)? {
            return Ok(());
        }
    }

    let db = Database::connect(&config.database).await?;
    db.migrate().await?;
    info!("Connected to {} database", db.db_type());

    let keys = key_provider(config);
    match keys.public_key() {
        Ok(public_key) => info!(
            fingerprint = %public_key.fingerprint(),
            bits = public_key.bits(),
            "Loaded verification key"
        ),
        Err(e) => warn!("Verification key not available at startup: {e}"),
    }

    #[allow(unused_mut)]
    let mut state = AppState::new(Arc::new(db), keys);

    #[cfg(feature = "jwt-auth")]
    {
        state = state.with_auth(licensa::server::AuthState::from_config(&config.auth)?);
    }

    if !state.routes_protected() {
        warn!(
            admin_api = cfg!(feature = "admin-api"),
            "Issuing routes are unauthenticated; build with jwt-auth and set LICENSA_AUTH_ENABLED"
        );
    }

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| LicenseError::Config(format!("invalid server address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LicenseError::Config(format!("failed to bind {addr}: {e}")))?;
    info!("Licensa server listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| LicenseError::Config(format!("server error: {e}")))
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Licensa server failed: {e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
