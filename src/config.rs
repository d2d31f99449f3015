//! Configuration system for Licensa.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `LICENSA_SERVER_HOST` - Server bind address
//! - `LICENSA_SERVER_PORT` - Server port
//! - `LICENSA_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `LICENSA_DATABASE_URL` - Database connection URL
//! - `LICENSA_PRIVATE_KEY_PATH` - PKCS#8 PEM signing key
//! - `LICENSA_PUBLIC_KEY_PATH` - PKIX PEM verification key
//! - `LICENSA_CACHE_KEYS` - Read key files once instead of per request
//! - `LICENSA_LOGGING_ENABLED` - Enable logging
//! - `LICENSA_LOG_LEVEL` - Log level (trace, debug, info, warn, error)
//! - `LICENSA_AUTH_ENABLED` - Enable JWT authentication (requires `jwt-auth` feature)
//! - `LICENSA_JWT_SECRET` - JWT secret key for signing/validation
//! - `LICENSA_JWT_ISSUER` - JWT issuer claim
//! - `LICENSA_JWT_AUDIENCE` - JWT audience claim
//! - `LICENSA_TOKEN_EXPIRATION_SECS` - Token expiration time in seconds

use config::{Config, ConfigBuilder};
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<LicensaConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LicensaConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Signing keypair locations
    pub keys: KeysConfig,
    pub logging: LoggingConfig,
    /// JWT authentication configuration (requires "jwt-auth" feature)
    pub auth: AuthConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://licensa.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/licensa".to_string(),
        }
    }
}

/// Key material configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// PKCS#8 PEM private key. May be empty on verify-only deployments.
    pub private_key_path: String,
    /// PKIX PEM public key
    pub public_key_path: String,
    /// Keep keys in memory after the first successful read
    pub cache: bool,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            private_key_path: "keys/private_key.pem".to_string(),
            public_key_path: "keys/public_key.pem".to_string(),
            cache: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

/// JWT authentication configuration.
///
/// Used when the `jwt-auth` feature is enabled.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable JWT authentication for admin endpoints
    pub enabled: bool,
    /// JWT secret key (use `env:VAR_NAME` to read from environment)
    pub jwt_secret: String,
    /// JWT issuer claim (iss)
    pub jwt_issuer: String,
    /// JWT audience claim (aud)
    pub jwt_audience: String,
    /// Token expiration time in seconds (default: 72 hours)
    pub token_expiration_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            jwt_secret: String::new(),
            jwt_issuer: "licensa".to_string(),
            jwt_audience: "licensa-api".to_string(),
            token_expiration_secs: 72 * 3600,
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::Config(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

fn with_defaults<St: config::builder::BuilderState>(
    builder: ConfigBuilder<St>,
) -> LicenseResult<ConfigBuilder<St>> {
    let defaults = LicensaConfig::default();
    builder
        .set_default("server.host", defaults.server.host)
        .map_err(config_err)?
        .set_default("server.port", i64::from(defaults.server.port))
        .map_err(config_err)?
        .set_default("database.db_type", defaults.database.db_type)
        .map_err(config_err)?
        .set_default("database.sqlite_url", defaults.database.sqlite_url)
        .map_err(config_err)?
        .set_default("database.postgres_url", defaults.database.postgres_url)
        .map_err(config_err)?
        .set_default("keys.private_key_path", defaults.keys.private_key_path)
        .map_err(config_err)?
        .set_default("keys.public_key_path", defaults.keys.public_key_path)
        .map_err(config_err)?
        .set_default("keys.cache", defaults.keys.cache)
        .map_err(config_err)?
        .set_default("logging.enabled", defaults.logging.enabled)
        .map_err(config_err)?
        .set_default("logging.level", defaults.logging.level)
        .map_err(config_err)?
        .set_default("auth.enabled", defaults.auth.enabled)
        .map_err(config_err)?
        .set_default("auth.jwt_secret", defaults.auth.jwt_secret)
        .map_err(config_err)?
        .set_default("auth.jwt_issuer", defaults.auth.jwt_issuer)
        .map_err(config_err)?
        .set_default("auth.jwt_audience", defaults.auth.jwt_audience)
        .map_err(config_err)?
        .set_default(
            "auth.token_expiration_secs",
            defaults.auth.token_expiration_secs as i64,
        )
        .map_err(config_err)
}

impl LicensaConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let builder = with_defaults(Config::builder())?
            .add_source(config::File::with_name("config").required(false))
            .set_override_option("server.host", env::var("LICENSA_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option("server.port", env_parsed::<i64>("LICENSA_SERVER_PORT"))
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("LICENSA_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.sqlite_url",
                env::var("LICENSA_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.postgres_url",
                env::var("LICENSA_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option(
                "keys.private_key_path",
                env::var("LICENSA_PRIVATE_KEY_PATH").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "keys.public_key_path",
                env::var("LICENSA_PUBLIC_KEY_PATH").ok(),
            )
            .map_err(config_err)?
            .set_override_option("keys.cache", env_parsed::<bool>("LICENSA_CACHE_KEYS"))
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env_parsed::<bool>("LICENSA_LOGGING_ENABLED"),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("LICENSA_LOG_LEVEL").ok())
            .map_err(config_err)?
            .set_override_option("auth.enabled", env_parsed::<bool>("LICENSA_AUTH_ENABLED"))
            .map_err(config_err)?
            .set_override_option("auth.jwt_secret", env::var("LICENSA_JWT_SECRET").ok())
            .map_err(config_err)?
            .set_override_option("auth.jwt_issuer", env::var("LICENSA_JWT_ISSUER").ok())
            .map_err(config_err)?
            .set_override_option("auth.jwt_audience", env::var("LICENSA_JWT_AUDIENCE").ok())
            .map_err(config_err)?
            .set_override_option(
                "auth.token_expiration_secs",
                env_parsed::<i64>("LICENSA_TOKEN_EXPIRATION_SECS"),
            )
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::Config(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::Config(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::Config(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.keys.public_key_path.trim().is_empty() {
            return Err(LicenseError::Config(
                "keys.public_key_path cannot be empty".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::Config(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        if self.auth.enabled && self.auth.jwt_secret.is_empty() {
            return Err(LicenseError::Config(
                "auth.jwt_secret is required when auth.enabled is true".to_string(),
            ));
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> LicenseResult<&'static LicensaConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = LicensaConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    Ok(CONFIG.get_or_init(|| config))
}
