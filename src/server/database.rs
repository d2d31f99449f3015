use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, FromRow};
use tracing::{error, warn};

#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[cfg(feature = "postgres")]
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::license::LicenseRecord;
use crate::store::{LicenseAmendment, LicenseStore};

/// Row shape of the `licenses` table.
#[derive(Debug, Clone, FromRow)]
struct LicenseRow {
    license_id: String,
    owner: String,
    max_users: i64,
    max_messages: i64,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    signature: String,
}

impl From<LicenseRow> for LicenseRecord {
    fn from(row: LicenseRow) -> Self {
        Self {
            owner: row.owner,
            license_id: row.license_id,
            max_users: row.max_users,
            max_messages: row.max_messages,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            signature: row.signature,
        }
    }
}

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS licenses (
        license_id   TEXT PRIMARY KEY,
        owner        TEXT NOT NULL UNIQUE,
        max_users    INTEGER NOT NULL CHECK (max_users > 0),
        max_messages INTEGER NOT NULL CHECK (max_messages > 0),
        issued_at    TEXT NOT NULL,
        expires_at   TEXT NOT NULL,
        signature    TEXT NOT NULL
    )
"#;

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS licenses (
        license_id   TEXT PRIMARY KEY,
        owner        TEXT NOT NULL UNIQUE,
        max_users    BIGINT NOT NULL CHECK (max_users > 0),
        max_messages BIGINT NOT NULL CHECK (max_messages > 0),
        issued_at    TIMESTAMPTZ NOT NULL,
        expires_at   TIMESTAMPTZ NOT NULL,
        signature    TEXT NOT NULL
    )
"#;

const SELECT_COLUMNS: &str =
    "SELECT license_id, owner, max_users, max_messages, issued_at, expires_at, signature FROM licenses";

/// Map a sqlx failure onto the store's error contract.
///
/// Unique violations (owner or id already taken) become `Conflict`; anything
/// else is an opaque `Store` error.
fn map_db_error(op: &str, e: sqlx::Error) -> LicenseError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            warn!("{op} rejected by uniqueness constraint: {db_err}");
            return LicenseError::Conflict(
                "license already exists for this owner".to_string(),
            );
        }
    }
    error!("{op} failed: {e}");
    LicenseError::Store(format!("database error: {e}"))
}

/// SQL-backed license store over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

impl Database {
    /// Connect using the given database configuration.
    ///
    /// In-memory SQLite URLs get a single-connection pool, since every
    /// connection would otherwise see its own empty database.
    pub async fn connect(config: &DatabaseConfig) -> LicenseResult<Self> {
        match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let url = &config.sqlite_url;
                let max_connections = if url.contains(":memory:") { 1 } else { 5 };
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .connect(url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::Store(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Database::SQLite(pool))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::Config(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPool::connect(&config.postgres_url).await.map_err(|e| {
                    error!("Failed to connect to PostgreSQL: {e}");
                    LicenseError::Store(format!("failed to connect to PostgreSQL: {e}"))
                })?;

                Ok(Database::Postgres(pool))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::Config(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::Config(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Backend name, as used in configuration.
    pub fn db_type(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }

    /// Create the `licenses` table if it does not exist.
    pub async fn migrate(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(SQLITE_SCHEMA).execute(pool).await,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(POSTGRES_SCHEMA).execute(pool).await,
        }
        .map_err(|e| map_db_error("migrate", e))?;

        Ok(())
    }
}

#[async_trait]
impl LicenseStore for Database {
    async fn count_active_by_owner(&self, owner: &str) -> LicenseResult<i64> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_scalar::<_, i64>("SELECT COUNT(*) FROM licenses WHERE owner = ?")
                    .bind(owner)
                    .fetch_one(pool)
                    .await
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_scalar::<_, i64>("SELECT COUNT(*) FROM licenses WHERE owner = $1")
                    .bind(owner)
                    .fetch_one(pool)
                    .await
            }
        }
        .map_err(|e| map_db_error("count_active_by_owner", e))
    }

    async fn insert(&self, record: &LicenseRecord) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                r#"
                INSERT INTO licenses (
                    license_id, owner, max_users, max_messages,
                    issued_at, expires_at, signature
                )
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.license_id)
            .bind(&record.owner)
            .bind(record.max_users)
            .bind(record.max_messages)
            .bind(record.issued_at)
            .bind(record.expires_at)
            .bind(&record.signature)
            .execute(pool)
            .await
            .map(|_| ()),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                r#"
                INSERT INTO licenses (
                    license_id, owner, max_users, max_messages,
                    issued_at, expires_at, signature
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&record.license_id)
            .bind(&record.owner)
            .bind(record.max_users)
            .bind(record.max_messages)
            .bind(record.issued_at)
            .bind(record.expires_at)
            .bind(&record.signature)
            .execute(pool)
            .await
            .map(|_| ()),
        }
        .map_err(|e| map_db_error("insert", e))
    }

    async fn list(&self) -> LicenseResult<Vec<LicenseRecord>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY issued_at, license_id");
        let rows = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseRow>(&sql).fetch_all(pool).await,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseRow>(&sql).fetch_all(pool).await,
        }
        .map_err(|e| map_db_error("list", e))?;

        Ok(rows.into_iter().map(LicenseRecord::from).collect())
    }

    async fn get_by_id(&self, license_id: &str) -> LicenseResult<Option<LicenseRecord>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query_as::<_, LicenseRow>(&format!("{SELECT_COLUMNS} WHERE license_id = ?"))
                    .bind(license_id)
                    .fetch_optional(pool)
                    .await
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query_as::<_, LicenseRow>(&format!("{SELECT_COLUMNS} WHERE license_id = $1"))
                    .bind(license_id)
                    .fetch_optional(pool)
                    .await
            }
        }
        .map_err(|e| map_db_error("get_by_id", e))?;

        Ok(row.map(LicenseRecord::from))
    }

    async fn update_fields(
        &self,
        license_id: &str,
        amendment: &LicenseAmendment,
        signature: &str,
    ) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE licenses \
                     SET owner = ?, max_users = ?, max_messages = ?, expires_at = ?, signature = ? \
                     WHERE license_id = ?",
            )
            .bind(&amendment.owner)
            .bind(amendment.max_users)
            .bind(amendment.max_messages)
            .bind(amendment.expires_at)
            .bind(signature)
            .bind(license_id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected()),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE licenses \
                     SET owner = $1, max_users = $2, max_messages = $3, expires_at = $4, signature = $5 \
                     WHERE license_id = $6",
            )
            .bind(&amendment.owner)
            .bind(amendment.max_users)
            .bind(amendment.max_messages)
            .bind(amendment.expires_at)
            .bind(signature)
            .bind(license_id)
            .execute(pool)
            .await
            .map(|r| r.rows_affected()),
        }
        .map_err(|e| map_db_error("update_fields", e))?;

        Ok(rows_affected > 0)
    }

    async fn delete_by_id(&self, license_id: &str) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("DELETE FROM licenses WHERE license_id = ?")
                .bind(license_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query("DELETE FROM licenses WHERE license_id = $1")
                .bind(license_id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        }
        .map_err(|e| map_db_error("delete_by_id", e))?;

        Ok(rows_affected > 0)
    }

    async fn health_check(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("SELECT 1").execute(pool).await.map(|_| ()),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query("SELECT 1").execute(pool).await.map(|_| ()),
        }
        .map_err(|e| map_db_error("health_check", e))
    }
}
