//! Metadata Store connection management.

use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info};

use geovault_core::config::MetadataConfig;
use geovault_core::error::{AppError, ErrorKind};
use geovault_core::result::AppResult;

/// Create a SQLite connection pool from configuration.
pub async fn create_pool(config: &MetadataConfig) -> AppResult<SqlitePool> {
    info!(url = %config.url, "Connecting to metadata store");

    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid metadata store URL: {}", config.url),
                e,
            )
        })?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.connect_timeout_seconds));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .connect_with(options)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Metadata, "Failed to connect to metadata store", e)
        })?;

    debug!("Metadata store connection pool established");
    Ok(pool)
}

/// Create the document table and its indexes if they do not exist.
///
/// The schema is a single generic table: documents are JSON text addressed
/// by `(collection, id)`, with an optional per-collection `unique_key`
/// enforced by a partial unique index.
pub async fn ensure_schema(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection  TEXT NOT NULL,
            id          TEXT NOT NULL,
            unique_key  TEXT,
            doc         TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        AppError::with_source(ErrorKind::Metadata, "Failed to create documents table", e)
    })?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_unique_key
        ON documents (collection, unique_key)
        WHERE unique_key IS NOT NULL
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        AppError::with_source(ErrorKind::Metadata, "Failed to create unique key index", e)
    })?;

    debug!("Metadata store schema ensured");
    Ok(())
}

/// Verify the metadata store is reachable.
pub async fn health_check(pool: &SqlitePool) -> AppResult<bool> {
    let result: Result<(i64,), _> = sqlx::query_as("SELECT 1").fetch_one(pool).await;
    Ok(result.is_ok())
}
