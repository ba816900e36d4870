//! SQLite storage for the local backend.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Row};
use std::path::Path;

use crate::constants::EXPECTED_DB_VERSION;
use crate::queries::{ddl, metadata};

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

const VERSION_KEY: &str = "version";

/// Open a file-based database pool, creating the file if needed.
/// Enables WAL mode and foreign keys
pub async fn open_database(db_path: &Path) -> Result<SqlitePool, DynError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        // REGEXP backs the case-insensitive Contains filter
        .with_regexp();

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Create tables and indexes, and stamp the schema version on a fresh database
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), DynError> {
    for statement in ddl::all_statements() {
        sqlx::query(&statement).execute(pool).await?;
    }
    insert_metadata_or_ignore(pool, VERSION_KEY, EXPECTED_DB_VERSION).await?;
    Ok(())
}

/// Query a single metadata value by key
pub async fn query_metadata<'e, E>(executor: E, key: &str) -> Result<Option<String>, DynError>
where
    E: Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = metadata::select_by_key(key);
    let result = sqlx::query(&sql).fetch_optional(executor).await?;
    Ok(result.map(|row| row.get::<String, _>(0)))
}

pub async fn insert_metadata_or_ignore<'e, E>(
    executor: E,
    key: &str,
    value: &str,
) -> Result<(), DynError>
where
    E: Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = metadata::insert_or_ignore(key, value);
    sqlx::query(&sql).execute(executor).await?;
    Ok(())
}

/// Update or insert a metadata key-value pair
pub async fn upsert_metadata<'e, E>(executor: E, key: &str, value: &str) -> Result<(), DynError>
where
    E: Executor<'e, Database = sqlx::Sqlite>,
{
    let sql = metadata::upsert(key, value);
    sqlx::query(&sql).execute(executor).await?;
    Ok(())
}

/// Refuse databases that were never initialized or carry another schema version
pub async fn check_database_version(pool: &SqlitePool) -> Result<(), DynError> {
    let version = match query_metadata(pool, VERSION_KEY).await {
        Ok(version) => version,
        Err(e) => {
            return Err(format!(
                "Database is not initialized ({}). Run `sign_admin init-db` first.",
                e
            )
            .into())
        }
    };
    match version {
        Some(v) if v == EXPECTED_DB_VERSION => Ok(()),
        Some(v) => Err(format!(
            "Unsupported database version: expected '{}', found '{}'",
            EXPECTED_DB_VERSION, v
        )
        .into()),
        None => Err("Database has no version metadata. Run `sign_admin init-db` first.".into()),
    }
}

/// Create an initialized database in a temporary directory for tests.
/// The directory is removed when the returned guard is dropped
pub async fn create_test_database() -> Result<(SqlitePool, tempfile::TempDir), DynError> {
    let dir = tempfile::tempdir()?;
    let pool = open_database(&dir.path().join("admin.sqlite")).await?;
    init_database_schema(&pool).await?;
    Ok((pool, dir))
}
