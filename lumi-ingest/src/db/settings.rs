//! Settings database operations
//!
//! Key/value accessors over the `settings` table.

use lumi_common::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Default bound on retrying a locked database write
pub const DEFAULT_DB_MAX_LOCK_WAIT_MS: u64 = 5000;

pub async fn get_analysis_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "analysis_api_key").await
}

pub async fn set_analysis_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, "analysis_api_key", key).await
}

/// Maximum time to retry a write on "database is locked"
///
/// **Default:** 5000 ms
pub async fn get_db_max_lock_wait_ms(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, "db_max_lock_wait_ms")
        .await
        .map(|opt| opt.unwrap_or(DEFAULT_DB_MAX_LOCK_WAIT_MS))
}

pub async fn set_db_max_lock_wait_ms(db: &Pool<Sqlite>, value: u64) -> Result<()> {
    set_setting(db, "db_max_lock_wait_ms", value).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting '{}' failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
