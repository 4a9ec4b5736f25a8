//! Profile persistence
//!
//! Upserted independently of scan ingestion.

use crate::models::Profile;
use chrono::{DateTime, SecondsFormat, Utc};
use lumi_common::{Error, Result};
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};

pub async fn upsert_profile(pool: &SqlitePool, profile: &Profile) -> Result<()> {
    let answers = serde_json::to_string(&profile.answers)
        .map_err(|e| Error::Internal(format!("Serialize answers failed: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO profiles (owner_id, onboarding_completed, answers, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(owner_id) DO UPDATE SET
            onboarding_completed = excluded.onboarding_completed,
            answers = excluded.answers,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&profile.owner_id)
    .bind(profile.onboarding_completed)
    .bind(answers)
    .bind(profile.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_profile(pool: &SqlitePool, owner_id: &str) -> Result<Option<Profile>> {
    let row = sqlx::query(
        "SELECT owner_id, onboarding_completed, answers, updated_at FROM profiles WHERE owner_id = ?",
    )
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let answers: String = row.try_get("answers")?;
    let updated_at: String = row.try_get("updated_at")?;
    Ok(Some(Profile {
        owner_id: row.try_get("owner_id")?,
        onboarding_completed: row.try_get("onboarding_completed")?,
        answers: serde_json::from_str::<Map<String, Value>>(&answers)
            .map_err(|e| Error::Internal(format!("Corrupt profile answers: {}", e)))?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Internal(format!("Corrupt profile timestamp: {}", e)))?,
    }))
}

/// `None` when the owner has no profile yet
pub async fn onboarding_completed(pool: &SqlitePool, owner_id: &str) -> Result<Option<bool>> {
    let completed: Option<bool> =
        sqlx::query_scalar("SELECT onboarding_completed FROM profiles WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(pool)
            .await?;
    Ok(completed)
}
