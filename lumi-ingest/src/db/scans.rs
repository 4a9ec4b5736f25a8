//! Scan record persistence
//!
//! Rows are written once by the pipeline's persist step and never updated.

use crate::models::{Classification, ScanRecord};
use crate::utils::retry_on_lock;
use crate::workflow::ScanStore;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use lumi_common::score::ScoreVector;
use lumi_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

pub async fn insert_scan(pool: &SqlitePool, record: &ScanRecord) -> Result<()> {
    let score_vector = serde_json::to_string(&record.score_vector)
        .map_err(|e| Error::Internal(format!("Serialize score vector failed: {}", e)))?;
    let notes = serde_json::to_string(&record.analysis_notes)
        .map_err(|e| Error::Internal(format!("Serialize analysis notes failed: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO scans (
            id, owner_id, front_image_ref, side_image_ref, classification,
            score_vector, overall, analysis_notes, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.id.to_string())
    .bind(&record.owner_id)
    .bind(&record.front_image_ref)
    .bind(&record.side_image_ref)
    .bind(record.classification.as_str())
    .bind(score_vector)
    .bind(i64::from(record.score_vector.overall()))
    .bind(notes)
    .bind(record.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_scan(pool: &SqlitePool, id: Uuid) -> Result<Option<ScanRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, owner_id, front_image_ref, side_image_ref, classification,
               score_vector, analysis_notes, created_at
        FROM scans WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| scan_from_row(&r)).transpose()
}

/// All scans of `owner_id`, newest first
pub async fn list_scans(pool: &SqlitePool, owner_id: &str) -> Result<Vec<ScanRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, owner_id, front_image_ref, side_image_ref, classification,
               score_vector, analysis_notes, created_at
        FROM scans WHERE owner_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(scan_from_row).collect()
}

pub async fn count_scans(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scans")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn scan_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScanRecord> {
    let id: String = row.try_get("id")?;
    let classification: String = row.try_get("classification")?;
    let score_vector: String = row.try_get("score_vector")?;
    let notes: String = row.try_get("analysis_notes")?;
    let created_at: String = row.try_get("created_at")?;

    let corrupt = |what: &str, detail: String| {
        Error::Internal(format!("Corrupt scan row {}: {} ({})", id, what, detail))
    };

    Ok(ScanRecord {
        id: Uuid::parse_str(&id).map_err(|e| corrupt("id", e.to_string()))?,
        owner_id: row.try_get("owner_id")?,
        front_image_ref: row.try_get("front_image_ref")?,
        side_image_ref: row.try_get("side_image_ref")?,
        classification: Classification::parse(&classification)
            .ok_or_else(|| corrupt("classification", classification.clone()))?,
        score_vector: serde_json::from_str::<ScoreVector>(&score_vector)
            .map_err(|e| corrupt("score_vector", e.to_string()))?,
        analysis_notes: serde_json::from_str::<BTreeMap<String, String>>(&notes)
            .map_err(|e| corrupt("analysis_notes", e.to_string()))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt("created_at", e.to_string()))?,
    })
}

/// [`ScanStore`] over the `scans` table.
///
/// One `insert_scan` call is one Persist attempt. While SQLite reports
/// the database as locked the INSERT has not run, so waiting out the lock
/// (bounded by `max_lock_wait_ms`) stays inside that attempt. Any other
/// failure is returned at once.
#[derive(Clone)]
pub struct SqliteScanStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteScanStore {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }
}

#[async_trait]
impl ScanStore for SqliteScanStore {
    async fn insert_scan(&self, record: &ScanRecord) -> Result<()> {
        let pool = &self.pool;
        retry_on_lock("scan insert", self.max_lock_wait_ms, move || {
            insert_scan(pool, record)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use chrono::Duration;

    fn record(owner_id: &str, created_at: DateTime<Utc>) -> ScanRecord {
        let id = Uuid::new_v4();
        ScanRecord {
            id,
            owner_id: owner_id.to_string(),
            front_image_ref: format!("{}/{}/front.jpg", owner_id, id),
            side_image_ref: format!("{}/{}/side.jpg", owner_id, id),
            classification: Classification::Male,
            score_vector: ScoreVector::from_aspects(70, 60, 65, 80, 75, 50),
            analysis_notes: BTreeMap::from([("jaw".to_string(), "defined".to_string())]),
            created_at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = init_memory_pool().await.unwrap();
        let scan = record("owner-1", Utc::now());

        insert_scan(&pool, &scan).await.unwrap();

        let loaded = get_scan(&pool, scan.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, scan.id);
        assert_eq!(loaded.score_vector, scan.score_vector);
        assert_eq!(loaded.analysis_notes, scan.analysis_notes);
        assert_eq!(loaded.classification, Classification::Male);
        assert_eq!(get_scan(&pool, Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_returns_non_lock_failure_without_waiting() {
        let pool = init_memory_pool().await.unwrap();
        let store = SqliteScanStore::new(pool.clone(), 5_000);
        let scan = record("owner-1", Utc::now());
        store.insert_scan(&scan).await.unwrap();

        let started = std::time::Instant::now();
        assert!(store.insert_scan(&scan).await.is_err());
        assert!(started.elapsed() < std::time::Duration::from_millis(500));
        assert_eq!(count_scans(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let pool = init_memory_pool().await.unwrap();
        let scan = record("owner-1", Utc::now());
        insert_scan(&pool, &scan).await.unwrap();

        assert!(matches!(
            insert_scan(&pool, &scan).await,
            Err(Error::Database(_))
        ));
        assert_eq!(count_scans(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_is_per_owner_newest_first() {
        let pool = init_memory_pool().await.unwrap();
        let now = Utc::now();
        let older = record("owner-1", now - Duration::minutes(5));
        let newer = record("owner-1", now);
        insert_scan(&pool, &older).await.unwrap();
        insert_scan(&pool, &newer).await.unwrap();
        insert_scan(&pool, &record("owner-2", now)).await.unwrap();

        let ids: Vec<_> = list_scans(&pool, "owner-1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_stored_overall_is_recomputed_on_read() {
        let pool = init_memory_pool().await.unwrap();
        let scan = record("owner-1", Utc::now());
        insert_scan(&pool, &scan).await.unwrap();

        sqlx::query("UPDATE scans SET score_vector = json_set(score_vector, '$.overall', 100)")
            .execute(&pool)
            .await
            .unwrap();

        let loaded = get_scan(&pool, scan.id).await.unwrap().unwrap();
        assert_eq!(loaded.score_vector.overall(), scan.score_vector.overall());
    }

    #[tokio::test]
    async fn test_scan_store_trait_inserts() {
        let pool = init_memory_pool().await.unwrap();
        let store = SqliteScanStore::new(pool.clone(), 100);
        store.insert_scan(&record("owner-1", Utc::now())).await.unwrap();
        assert_eq!(count_scans(&pool).await.unwrap(), 1);
    }
}
