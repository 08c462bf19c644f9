//! Result Store Adapter — persists the final result record and maintains
//! indexes by submitter, creation time, and overall confidence.
//!
//! Grounded on `src/repository/mod.rs` (`connect` with WAL pragmas,
//! `with_retry` exponential backoff on lock contention) and
//! `src/repository/document.rs`'s general shape (SQLite-backed repository,
//! JSON-serialized payload column plus indexed scalar columns for
//! querying), generalized from document metadata to OCR result records.
//! CPU/IO-bound SQLite calls are offloaded to `spawn_blocking` so they
//! never share the async executor, per the concurrency model.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::StoreError;
use crate::model::OcrResult;

/// Aggregate statistics over all stored results.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub total: u64,
    pub completed_last_24h: u64,
    pub avg_confidence: f64,
}

/// Result Store Adapter contract.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist `record` under `job_id`. Fails with `StoreError::Duplicate`
    /// if `job_id` already has a stored record.
    async fn store(&self, job_id: &str, record: &OcrResult) -> Result<String, StoreError>;

    /// Fetch by internal id or by `job_id` (both are accepted; `job_id` is
    /// unique so the lookup is unambiguous).
    async fn get(&self, id_or_job_id: &str) -> Result<Option<OcrResult>, StoreError>;

    /// Apply a partial JSON patch (shallow top-level merge) to a stored
    /// record.
    async fn update(&self, id: &str, patch: serde_json::Value) -> Result<(), StoreError>;

    async fn query_by_submitter(&self, submitter: &str) -> Result<Vec<OcrResult>, StoreError>;

    async fn query_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OcrResult>, StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;
}

/// SQLite-backed default `ResultStore`.
pub struct SqliteResultStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResultStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.to_string()))?;
        }
        let conn = connect(db_path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn connect(db_path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 30000;
        "#,
    )?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS results (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL UNIQUE,
            submitter TEXT NOT NULL,
            created_at TEXT NOT NULL,
            overall_confidence REAL NOT NULL,
            data TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_results_submitter ON results(submitter);
        CREATE INDEX IF NOT EXISTS idx_results_created_at ON results(created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_results_confidence ON results(overall_confidence DESC);
        "#,
    )?;
    Ok(())
}

fn row_to_result(data: String) -> Result<OcrResult, StoreError> {
    serde_json::from_str(&data).map_err(|e| StoreError::Database(e.to_string()))
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn store(&self, job_id: &str, record: &OcrResult) -> Result<String, StoreError> {
        let conn = self.conn.clone();
        let job_id = job_id.to_string();
        let record = record.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM results WHERE job_id = ?1",
                    params![job_id],
                    |row| row.get(0),
                )
                .ok();
            if existing.is_some() {
                return Err(StoreError::Duplicate(job_id));
            }
            let id = uuid::Uuid::new_v4().to_string();
            let data = serde_json::to_string(&record).map_err(|e| StoreError::Database(e.to_string()))?;
            conn.execute(
                "INSERT INTO results (id, job_id, submitter, created_at, overall_confidence, data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    job_id,
                    record.submitter_id,
                    record.created_at.to_rfc3339(),
                    record.overall_confidence,
                    data
                ],
            )?;
            Ok(id)
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn get(&self, id_or_job_id: &str) -> Result<Option<OcrResult>, StoreError> {
        let conn = self.conn.clone();
        let key = id_or_job_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let data: Option<String> = conn
                .query_row(
                    "SELECT data FROM results WHERE id = ?1 OR job_id = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .ok();
            data.map(row_to_result).transpose()
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn update(&self, id: &str, patch: serde_json::Value) -> Result<(), StoreError> {
        let conn = self.conn.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let data: String = conn
                .query_row(
                    "SELECT data FROM results WHERE id = ?1 OR job_id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|_| StoreError::NotFound(id.clone()))?;
            let mut value: serde_json::Value =
                serde_json::from_str(&data).map_err(|e| StoreError::Database(e.to_string()))?;
            if let (Some(obj), Some(patch_obj)) = (value.as_object_mut(), patch.as_object()) {
                for (k, v) in patch_obj {
                    obj.insert(k.clone(), v.clone());
                }
            }
            let merged = serde_json::to_string(&value).map_err(|e| StoreError::Database(e.to_string()))?;
            let confidence = value
                .get("overall_confidence")
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            conn.execute(
                "UPDATE results SET data = ?1, overall_confidence = ?2 WHERE id = ?3 OR job_id = ?3",
                params![merged, confidence, id],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn query_by_submitter(&self, submitter: &str) -> Result<Vec<OcrResult>, StoreError> {
        let conn = self.conn.clone();
        let submitter = submitter.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT data FROM results WHERE submitter = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map(params![submitter], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .map(row_to_result)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn query_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OcrResult>, StoreError> {
        let conn = self.conn.clone();
        let (start, end) = (start.to_rfc3339(), end.to_rfc3339());
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT data FROM results WHERE created_at BETWEEN ?1 AND ?2 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map(params![start, end], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .map(row_to_result)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let total: u64 = conn.query_row("SELECT COUNT(*) FROM results", [], |r| r.get(0))?;
            let avg_confidence: f64 = conn
                .query_row("SELECT COALESCE(AVG(overall_confidence), 0.0) FROM results", [], |r| r.get(0))?;
            let since = (Utc::now() - chrono::Duration::hours(24)).to_rfc3339();
            let completed_last_24h: u64 = conn.query_row(
                "SELECT COUNT(*) FROM results WHERE created_at >= ?1",
                params![since],
                |r| r.get(0),
            )?;
            Ok(StoreStats {
                total,
                completed_last_24h,
                avg_confidence,
            })
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }
}

/// Default database path when none is configured: `./data/results.sqlite3`.
pub fn default_db_path() -> PathBuf {
    PathBuf::from("./data/results.sqlite3")
}
