use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use docflow_core::error::{DocflowError, Result};
use docflow_core::traits::CacheStore;
use docflow_core::types::RunLogRecord;

use crate::db;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS summaries (
        file_id TEXT PRIMARY KEY,
        summary TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS run_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id TEXT NOT NULL,
        url TEXT NOT NULL,
        query TEXT NOT NULL,
        lang TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_run_logs_file ON run_logs(file_id, id);";

/// Fixed-width UTC timestamps so stored values compare as strings.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Counts reported by [`SqliteCache::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub summaries: usize,
    /// Stored summaries already past the TTL, awaiting `purge_expired`.
    pub expired: usize,
    pub run_logs: usize,
    pub ttl_days: u32,
}

/// Summary cache with a day-based TTL plus an append-only run log.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    ttl_days: u32,
}

impl SqliteCache {
    pub fn open(path: &Path, ttl_days: u32) -> Result<Self> {
        let conn = db::open(path, SCHEMA)?;
        debug!(path = %path.display(), ttl_days, "Cache opened");
        Ok(Self {
            conn: Mutex::new(conn),
            ttl_days,
        })
    }

    pub fn in_memory(ttl_days: u32) -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(db::in_memory(SCHEMA)?),
            ttl_days,
        })
    }

    fn cutoff(&self) -> String {
        timestamp(Utc::now() - Duration::days(i64::from(self.ttl_days)))
    }

    /// Store a summary as if written at `at`.
    pub fn set_summary_at(&self, id: &str, summary: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO summaries (file_id, summary, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(file_id) DO UPDATE SET summary = excluded.summary, created_at = excluded.created_at",
            params![id, summary, timestamp(at)],
        )
        .map_err(|e| DocflowError::Cache(e.to_string()))?;
        Ok(())
    }

    fn fresh_summary(&self, id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        conn.query_row(
            "SELECT summary FROM summaries WHERE file_id = ?1 AND created_at > ?2",
            params![id, self.cutoff()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| DocflowError::Cache(e.to_string()))
    }

    /// Remove summaries older than the TTL. Returns the number removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        let removed = conn
            .execute(
                "DELETE FROM summaries WHERE created_at <= ?1",
                params![self.cutoff()],
            )
            .map_err(|e| DocflowError::Cache(e.to_string()))?;
        if removed > 0 {
            info!(removed, ttl_days = self.ttl_days, "Purged expired summaries");
        }
        Ok(removed)
    }

    /// Remove one summary. Returns whether it existed.
    pub fn delete_summary(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        let removed = conn
            .execute("DELETE FROM summaries WHERE file_id = ?1", params![id])
            .map_err(|e| DocflowError::Cache(e.to_string()))?;
        Ok(removed > 0)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        let count = |sql: &str, args: &[&dyn rusqlite::ToSql]| -> Result<usize> {
            conn.query_row(sql, args, |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
                .map_err(|e| DocflowError::Cache(e.to_string()))
        };
        let cutoff = self.cutoff();
        Ok(CacheStats {
            summaries: count("SELECT COUNT(*) FROM summaries", &[])?,
            expired: count(
                "SELECT COUNT(*) FROM summaries WHERE created_at <= ?1",
                &[&cutoff],
            )?,
            run_logs: count("SELECT COUNT(*) FROM run_logs", &[])?,
            ttl_days: self.ttl_days,
        })
    }

    /// Run-log lines for one document, oldest first.
    pub fn run_logs(&self, file_id: &str) -> Result<Vec<RunLogRecord>> {
        let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT file_id, url, query, lang, message FROM run_logs
                 WHERE file_id = ?1 ORDER BY id ASC",
            )
            .map_err(|e| DocflowError::Cache(e.to_string()))?;
        let rows = stmt
            .query_map(params![file_id], |row| {
                Ok(RunLogRecord {
                    file_id: row.get(0)?,
                    url: row.get(1)?,
                    query: row.get(2)?,
                    lang: row.get(3)?,
                    message: row.get(4)?,
                })
            })
            .map_err(|e| DocflowError::Cache(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| DocflowError::Cache(e.to_string()))?);
        }
        Ok(records)
    }
}

impl CacheStore for SqliteCache {
    fn get_summary<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<String>>> {
        Box::pin(async move { self.fresh_summary(id) })
    }

    fn set_summary<'a>(&'a self, id: &'a str, summary: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.set_summary_at(id, summary, Utc::now()) })
    }

    fn exists_summary<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.fresh_summary(id)?.is_some()) })
    }

    fn append_run_log(&self, record: RunLogRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| DocflowError::Database(e.to_string()))?;
            conn.execute(
                "INSERT INTO run_logs (file_id, url, query, lang, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.file_id,
                    record.url,
                    record.query,
                    record.lang,
                    record.message,
                    timestamp(Utc::now())
                ],
            )
            .map_err(|e| DocflowError::Cache(e.to_string()))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file_id: &str, message: &str) -> RunLogRecord {
        RunLogRecord {
            file_id: file_id.into(),
            url: "https://example.com/a.pdf".into(),
            query: "SUMMARY_ALL".into(),
            lang: "KO".into(),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn test_summary_round_trip() {
        let cache = SqliteCache::in_memory(7).unwrap();
        assert_eq!(cache.get_summary("f1").await.unwrap(), None);
        assert!(!cache.exists_summary("f1").await.unwrap());

        cache.set_summary("f1", "first").await.unwrap();
        cache.set_summary("f1", "second").await.unwrap();
        assert_eq!(cache.get_summary("f1").await.unwrap().as_deref(), Some("second"));
        assert!(cache.exists_summary("f1").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_summary_is_a_miss() {
        let cache = SqliteCache::in_memory(7).unwrap();
        cache
            .set_summary_at("old", "stale", Utc::now() - Duration::days(8))
            .unwrap();
        cache
            .set_summary_at("recent", "fresh", Utc::now() - Duration::days(6))
            .unwrap();

        assert_eq!(cache.get_summary("old").await.unwrap(), None);
        assert!(!cache.exists_summary("old").await.unwrap());
        assert_eq!(cache.get_summary("recent").await.unwrap().as_deref(), Some("fresh"));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.summaries, 2);
        assert_eq!(stats.expired, 1);

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.stats().unwrap().summaries, 1);
        assert_eq!(cache.purge_expired().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_summary() {
        let cache = SqliteCache::in_memory(7).unwrap();
        cache.set_summary("f1", "s").await.unwrap();
        assert!(cache.delete_summary("f1").unwrap());
        assert!(!cache.delete_summary("f1").unwrap());
        assert_eq!(cache.get_summary("f1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_run_log_is_append_only() {
        let cache = SqliteCache::in_memory(7).unwrap();
        cache.append_run_log(record("f1", "entry")).await.unwrap();
        cache.append_run_log(record("f2", "entry")).await.unwrap();
        cache
            .append_run_log(record("f1", "load attempt 1 [3ms] | embed attempt 1 [9ms]"))
            .await
            .unwrap();

        let logs = cache.run_logs("f1").unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "entry");
        assert!(logs[1].message.starts_with("load attempt 1"));
        assert_eq!(cache.stats().unwrap().run_logs, 3);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docflow.db");
        {
            let cache = SqliteCache::open(&path, 7).unwrap();
            cache.set_summary_at("f1", "kept", Utc::now()).unwrap();
        }
        let cache = SqliteCache::open(&path, 7).unwrap();
        assert_eq!(cache.fresh_summary("f1").unwrap().as_deref(), Some("kept"));
    }
}
