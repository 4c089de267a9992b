//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::article::ArticleRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use crate::HarvestError;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, mode, status, inserted";

const ARTICLE_COLUMNS: &str = "title, published_date, published_time, summary, body, category, \
     author, tags, url, image_urls, extraction_timestamp, source_id, content_hash";

/// Fixed-width UTC form, so stored timestamps order correctly as text
fn timestamp_key(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// Parent directories of `path` are created when missing.
    pub fn new(path: &Path) -> Result<Self, HarvestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        // Initialize schema
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, HarvestError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        mode: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
        inserted: row.get::<_, i64>(6)?.max(0) as u64,
    })
}

/// Raw article row; list and timestamp columns are decoded afterwards
struct ArticleRow {
    record: ArticleRecord,
    tags: String,
    image_urls: String,
    extraction_timestamp: String,
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<ArticleRow> {
    Ok(ArticleRow {
        record: ArticleRecord {
            title: row.get(0)?,
            published_date: row.get(1)?,
            published_time: row.get(2)?,
            summary: row.get(3)?,
            body: row.get(4)?,
            category: row.get(5)?,
            author: row.get(6)?,
            tags: Vec::new(),
            url: row.get(8)?,
            image_urls: Vec::new(),
            extraction_timestamp: DateTime::<Utc>::MIN_UTC,
            source_id: row.get(11)?,
            content_hash: row.get(12)?,
        },
        tags: row.get(7)?,
        image_urls: row.get(9)?,
        extraction_timestamp: row.get(10)?,
    })
}

impl ArticleRow {
    fn decode(self) -> StorageResult<ArticleRecord> {
        let mut record = self.record;
        record.tags = serde_json::from_str(&self.tags)
            .map_err(|e| StorageError::Serialization(format!("tags: {}", e)))?;
        record.image_urls = serde_json::from_str(&self.image_urls)
            .map_err(|e| StorageError::Serialization(format!("image_urls: {}", e)))?;
        record.extraction_timestamp = DateTime::parse_from_rfc3339(&self.extraction_timestamp)
            .map_err(|e| StorageError::Serialization(format!("extraction_timestamp: {}", e)))?
            .with_timezone(&Utc);
        Ok(record)
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, mode: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, mode, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, config_hash, mode, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))?;

        stmt.query_row(params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY id DESC LIMIT 1",
            RUN_COLUMNS
        ))?;

        let run = stmt.query_row([], run_from_row).optional()?;

        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        inserted: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, inserted = ?3 WHERE id = ?4",
            params![status.to_db_string(), now, inserted as i64, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Articles =====

    fn insert_article(&mut self, record: &ArticleRecord) -> StorageResult<bool> {
        let tags = serde_json::to_string(&record.tags)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let image_urls = serde_json::to_string(&record.image_urls)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let inserted = self.conn.execute(
            &format!(
                "INSERT OR IGNORE INTO articles ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                ARTICLE_COLUMNS
            ),
            params![
                record.title,
                record.published_date,
                record.published_time,
                record.summary,
                record.body,
                record.category,
                record.author,
                tags,
                record.url,
                image_urls,
                timestamp_key(&record.extraction_timestamp),
                record.source_id,
                record.content_hash,
            ],
        )?;

        Ok(inserted > 0)
    }

    fn contains_article(&self, url: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM articles WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_article(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM articles WHERE url = ?1",
            ARTICLE_COLUMNS
        ))?;

        match stmt.query_row(params![url], article_from_row).optional()? {
            Some(row) => Ok(Some(row.decode()?)),
            None => Ok(None),
        }
    }

    fn recent_articles(&self, since: DateTime<Utc>) -> StorageResult<Vec<ArticleRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM articles WHERE extraction_timestamp >= ?1 \
             ORDER BY extraction_timestamp DESC, id DESC",
            ARTICLE_COLUMNS
        ))?;

        let rows = stmt.query_map(params![timestamp_key(&since)], article_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }

    // ===== Statistics =====

    fn count_articles(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_by_source(&self) -> StorageResult<BTreeMap<String, u64>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, COUNT(*) FROM articles GROUP BY source_id ORDER BY source_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (source, count) = row?;
            counts.insert(source, count as u64);
        }
        Ok(counts)
    }

    fn count_since(&self, since: DateTime<Utc>) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM articles WHERE extraction_timestamp >= ?1",
            params![timestamp_key(&since)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
