//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::article::ArticleRecord;
use crate::storage::{RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Backends must be `Send`: the store lives behind the crawl state lock and
/// is reached from worker tasks.
pub trait Storage: Send {
    // ===== Run Management =====

    /// Creates a new crawl run in the `running` state
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    /// * `mode` - Discovery mode of the run (`full` or `incremental`)
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str, mode: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Sets the final status, finish timestamp and inserted count of a run
    fn finish_run(&mut self, run_id: i64, status: RunStatus, inserted: u64)
        -> StorageResult<()>;

    // ===== Articles =====

    /// Inserts an article unless its URL is already stored
    ///
    /// Returns true if a row was inserted, false if the URL already existed.
    fn insert_article(&mut self, record: &ArticleRecord) -> StorageResult<bool>;

    /// Returns true if an article with this URL is stored
    fn contains_article(&self, url: &str) -> StorageResult<bool>;

    /// Gets a stored article by URL
    fn get_article(&self, url: &str) -> StorageResult<Option<ArticleRecord>>;

    /// Gets articles extracted at or after `since`, newest first
    fn recent_articles(&self, since: DateTime<Utc>) -> StorageResult<Vec<ArticleRecord>>;

    // ===== Statistics =====

    /// Gets total article count
    fn count_articles(&self) -> StorageResult<u64>;

    /// Counts stored articles per source id
    fn count_by_source(&self) -> StorageResult<BTreeMap<String, u64>>;

    /// Counts articles extracted at or after `since`
    fn count_since(&self, since: DateTime<Utc>) -> StorageResult<u64>;
}
