//! The sink: durable store plus per-source flat exports
//!
//! Accepted records are written to the store immediately and buffered for
//! the export batch of the source being crawled. After a run over every
//! source, a consolidated export gathers the recent records of all of them.

use crate::article::ArticleRecord;
use crate::output::traits::{ExportFormat, ExportResult};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name stem of the cross-source export
pub const CONSOLIDATED_STEM: &str = "consolidated";

/// What happened to a record handed to [`Sink::append_record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new row was written
    Inserted,
    /// The store already held this URL; nothing was written
    AlreadyStored,
    /// The write failed; the error was logged
    Failed,
}

pub struct Sink<S: Storage> {
    storage: S,
    batch: Vec<ArticleRecord>,
}

impl<S: Storage> Sink<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            batch: Vec::new(),
        }
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Persists one record, ignoring it if its URL is already stored
    ///
    /// A failed write is logged and reported, never propagated: one bad
    /// record must not abort the run.
    pub fn append_record(&mut self, record: ArticleRecord) -> AppendOutcome {
        match self.storage.insert_article(&record) {
            Ok(true) => {
                tracing::debug!("Stored {}", record.url);
                self.batch.push(record);
                AppendOutcome::Inserted
            }
            Ok(false) => {
                tracing::debug!("Already stored: {}", record.url);
                AppendOutcome::AlreadyStored
            }
            Err(e) => {
                tracing::error!("Failed to store {}: {}", record.url, e);
                AppendOutcome::Failed
            }
        }
    }

    /// Records inserted since the last [`Sink::finish_batch`]
    pub fn batch(&self) -> &[ArticleRecord] {
        &self.batch
    }

    /// Writes the current batch to `<dir>/<source_id>_<YYYYMMDD_HHMMSS>.<ext>`
    ///
    /// Returns the written path, or None when the batch is empty.
    pub fn export_batch(
        &self,
        format: ExportFormat,
        dir: &Path,
        source_id: &str,
        at: DateTime<Utc>,
    ) -> ExportResult<Option<PathBuf>> {
        write_export(&self.batch, format, dir, source_id, at)
    }

    /// Writes every stored record extracted since `since`, across sources,
    /// to `<dir>/consolidated_<YYYYMMDD_HHMMSS>.<ext>`
    ///
    /// Returns None when the store holds no such record.
    pub fn export_consolidated(
        &self,
        format: ExportFormat,
        dir: &Path,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> ExportResult<Option<PathBuf>> {
        let records = self.storage.recent_articles(since)?;
        write_export(&records, format, dir, CONSOLIDATED_STEM, at)
    }

    /// Clears the export batch, returning what it held
    pub fn finish_batch(&mut self) -> Vec<ArticleRecord> {
        std::mem::take(&mut self.batch)
    }
}

fn write_export(
    records: &[ArticleRecord],
    format: ExportFormat,
    dir: &Path,
    stem: &str,
    at: DateTime<Utc>,
) -> ExportResult<Option<PathBuf>> {
    if records.is_empty() {
        return Ok(None);
    }

    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(stem, at, format));

    let mut out = BufWriter::new(File::create(&path)?);
    format.exporter().write_records(records, &mut out)?;
    out.flush()?;

    tracing::info!("Exported {} records to {}", records.len(), path.display());
    Ok(Some(path))
}

/// Export file name for a source at a point in time
pub fn export_file_name(source_id: &str, at: DateTime<Utc>, format: ExportFormat) -> String {
    format!(
        "{}_{}.{}",
        source_id,
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}
