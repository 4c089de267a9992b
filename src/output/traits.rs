//! Export traits and error types
//!
//! This module defines the trait interface for flat exporters and the
//! formats a run can write.

use crate::article::ArticleRecord;
use serde::Deserialize;
use std::fmt;
use std::io::Write;
use thiserror::Error;

/// Errors that can occur while writing an export
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for export operations
pub type ExportResult<T> = Result<T, ExportError>;

/// Flat export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// File extension, without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// Returns the exporter writing this format
    pub fn exporter(&self) -> Box<dyn RecordExporter> {
        match self {
            Self::Csv => Box::new(super::csv_export::CsvExporter),
            Self::Json => Box::new(super::json_export::JsonExporter),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Trait for flat exporters
///
/// An exporter writes a batch of records mirroring the durable store's
/// field set.
pub trait RecordExporter {
    /// The format this exporter writes
    fn format(&self) -> ExportFormat;

    /// Writes `records` to `out`
    ///
    /// # Arguments
    ///
    /// * `records` - Records in the order they were accepted
    /// * `out` - Destination writer
    fn write_records(&self, records: &[ArticleRecord], out: &mut dyn Write) -> ExportResult<()>;
}
