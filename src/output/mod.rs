//! Output module: where accepted records end up
//!
//! This module handles:
//! - The sink writing records to the durable store
//! - Per-source flat exports in CSV and JSON
//! - Statistics read back from the store

mod csv_export;
mod json_export;
mod sink;
pub mod stats;
mod traits;

pub use csv_export::{CsvExporter, CSV_COLUMNS};
pub use json_export::JsonExporter;
pub use sink::{export_file_name, AppendOutcome, Sink, CONSOLIDATED_STEM};
pub use stats::{
    format_statistics, load_statistics, load_statistics_at, print_statistics, StoreStatistics,
};
pub use traits::{ExportError, ExportFormat, ExportResult, RecordExporter};

#[cfg(test)]
pub(crate) fn test_record(url: &str) -> crate::article::ArticleRecord {
    use chrono::TimeZone;

    crate::article::ArticleRecord {
        title: "Título de prueba".to_string(),
        published_date: "2024-03-15".to_string(),
        published_time: "10:30:00".to_string(),
        summary: "Resumen".to_string(),
        body: "Cuerpo del artículo".to_string(),
        category: "Deportes".to_string(),
        author: "María López".to_string(),
        tags: vec!["fútbol".to_string()],
        url: url.to_string(),
        image_urls: vec![],
        extraction_timestamp: chrono::Utc
            .with_ymd_and_hms(2024, 3, 15, 12, 0, 0)
            .unwrap(),
        source_id: "a".to_string(),
        content_hash: crate::article::content_hash("Título de prueba", "Cuerpo del artículo"),
    }
}
