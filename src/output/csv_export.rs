//! Tabular export

use crate::article::ArticleRecord;
use crate::output::traits::{ExportFormat, ExportResult, RecordExporter};
use std::io::Write;

/// Column order of the tabular export
///
/// The content hash is left out; it stays in the JSON export and the store.
pub const CSV_COLUMNS: [&str; 12] = [
    "title",
    "date",
    "time",
    "summary",
    "body",
    "category",
    "author",
    "tags",
    "url",
    "extraction_timestamp",
    "image_urls",
    "source_id",
];

const TAG_SEPARATOR: &str = ", ";
const IMAGE_SEPARATOR: &str = "; ";

/// Writes records as CSV with a header row
///
/// List fields are flattened into one cell each.
pub struct CsvExporter;

impl RecordExporter for CsvExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }

    fn write_records(&self, records: &[ArticleRecord], out: &mut dyn Write) -> ExportResult<()> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(CSV_COLUMNS)?;

        for record in records {
            let tags = record.tags.join(TAG_SEPARATOR);
            let images = record.image_urls.join(IMAGE_SEPARATOR);
            let extracted = record.extraction_timestamp_string();
            writer.write_record([
                record.title.as_str(),
                record.published_date.as_str(),
                record.published_time.as_str(),
                record.summary.as_str(),
                record.body.as_str(),
                record.category.as_str(),
                record.author.as_str(),
                tags.as_str(),
                record.url.as_str(),
                extracted.as_str(),
                images.as_str(),
                record.source_id.as_str(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }
}
