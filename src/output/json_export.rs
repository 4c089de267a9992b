//! Structured export

use crate::article::ArticleRecord;
use crate::output::traits::{ExportFormat, ExportResult, RecordExporter};
use std::io::Write;

/// Writes records as one pretty-printed JSON array
pub struct JsonExporter;

impl RecordExporter for JsonExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn write_records(&self, records: &[ArticleRecord], out: &mut dyn Write) -> ExportResult<()> {
        serde_json::to_writer_pretty(&mut *out, records)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}
