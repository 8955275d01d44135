//! CSV rendering of tabular exports.

use visiomed_core::{
  Error, Result,
  export::{Artifact, Exporter},
};

/// Comma-separated, header row first, UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvExporter;

impl Exporter for CsvExporter {
  fn export(&self, headers: &[&str], rows: &[Vec<String>]) -> Result<Artifact> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers).map_err(storage)?;
    for row in rows {
      writer.write_record(row).map_err(storage)?;
    }
    let bytes = writer
      .into_inner()
      .map_err(|e| Error::Storage(e.to_string().into()))?;
    Ok(Artifact {
      content_type: "text/csv; charset=utf-8",
      file_extension: "csv",
      bytes,
    })
  }
}

fn storage(e: csv::Error) -> Error { Error::Storage(Box::new(e)) }
