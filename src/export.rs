use std::io::Write;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{NormalizedRecord, COLUMNS};

/// On-disk format for a finished harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

/// Write records as CSV, one row each, header first.
///
/// The header is written even when there are no records so downstream
/// readers always see the same columns.
pub fn write_csv<W: Write>(records: &[NormalizedRecord], writer: W) -> Result<()> {
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    csv.write_record(COLUMNS).context("Failed to write CSV header")?;
    for record in records {
        csv.serialize(record).context("Failed to write CSV row")?;
    }
    csv.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Write records as a pretty-printed JSON array with explicit `null`s.
pub fn write_json<W: Write>(records: &[NormalizedRecord], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, records).context("Failed to write JSON")?;
    writer.flush().context("Failed to flush JSON output")?;
    Ok(())
}

pub fn write_records<W: Write>(
    records: &[NormalizedRecord],
    format: OutputFormat,
    writer: W,
) -> Result<()> {
    match format {
        OutputFormat::Csv => write_csv(records, writer),
        OutputFormat::Json => write_json(records, writer),
    }
}
