//! Source file normalization
//!
//! Turns a downloaded CSV or spreadsheet into a [`NormalizedTable`]: the 23
//! source columns as text plus the reporting date. CSV files go through
//! [`ENCODING_ORDER`] until one encoding both decodes and parses; spreadsheets
//! have a single reader configuration and no fallback.

pub mod delimited;
pub mod encoding;
pub mod schema;
pub mod spreadsheet;

use std::path::{Path, PathBuf};
use terc_common::{FileKind, ReportingPeriod};
use tracing::{info, instrument, warn};

use crate::error::{IngestError, Result};

pub use encoding::{decode, DecodeError, Encoding, ENCODING_ORDER};
pub use schema::{
    ColumnMapping, NormalizedRow, NormalizedTable, REFERENCE_DATE_COLUMN, SOURCE_COLUMNS,
};

/// Normalize a staged file, running the parse on the blocking pool
#[instrument(skip(mapping), fields(path = %path.display()))]
pub async fn normalize(
    path: &Path,
    kind: FileKind,
    period: ReportingPeriod,
    mapping: &ColumnMapping,
) -> Result<NormalizedTable> {
    let path: PathBuf = path.to_path_buf();
    let mapping = mapping.clone();
    tokio::task::spawn_blocking(move || normalize_file(&path, kind, period, &mapping))
        .await
        .map_err(|e| IngestError::Normalize(format!("normalize task failed: {}", e)))?
}

/// Blocking form of [`normalize`]
pub fn normalize_file(
    path: &Path,
    kind: FileKind,
    period: ReportingPeriod,
    mapping: &ColumnMapping,
) -> Result<NormalizedTable> {
    if mapping.len() != SOURCE_COLUMNS.len() {
        return Err(IngestError::Normalize(format!(
            "column mapping produces {} columns, expected {}",
            mapping.len(),
            SOURCE_COLUMNS.len()
        )));
    }

    let values = match kind {
        FileKind::Spreadsheet => spreadsheet::parse(path, mapping)
            .map_err(|e| IngestError::Normalize(format!("{}: {}", path.display(), e)))?,
        FileKind::Csv => {
            let bytes = std::fs::read(path)?;
            let (encoding, values) = parse_csv_bytes(&bytes, mapping)
                .map_err(|e| IngestError::Normalize(format!("{}: {}", path.display(), e)))?;
            info!(encoding = %encoding, rows = values.len(), "Encoding recognized");
            values
        },
    };

    let table = NormalizedTable::from_values(period, values);
    if table.rows.first().is_some_and(|r| r.mes_referencia.is_none()) {
        warn!(period = %period, "Reporting period is not a calendar month; reference date left empty");
    }
    Ok(table)
}

/// Try each encoding in turn; the error of the last attempt is returned when
/// none works.
pub fn parse_csv_bytes(
    bytes: &[u8],
    mapping: &ColumnMapping,
) -> std::result::Result<(Encoding, Vec<Vec<Option<String>>>), String> {
    let mut last_error = String::from("no encoding attempted");

    for encoding in ENCODING_ORDER {
        let attempt = decode(bytes, encoding)
            .map_err(|e| e.to_string())
            .and_then(|text| delimited::parse(&text, mapping));

        match attempt {
            Ok(values) => return Ok((encoding, values)),
            Err(e) => {
                warn!("Encoding {} failed: {}", encoding, e);
                last_error = format!("{}: {}", encoding, e);
            },
        }
    }

    Err(last_error)
}
