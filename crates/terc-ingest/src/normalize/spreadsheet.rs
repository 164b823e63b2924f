//! Spreadsheet (`.xlsx`) parsing
//!
//! Reads the first worksheet with its first row as header and renders every
//! cell as text. There is a single reader configuration; a workbook that does
//! not fit it is an error for that file.

use calamine::{open_workbook, Data, DataType, Reader, Xlsx};
use std::path::Path;

use super::schema::ColumnMapping;

pub fn parse(path: &Path, mapping: &ColumnMapping) -> Result<Vec<Vec<Option<String>>>, String> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e| format!("cannot open workbook: {}", e))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no worksheets".to_string())?
        .map_err(|e| format!("cannot read first worksheet: {}", e))?;

    let mut rows = range.rows();
    let header = rows
        .next()
        .ok_or_else(|| "first worksheet is empty".to_string())?;
    let width = header.len();
    if width != mapping.expected_width() {
        return Err(format!(
            "header has {} columns, expected {}",
            width,
            mapping.expected_width()
        ));
    }

    let mut out = Vec::new();
    for row in rows {
        let cells: Vec<Option<String>> = row.iter().map(cell_text).collect();
        // trailing formatted-but-empty rows are part of the used range
        if cells.iter().all(Option::is_none) {
            continue;
        }
        let fields: Vec<&str> = cells.iter().map(|c| c.as_deref().unwrap_or("")).collect();
        out.push(mapping.apply(&fields)?);
    }
    Ok(out)
}

/// Text rendering of one cell; empty and error cells have no value
pub fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(float_text(*f)),
        Data::DateTime(dt) => Some(
            cell.as_datetime()
                .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| float_text(dt.as_f64())),
        ),
        other => Some(other.to_string()),
    }
}

/// Integral floats print without a fractional part, so identifiers stored as
/// numbers keep their published form
fn float_text(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&Data::String(String::new())), None);
        assert_eq!(cell_text(&Data::String("MEC".into())), Some("MEC".into()));
        assert_eq!(cell_text(&Data::Int(7)), Some("7".into()));
        assert_eq!(cell_text(&Data::Float(12345678901.0)), Some("12345678901".into()));
        assert_eq!(cell_text(&Data::Float(1520.75)), Some("1520.75".into()));
        assert_eq!(cell_text(&Data::Bool(true)), Some("true".into()));
    }

    #[test]
    fn test_non_workbook_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.xlsx");
        std::fs::write(&path, b"id;nome\n1;Ana\n").unwrap();

        let err = parse(&path, &ColumnMapping::positional()).unwrap_err();
        assert!(err.contains("cannot open workbook"));
    }
}
