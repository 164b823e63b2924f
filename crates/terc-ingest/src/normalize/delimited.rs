//! Delimited-text parsing

use super::schema::ColumnMapping;

/// Candidate field separators, in tie-break order
pub const DELIMITERS: [u8; 4] = [b';', b',', b'\t', b'|'];

/// Pick the separator that occurs most often in the header line, ignoring
/// anything inside double quotes. Falls back to `,` for a single-column file.
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let mut counts = [0usize; DELIMITERS.len()];
    let mut quoted = false;

    for b in header.bytes() {
        if b == b'"' {
            quoted = !quoted;
            continue;
        }
        if quoted {
            continue;
        }
        if let Some(idx) = DELIMITERS.iter().position(|d| *d == b) {
            counts[idx] += 1;
        }
    }

    let mut best: Option<(usize, usize)> = None;
    for (idx, count) in counts.iter().enumerate() {
        if *count > 0 && best.map_or(true, |(_, c)| *count > c) {
            best = Some((idx, *count));
        }
    }
    best.map_or(b',', |(idx, _)| DELIMITERS[idx])
}

/// Parse decoded CSV text into rows laid out per `mapping`.
///
/// The first line is the header. Fails when the header or any record is not
/// exactly as wide as the mapping expects, or when quoting is malformed.
pub fn parse(text: &str, mapping: &ColumnMapping) -> Result<Vec<Vec<Option<String>>>, String> {
    // DOS end-of-file marker left by some exports
    let text = text.strip_suffix('\u{1a}').unwrap_or(text);
    let delimiter = sniff_delimiter(text);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .quote(b'"')
        .has_headers(true)
        .flexible(false)
        .from_reader(text.as_bytes());

    let header_width = reader.headers().map_err(|e| e.to_string())?.len();
    if header_width != mapping.expected_width() {
        return Err(format!(
            "header has {} columns (delimiter {:?}), expected {}",
            header_width,
            char::from(delimiter),
            mapping.expected_width()
        ));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| e.to_string())?;
        let fields: Vec<&str> = record.iter().collect();
        rows.push(mapping.apply(&fields)?);
    }
    Ok(rows)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3"), b';');
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter("a|b"), b'|');
        assert_eq!(sniff_delimiter("single"), b',');
    }

    #[test]
    fn test_sniff_ignores_quoted_separators() {
        assert_eq!(sniff_delimiter("\"a,b,c,d\";\"e\";f"), b';');
    }

    #[test]
    fn test_parse_with_custom_mapping() {
        let mapping = ColumnMapping::new(vec![2, 0], 3).unwrap();
        let rows = parse("x;y;z\n1;;3\n\"4;4\";5;6", &mapping).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Some("3".to_string()), Some("1".to_string())],
                vec![Some("6".to_string()), Some("4;4".to_string())],
            ]
        );
    }

    #[test]
    fn test_parse_ignores_trailing_end_of_file_marker() {
        let mapping = ColumnMapping::new(vec![0, 1], 2).unwrap();
        let rows = parse("a;b\n1;2\n\u{1a}", &mapping).unwrap();
        assert_eq!(rows, vec![vec![Some("1".to_string()), Some("2".to_string())]]);
    }

    #[test]
    fn test_parse_rejects_width_mismatch() {
        let mapping = ColumnMapping::new(vec![0, 1], 2).unwrap();
        assert!(parse("a;b;c\n1;2;3", &mapping).is_err());
        assert!(parse("a;b\n1;2;3", &mapping).is_err());
    }
}
