//! Normalization of CSV files in every published encoding

mod common;

use chrono::NaiveDate;
use terc_common::{FileKind, ReportingPeriod};
use terc_ingest::normalize::{self, parse_csv_bytes, ColumnMapping, Encoding, SOURCE_COLUMNS};
use terc_ingest::IngestError;

fn period(s: &str) -> ReportingPeriod {
    s.parse().unwrap()
}

fn write_fixture(dir: &tempfile::TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn test_utf8_semicolon_file() {
    let dir = tempfile::tempdir().unwrap();
    let text = common::csv_text(
        ';',
        &[common::source_row(1, "JOÃO DA SILVA"), common::source_row(2, "MARIA")],
    );
    let path = write_fixture(&dir, "utf8.csv", text.as_bytes());

    let table = normalize::normalize(
        &path,
        FileKind::Csv,
        period("2024-01"),
        &ColumnMapping::positional(),
    )
    .await
    .unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.period, period("2024-01"));
    let first = &table.rows[0];
    assert_eq!(first.values.len(), SOURCE_COLUMNS.len());
    assert_eq!(first.get("id_terc"), Some("1"));
    assert_eq!(first.get("nm_terceirizado"), Some("JOÃO DA SILVA"));
    assert_eq!(first.get("vl_mensal_salario"), Some("1500,00"));
    assert_eq!(first.mes_referencia, NaiveDate::from_ymd_opt(2024, 1, 1));
}

#[test]
fn test_latin1_file_falls_back() {
    let text = common::csv_text(';', &[common::source_row(7, "JOSÉ CONCEIÇÃO")]);
    let bytes = common::latin1(&text);

    let (encoding, rows) = parse_csv_bytes(&bytes, &ColumnMapping::positional()).unwrap();
    assert_eq!(encoding, Encoding::Latin1);
    assert_eq!(rows[0][9].as_deref(), Some("JOSÉ CONCEIÇÃO"));
}

#[test]
fn test_utf16_file_falls_back() {
    let text = common::csv_text('\t', &[common::source_row(3, "ANA")]);
    let bytes = common::utf16le(&text);

    let (encoding, rows) = parse_csv_bytes(&bytes, &ColumnMapping::positional()).unwrap();
    assert_eq!(encoding, Encoding::Utf16);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0].as_deref(), Some("3"));
}

#[test]
fn test_unreadable_bytes_report_last_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "garbage.csv", &[0xFF, 0x01, 0x02]);

    let err = normalize::normalize_file(
        &path,
        FileKind::Csv,
        period("2024-01"),
        &ColumnMapping::positional(),
    )
    .unwrap_err();

    assert!(matches!(err, IngestError::Normalize(_)));
    assert!(err.to_string().contains("utf-16"), "{}", err);
}

#[test]
fn test_wrong_width_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "narrow.csv", b"id_terc;nome\n1;ANA\n");

    let err = normalize::normalize_file(
        &path,
        FileKind::Csv,
        period("2024-01"),
        &ColumnMapping::positional(),
    )
    .unwrap_err();
    assert_eq!(err.stage(), "normalize");
}

#[test]
fn test_empty_cells_become_missing() {
    let mut row = common::source_row(4, "");
    row[22] = String::new();
    let text = common::csv_text('|', &[row]);

    let (_, rows) = parse_csv_bytes(text.as_bytes(), &ColumnMapping::positional()).unwrap();
    assert_eq!(rows[0][9], None);
    assert_eq!(rows[0][22], None);
    assert_eq!(rows[0][0].as_deref(), Some("4"));
}

#[test]
fn test_header_only_file_has_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "empty.csv", common::csv_text(';', &[]).as_bytes());

    let table = normalize::normalize_file(
        &path,
        FileKind::Csv,
        period("2024-02"),
        &ColumnMapping::positional(),
    )
    .unwrap();
    assert!(table.is_empty());
}

#[test]
fn test_out_of_calendar_period_leaves_date_empty() {
    let dir = tempfile::tempdir().unwrap();
    let text = common::csv_text(';', &[common::source_row(5, "RUI")]);
    let path = write_fixture(&dir, "odd.csv", text.as_bytes());

    let odd = ReportingPeriod::from_digits("202513").unwrap();
    let table = normalize::normalize_file(&path, FileKind::Csv, odd, &ColumnMapping::positional())
        .unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(table.rows[0].mes_referencia, None);
    assert_eq!(table.rows[0].get("id_terc"), Some("5"));
}

#[test]
fn test_spreadsheet_that_is_not_a_workbook() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(&dir, "fake.xlsx", b"id_terc;nome\n");

    let err = normalize::normalize_file(
        &path,
        FileKind::Spreadsheet,
        period("2024-03"),
        &ColumnMapping::positional(),
    )
    .unwrap_err();
    assert!(matches!(err, IngestError::Normalize(_)));
}

#[test]
fn test_utf8_field_with_control_character_stays_utf8() {
    let text = common::csv_text(';', &[common::source_row(8, "MARIA\u{0B}DA SILVA")]);
    let mut bytes = text.into_bytes();
    bytes.push(0x1A);

    let (encoding, rows) = parse_csv_bytes(&bytes, &ColumnMapping::positional()).unwrap();
    assert_eq!(encoding, Encoding::Utf8);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][9].as_deref(), Some("MARIA\u{0B}DA SILVA"));
}

fn spreadsheet_fixture() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("terceirizados_2024_01.xlsx")
}

#[tokio::test]
async fn test_spreadsheet_rows_as_text() {
    let table = normalize::normalize(
        &spreadsheet_fixture(),
        FileKind::Spreadsheet,
        period("2024-01"),
        &ColumnMapping::positional(),
    )
    .await
    .unwrap();

    // the blank row between the two records is dropped
    assert_eq!(table.len(), 2);

    let first = &table.rows[0];
    assert_eq!(first.values.len(), SOURCE_COLUMNS.len());
    assert_eq!(first.get("id_terc"), Some("101"));
    assert_eq!(first.get("nm_terceirizado"), Some("ANA LIMA"));
    assert_eq!(first.get("nr_cpf"), Some("12345678901"));
    assert_eq!(first.get("vl_mensal_salario"), Some("1520.75"));
    assert_eq!(first.get("Mes_Carga"), Some("2024-01-01 00:00:00"));
    assert_eq!(first.get("cd_orgao_siape"), Some("cd_orgao_siape-101"));
    assert_eq!(first.mes_referencia, NaiveDate::from_ymd_opt(2024, 1, 1));

    let second = &table.rows[1];
    assert_eq!(second.get("id_terc"), Some("102"));
    assert_eq!(second.get("vl_mensal_salario"), Some("2000"));
    assert_eq!(second.get("nm_escolaridade"), None);
    assert_eq!(second.mes_referencia, NaiveDate::from_ymd_opt(2024, 1, 1));
}

#[test]
fn test_spreadsheet_width_must_match_mapping() {
    let wide = ColumnMapping::new(vec![0, 1], 24).unwrap();
    let err = normalize::spreadsheet::parse(&spreadsheet_fixture(), &wide).unwrap_err();
    assert!(err.contains("header has 23 columns"), "{}", err);
}
