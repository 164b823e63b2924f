//! Shared fixtures for the ingest integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use terc_common::storage::{LocalStorage, ObjectStore};
use terc_ingest::normalize::SOURCE_COLUMNS;
use terc_ingest::{IngestConfig, RetryPolicy};

/// One source row: `id` in `id_terc`, `name` in `nm_terceirizado`, and a
/// filler value everywhere else
pub fn source_row(id: u32, name: &str) -> Vec<String> {
    SOURCE_COLUMNS
        .iter()
        .map(|column| match *column {
            "id_terc" => id.to_string(),
            "nm_terceirizado" => name.to_string(),
            "vl_mensal_salario" => "1500,00".to_string(),
            other => format!("{}-{}", other, id),
        })
        .collect()
}

/// Delimited text with the canonical header and the given rows
pub fn csv_text(delimiter: char, rows: &[Vec<String>]) -> String {
    let sep = delimiter.to_string();
    let mut text = SOURCE_COLUMNS.join(&sep);
    text.push('\n');
    for row in rows {
        text.push_str(&row.join(&sep));
        text.push('\n');
    }
    text
}

/// Latin-1 bytes for text made of code points below U+0100
pub fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u32 as u8).collect()
}

/// UTF-16LE bytes with a byte-order mark
pub fn utf16le(text: &str) -> Vec<u8> {
    let mut out = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

pub async fn local_store(dir: &std::path::Path) -> Arc<dyn ObjectStore> {
    Arc::new(LocalStorage::new(dir).await.unwrap())
}

/// Pipeline configuration pointed at a mock portal, with no retry delay
pub fn test_config(index_url: String, staging: &std::path::Path) -> IngestConfig {
    IngestConfig {
        index_url,
        staging_dir: staging.to_path_buf(),
        retry: RetryPolicy::fixed(1, Duration::ZERO),
        ..IngestConfig::default()
    }
}

/// Index page linking the given file names under `{index}/arquivos/`
pub fn index_html(index_url: &str, files: &[&str]) -> String {
    let links: String = files
        .iter()
        .map(|f| format!("<li><a href=\"{}/arquivos/{}\">{}</a></li>\n", index_url, f, f))
        .collect();
    format!(
        "<html><body><h1>Terceirizados</h1><ul>\n{}<li><a href=\"/outra-pagina\">outra</a></li>\n</ul></body></html>",
        links
    )
}
