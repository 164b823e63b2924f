//! Source file discovery
//!
//! The portal publishes one file per month on a single index page. Every
//! anchor pointing under `{index}/arquivos/` and ending in `.csv` or `.xlsx`
//! is a candidate; its reporting period comes from the first six-digit run
//! in the URL (`...terceirizados202401.csv` -> 2024-01).
//!
//! Two files were published with a month name instead of digits, so those
//! names are rewritten to the period they stand for before the digits are
//! searched.

use regex::Regex;
use scraper::{Html, Selector};
use terc_common::{FileKind, ReportingPeriod, SourceFile};
use tracing::{debug, info, instrument};

use crate::error::{IngestError, Result};

/// Portal index listing every monthly file
pub const DEFAULT_INDEX_URL: &str =
    "https://www.gov.br/cgu/pt-br/acesso-a-informacao/dados-abertos/arquivos/terceirizados";

/// Month names that appear in place of a `YYYYMM` token
pub const MONTH_TOKENS: &[(&str, &str)] = &[("maio", "202505"), ("setembro", "202509")];

/// `YYYYMM` token searched for in a file URL
pub const PERIOD_PATTERN: &str = r"\d{6}";

#[derive(Debug, Clone)]
pub struct SourceCatalog {
    client: reqwest::Client,
}

impl SourceCatalog {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch the index page once and list the files it links to
    #[instrument(skip(self))]
    pub async fn discover(&self, index_url: &str) -> Result<Vec<SourceFile>> {
        let discovery_error = |message: String| IngestError::Discovery {
            url: index_url.to_string(),
            message,
        };

        let response = self
            .client
            .get(index_url)
            .send()
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(discovery_error(format!("HTTP {}", response.status())));
        }

        let html = response
            .text()
            .await
            .map_err(|e| discovery_error(e.to_string()))?;

        let files = parse_links(&html, index_url)?;
        info!("{} files found", files.len());
        Ok(files)
    }
}

/// Extract source files from the index page HTML.
///
/// Links whose URL carries no period are dropped. A URL linked more than
/// once is listed once, at its first position.
pub fn parse_links(html: &str, index_url: &str) -> Result<Vec<SourceFile>> {
    let base = index_url.trim_end_matches('/');
    let link_pattern = Regex::new(&format!(
        r#"^{}/arquivos/[^\s"'>]+\.(csv|xlsx)$"#,
        regex::escape(base)
    ))?;
    let period_pattern = Regex::new(PERIOD_PATTERN)?;

    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]")
        .map_err(|e| IngestError::Discovery {
            url: index_url.to_string(),
            message: format!("invalid selector: {}", e),
        })?;

    let mut files: Vec<SourceFile> = Vec::new();
    for element in document.select(&anchors) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        let Some(captures) = link_pattern.captures(href) else {
            continue;
        };
        let Some(kind) = captures.get(1).and_then(|m| FileKind::from_extension(m.as_str()))
        else {
            continue;
        };

        if files.iter().any(|f| f.url == href) {
            continue;
        }

        match period_in(&period_pattern, href) {
            Some(period) => files.push(SourceFile {
                url: href.to_string(),
                kind,
                period,
            }),
            None => debug!(url = %href, "Skipping link without a reporting period"),
        }
    }

    Ok(files)
}

/// Reporting period encoded in a file URL
pub fn period_from_url(url: &str) -> Result<Option<ReportingPeriod>> {
    let pattern = Regex::new(PERIOD_PATTERN)?;
    Ok(period_in(&pattern, url))
}

fn period_in(pattern: &Regex, url: &str) -> Option<ReportingPeriod> {
    let mut text = url.to_string();
    for (name, digits) in MONTH_TOKENS {
        text = text.replace(name, digits);
    }
    pattern
        .find(&text)
        .and_then(|m| ReportingPeriod::from_digits(m.as_str()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BASE: &str = DEFAULT_INDEX_URL;

    fn page(hrefs: &[&str]) -> String {
        let anchors: String = hrefs
            .iter()
            .map(|h| format!(r#"<li><a href="{}">file</a></li>"#, h))
            .collect();
        format!("<html><body><ul>{}</ul></body></html>", anchors)
    }

    #[test]
    fn test_period_from_url() {
        let url = format!("{}/arquivos/terceirizados202401.csv", BASE);
        assert_eq!(period_from_url(&url).unwrap().unwrap().to_string(), "2024-01");
    }

    #[test]
    fn test_month_name_tokens() {
        let may = format!("{}/arquivos/terceirizados-maio.xlsx", BASE);
        let sep = format!("{}/arquivos/terceirizados-setembro.csv", BASE);
        assert_eq!(period_from_url(&may).unwrap().unwrap().to_string(), "2025-05");
        assert_eq!(period_from_url(&sep).unwrap().unwrap().to_string(), "2025-09");
    }

    #[test]
    fn test_first_run_of_longer_digits() {
        let pattern = Regex::new(PERIOD_PATTERN).unwrap();
        let period = |text: &str| period_in(&pattern, text).map(|p| p.to_string());
        assert_eq!(period("ab20240115cd"), Some("2024-01".to_string()));
        assert_eq!(period("12345-678901"), Some("6789-01".to_string()));
        assert_eq!(period("12345"), None);
    }

    #[test]
    fn test_out_of_range_month_is_kept() {
        let url = format!("{}/arquivos/terceirizados202513.csv", BASE);
        let period = period_from_url(&url).unwrap().unwrap();
        assert_eq!(period.to_string(), "2025-13");
        assert!(period.first_day().is_none());
    }

    #[test]
    fn test_parse_links_filters_and_classifies() {
        let html = page(&[
            &format!("{}/arquivos/terceirizados202401.csv", BASE),
            &format!("{}/arquivos/terceirizados202402.xlsx", BASE),
            &format!("{}/arquivos/leiame.pdf", BASE),
            "https://example.com/arquivos/terceirizados202403.csv",
            &format!("{}/arquivos/sem-data.csv", BASE),
            &format!("{}/outros/terceirizados202404.csv", BASE),
        ]);

        let files = parse_links(&html, BASE).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].kind, FileKind::Csv);
        assert_eq!(files[0].period.to_string(), "2024-01");
        assert_eq!(files[1].kind, FileKind::Spreadsheet);
        assert_eq!(files[1].period.to_string(), "2024-02");
    }

    #[test]
    fn test_parse_links_lists_repeated_url_once() {
        let url = format!("{}/arquivos/terceirizados202401.csv", BASE);
        let files = parse_links(&page(&[&url, &url]), BASE).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_parse_links_keeps_duplicate_periods() {
        let html = page(&[
            &format!("{}/arquivos/terceirizados202401.csv", BASE),
            &format!("{}/arquivos/terceirizados202401-retificado.csv", BASE),
        ]);
        assert_eq!(parse_links(&html, BASE).unwrap().len(), 2);
    }
}
