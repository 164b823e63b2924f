//! Reporting-period selection

use serde::Serialize;
use terc_common::{ReportingPeriod, SourceFile, TercError};

/// Inclusive range of reporting periods to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadWindow {
    start: ReportingPeriod,
    end: ReportingPeriod,
}

impl LoadWindow {
    pub fn new(start: ReportingPeriod, end: ReportingPeriod) -> terc_common::Result<Self> {
        if start > end {
            return Err(TercError::InvalidWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Window that admits every period a URL can encode
    pub fn unbounded() -> Self {
        Self {
            start: ReportingPeriod::MIN,
            end: ReportingPeriod::MAX,
        }
    }

    /// Build from optional user bounds; a missing side is open
    pub fn from_bounds(
        start: Option<ReportingPeriod>,
        end: Option<ReportingPeriod>,
    ) -> terc_common::Result<Self> {
        let open = Self::unbounded();
        Self::new(start.unwrap_or(open.start), end.unwrap_or(open.end))
    }

    pub fn start(&self) -> ReportingPeriod {
        self.start
    }

    pub fn end(&self) -> ReportingPeriod {
        self.end
    }

    pub fn contains(&self, period: &ReportingPeriod) -> bool {
        (self.start.yyyymm()..=self.end.yyyymm()).contains(&period.yyyymm())
    }
}

/// Files inside `window`, ascending by period then URL.
///
/// Several files for one period are all kept; the last one published wins.
pub fn filter_by_window(files: &[SourceFile], window: &LoadWindow) -> Vec<SourceFile> {
    let mut selected: Vec<SourceFile> = files
        .iter()
        .filter(|f| window.contains(&f.period))
        .cloned()
        .collect();
    selected.sort_by(|a, b| a.period.cmp(&b.period).then_with(|| a.url.cmp(&b.url)));
    selected
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use terc_common::FileKind;

    fn file(period: &str) -> SourceFile {
        let period: ReportingPeriod = period.parse().unwrap();
        SourceFile {
            url: format!("https://portal/arquivos/terceirizados{}.csv", period.yyyymm()),
            kind: FileKind::Csv,
            period,
        }
    }

    fn window(start: &str, end: &str) -> LoadWindow {
        LoadWindow::new(start.parse().unwrap(), end.parse().unwrap()).unwrap()
    }

    #[test]
    fn test_window_boundaries_are_inclusive() {
        let files: Vec<_> = ["2019-12", "2020-01", "2020-05", "2020-09", "2020-10"]
            .into_iter()
            .map(file)
            .collect();

        let selected = filter_by_window(&files, &window("2020-01", "2020-09"));
        let periods: Vec<String> = selected.iter().map(|f| f.period.to_string()).collect();
        assert_eq!(periods, vec!["2020-01", "2020-05", "2020-09"]);
    }

    #[test]
    fn test_inverted_window_rejected() {
        let err = LoadWindow::new("2021-01".parse().unwrap(), "2020-12".parse().unwrap());
        assert!(matches!(err, Err(TercError::InvalidWindow { .. })));
    }

    #[test]
    fn test_single_month_window() {
        let files = vec![file("2020-01"), file("2020-02")];
        let selected = filter_by_window(&files, &window("2020-02", "2020-02"));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].period.to_string(), "2020-02");
    }

    #[test]
    fn test_unbounded_keeps_malformed_periods() {
        let odd = SourceFile {
            url: "https://portal/arquivos/t202513.csv".to_string(),
            kind: FileKind::Csv,
            period: ReportingPeriod::from_digits("202513").unwrap(),
        };
        let selected = filter_by_window(&[odd.clone()], &LoadWindow::unbounded());
        assert_eq!(selected, vec![odd]);
    }

    #[test]
    fn test_open_bounds() {
        let files = vec![file("2018-03"), file("2022-07")];
        let from = LoadWindow::from_bounds(Some("2020-01".parse().unwrap()), None).unwrap();
        assert_eq!(filter_by_window(&files, &from).len(), 1);
    }

    #[test]
    fn test_duplicate_periods_sorted_by_url() {
        let mut a = file("2020-01");
        a.url = "https://portal/arquivos/b.csv".to_string();
        let mut b = file("2020-01");
        b.url = "https://portal/arquivos/a.csv".to_string();

        let selected = filter_by_window(&[a, b], &window("2020-01", "2020-01"));
        assert_eq!(selected.len(), 2);
        assert!(selected[0].url.ends_with("a.csv"));
    }
}
