//! Property tests for window filtering

use proptest::prelude::*;
use terc_common::{FileKind, ReportingPeriod, SourceFile};
use terc_ingest::{filter_by_window, LoadWindow};

fn period_strategy() -> impl Strategy<Value = ReportingPeriod> {
    (2015u16..2027, 1u8..=12).prop_map(|(y, m)| ReportingPeriod::new(y, m).unwrap())
}

fn file_strategy() -> impl Strategy<Value = SourceFile> {
    (period_strategy(), any::<bool>()).prop_map(|(period, csv)| {
        let (kind, ext) = if csv {
            (FileKind::Csv, "csv")
        } else {
            (FileKind::Spreadsheet, "xlsx")
        };
        SourceFile {
            url: format!(
                "https://portal.example/terceirizados/arquivos/terceirizados{}.{}",
                period.yyyymm(),
                ext
            ),
            kind,
            period,
        }
    })
}

fn window_strategy() -> impl Strategy<Value = LoadWindow> {
    (period_strategy(), period_strategy()).prop_map(|(a, b)| {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        LoadWindow::new(start, end).unwrap()
    })
}

proptest! {
    #[test]
    fn prop_selected_files_are_inside_window(
        files in prop::collection::vec(file_strategy(), 0..40),
        window in window_strategy(),
    ) {
        let selected = filter_by_window(&files, &window);
        for file in &selected {
            prop_assert!(window.start() <= file.period && file.period <= window.end());
        }
        let expected = files.iter().filter(|f| window.contains(&f.period)).count();
        prop_assert_eq!(selected.len(), expected);
    }

    #[test]
    fn prop_selection_is_sorted_and_order_independent(
        files in prop::collection::vec(file_strategy(), 0..40),
        window in window_strategy(),
    ) {
        let selected = filter_by_window(&files, &window);
        prop_assert!(selected.windows(2).all(|w| w[0].period <= w[1].period));

        let mut reversed = files.clone();
        reversed.reverse();
        prop_assert_eq!(filter_by_window(&reversed, &window), selected);
    }

    #[test]
    fn prop_unbounded_window_keeps_everything(
        files in prop::collection::vec(file_strategy(), 0..40),
    ) {
        prop_assert_eq!(filter_by_window(&files, &LoadWindow::unbounded()).len(), files.len());
    }
}
