use proptest::prelude::*;

use inspection_analytics::data::{Record, Scalar};
use inspection_analytics::filter::RecordFilter;
use inspection_analytics::group::Grouping;
use inspection_analytics::infer::ColumnType;
use inspection_analytics::stats::{control_limits, correlation, pareto};

fn record_strategy() -> impl Strategy<Value = Record> {
    (
        0u32..400,
        prop::sample::select(vec!["SMT-1", "SMT-2", "SMT-3"]),
        0.0f64..500.0,
    )
        .prop_map(|(day_offset, line, boards)| {
            let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                + chrono::Duration::days(day_offset as i64);
            [
                (
                    "Report Date".to_string(),
                    Scalar::Text(date.format("%Y-%m-%d").to_string()),
                ),
                ("Line".to_string(), Scalar::Text(line.to_string())),
                ("Total Boards".to_string(), Scalar::Number(boards)),
            ]
            .into_iter()
            .collect()
        })
}

proptest! {
    #[test]
    fn empty_filter_is_the_identity(records in prop::collection::vec(record_strategy(), 0..50)) {
        let filter = RecordFilter::new();
        let filtered = filter.apply(&records);
        prop_assert_eq!(filtered.len(), records.len());
        for (kept, original) in filtered.iter().zip(records.iter()) {
            prop_assert_eq!(*kept, original);
        }
    }

    #[test]
    fn group_counts_conserve_records(records in prop::collection::vec(record_strategy(), 0..50)) {
        let refs: Vec<&Record> = records.iter().collect();
        let grouping = Grouping::new("Line", ColumnType::Categorical);
        let batch = inspection_analytics::aggregate::group_records(
            &refs,
            &grouping,
            None,
            |r| r.number("Total Boards"),
        );
        prop_assert_eq!(batch.touched_total(), records.len());
    }

    #[test]
    fn control_limits_bracket_the_mean(values in prop::collection::vec(0.0f64..1000.0, 1..60)) {
        let limits = control_limits(&values);
        prop_assert!(limits.upper >= limits.mean);
        prop_assert!(limits.lower <= limits.mean);
        prop_assert!(limits.lower >= 0.0);
    }

    #[test]
    fn pareto_last_point_is_one_hundred_percent(
        counts in prop::collection::vec(1.0f64..100.0, 1..20)
    ) {
        let pairs: Vec<(String, f64)> = counts
            .iter()
            .enumerate()
            .map(|(i, c)| (format!("cause-{i}"), *c))
            .collect();
        let curve = pareto(&pairs);
        let last = *curve.cumulative_percent.last().unwrap();
        prop_assert!((last - 100.0).abs() < 1e-6);
        for window in curve.counts.windows(2) {
            prop_assert!(window[0] >= window[1]);
        }
    }

    #[test]
    fn correlation_is_bounded(
        xs in prop::collection::vec(-100.0f64..100.0, 2..30),
        ys in prop::collection::vec(-100.0f64..100.0, 2..30)
    ) {
        let r = correlation(&xs, &ys);
        prop_assert!((-1.0 - 1e-9..=1.0 + 1e-9).contains(&r));
    }
}
