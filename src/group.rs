//! Grouping-key derivation, including temporal binning.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::Record;
use crate::infer::ColumnType;

/// Granularity a temporal grouping field is collapsed to before grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binning {
    #[default]
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Binning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Binning::Day => "day",
            Binning::Week => "week",
            Binning::Month => "month",
            Binning::Quarter => "quarter",
            Binning::Year => "year",
        }
    }
}

/// Label used for records whose temporal grouping value failed to parse.
/// Such records are bucketed rather than dropped so per-group counts still
/// reconcile with the filtered record count.
pub const UNKNOWN_KEY: &str = "";

/// How a grouped dimension is described: the field, its classified type, and
/// (for temporal fields) the binning granularity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Grouping {
    pub field: String,
    pub column_type: ColumnType,
    #[serde(default)]
    pub binning: Binning,
    #[serde(default)]
    pub sort: SortPolicy,
}

impl Grouping {
    pub fn new(field: impl Into<String>, column_type: ColumnType) -> Self {
        Grouping {
            field: field.into(),
            column_type,
            binning: Binning::Day,
            sort: SortPolicy::default(),
        }
    }

    pub fn binned(mut self, binning: Binning) -> Self {
        self.binning = binning;
        self
    }

    pub fn sorted(mut self, sort: SortPolicy) -> Self {
        self.sort = sort;
        self
    }

    /// Derive the string-normalized grouping key for one record.
    pub fn key_for(&self, record: &Record) -> String {
        match self.column_type {
            ColumnType::Temporal => match record.date(&self.field) {
                Some(day) => bin_label(day, self.binning),
                None => UNKNOWN_KEY.to_string(),
            },
            // Numeric keys pass through unchanged; grouping is on exact
            // numeric equality, so low-cardinality fields are the caller's
            // responsibility.
            ColumnType::Numeric | ColumnType::Boolean | ColumnType::Categorical => {
                record.display(&self.field)
            }
        }
    }
}

/// Ordering applied to categorical x-axis labels. Temporal and numeric labels
/// always sort chronologically / numerically regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortPolicy {
    #[default]
    AlphaAscending,
    AlphaDescending,
    FrequencyAscending,
    FrequencyDescending,
}

/// Collapse a day to its bin label.
///
/// Week labels are `W` plus the ISO date of that week's Monday; quarters are
/// `YYYY-Qn` with n derived from the zero-based month index.
pub fn bin_label(day: NaiveDate, binning: Binning) -> String {
    match binning {
        Binning::Day => day.format("%Y-%m-%d").to_string(),
        Binning::Week => {
            let monday = day - Duration::days(day.weekday().num_days_from_monday() as i64);
            format!("W{}", monday.format("%Y-%m-%d"))
        }
        Binning::Month => day.format("%Y-%m").to_string(),
        Binning::Quarter => {
            let quarter = (day.month0() / 3) + 1;
            format!("{}-Q{}", day.year(), quarter)
        }
        Binning::Year => day.format("%Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Scalar;
    use chrono::Weekday;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn bin_labels_cover_every_granularity() {
        let d = day(2024, 5, 8); // a Wednesday
        assert_eq!(bin_label(d, Binning::Day), "2024-05-08");
        assert_eq!(bin_label(d, Binning::Week), "W2024-05-06");
        assert_eq!(bin_label(d, Binning::Month), "2024-05");
        assert_eq!(bin_label(d, Binning::Quarter), "2024-Q2");
        assert_eq!(bin_label(d, Binning::Year), "2024");
    }

    #[test]
    fn monday_binning_is_idempotent_on_mondays() {
        let monday = day(2024, 5, 6);
        assert_eq!(monday.weekday(), Weekday::Mon);
        assert_eq!(bin_label(monday, Binning::Week), "W2024-05-06");
        // Sunday belongs to the same Monday-start week.
        assert_eq!(bin_label(day(2024, 5, 12), Binning::Week), "W2024-05-06");
    }

    #[test]
    fn quarter_boundaries() {
        assert_eq!(bin_label(day(2024, 1, 1), Binning::Quarter), "2024-Q1");
        assert_eq!(bin_label(day(2024, 3, 31), Binning::Quarter), "2024-Q1");
        assert_eq!(bin_label(day(2024, 4, 1), Binning::Quarter), "2024-Q2");
        assert_eq!(bin_label(day(2024, 12, 31), Binning::Quarter), "2024-Q4");
    }

    #[test]
    fn unparseable_temporal_values_map_to_the_unknown_key() {
        let record: Record = [(
            "Report Date".to_string(),
            Scalar::Text("never".to_string()),
        )]
        .into_iter()
        .collect();
        let grouping = Grouping::new("Report Date", ColumnType::Temporal);
        assert_eq!(grouping.key_for(&record), UNKNOWN_KEY);
    }

    #[test]
    fn categorical_and_numeric_keys_pass_through() {
        let record: Record = [
            ("Line".to_string(), Scalar::Text("SMT-1".to_string())),
            ("Shift".to_string(), Scalar::Number(2.0)),
        ]
        .into_iter()
        .collect();
        let by_line = Grouping::new("Line", ColumnType::Categorical);
        assert_eq!(by_line.key_for(&record), "SMT-1");
        let by_shift = Grouping::new("Shift", ColumnType::Numeric);
        assert_eq!(by_shift.key_for(&record), "2");
    }
}
