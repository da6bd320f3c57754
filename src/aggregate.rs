//! Single-pass grouping and aggregation over a filtered record batch.
//!
//! Records are scanned once; each contributes its extracted measure to the
//! cell keyed by (x-key, series-key). Cells also collect provenance metadata
//! (contributing dates, lines, models) so the presentation layer can show
//! per-point tooltips without re-querying.

use std::collections::{BTreeSet, HashMap};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::data::Record;
use crate::group::{Grouping, SortPolicy};
use crate::infer::ColumnType;

/// Reduction applied to each cell after the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Average,
    Min,
    Max,
    Count,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Average => "average",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
        }
    }
}

/// Fields mined for per-point provenance metadata.
const META_DATE_FIELD: &str = "Report Date";
const META_LINE_FIELD: &str = "Line";
const META_MODEL_FIELD: &str = "Model Name";

/// Provenance for one (x, series) point: which dates, lines, and models
/// contributed records to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointMeta {
    pub dates: BTreeSet<String>,
    pub lines: BTreeSet<String>,
    pub models: BTreeSet<String>,
}

impl PointMeta {
    fn record(&mut self, record: &Record) {
        let date = record.display(META_DATE_FIELD);
        if !date.is_empty() {
            self.dates.insert(date);
        }
        let line = record.display(META_LINE_FIELD);
        if !line.is_empty() {
            self.lines.insert(line);
        }
        let model = record.display(META_MODEL_FIELD);
        if !model.is_empty() {
            self.models.insert(model);
        }
    }

}

/// One accumulation cell, mutated incrementally during the scan and reduced
/// once afterwards. Discarded when the query completes.
#[derive(Debug, Clone)]
pub struct AggregateCell {
    pub sum: f64,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    /// Records that hit this cell, including ones whose measure was skipped.
    pub touched: usize,
    pub meta: PointMeta,
}

impl Default for AggregateCell {
    fn default() -> Self {
        AggregateCell {
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            touched: 0,
            meta: PointMeta::default(),
        }
    }
}

impl AggregateCell {
    fn accumulate(&mut self, value: Option<f64>, record: &Record) {
        self.touched += 1;
        self.meta.record(record);
        // Non-finite and absent measures are skipped entirely so they cannot
        // poison averages.
        let Some(value) = value.filter(|v| v.is_finite()) else {
            return;
        };
        self.sum += value;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn reduce(&self, aggregation: Aggregation) -> f64 {
        match aggregation {
            Aggregation::Sum => self.sum,
            Aggregation::Average => {
                if self.count == 0 {
                    0.0
                } else {
                    self.sum / self.count as f64
                }
            }
            Aggregation::Min => {
                if self.count == 0 {
                    0.0
                } else {
                    self.min
                }
            }
            Aggregation::Max => {
                if self.count == 0 {
                    0.0
                } else {
                    self.max
                }
            }
            Aggregation::Count => self.count as f64,
        }
    }
}

/// Sentinel series key used when no series dimension is configured.
pub const SINGLE_SERIES: &str = "\u{0}single";

/// Grouped accumulation result: cells keyed by (x-key, series-key) plus the
/// orderings the output series should use.
#[derive(Debug, Default)]
pub struct GroupedBatch {
    pub cells: HashMap<(String, String), AggregateCell>,
    pub x_keys: Vec<String>,
    pub series_keys: Vec<String>,
    pub has_unknown_bucket: bool,
}

impl GroupedBatch {
    pub fn cell(&self, x: &str, series: &str) -> Option<&AggregateCell> {
        self.cells.get(&(x.to_string(), series.to_string()))
    }

    /// Total records that landed in any cell, across all series.
    pub fn touched_total(&self) -> usize {
        self.cells.values().map(|c| c.touched).sum()
    }
}

/// Scan `records` once, grouping by `grouping` on the x axis and optionally
/// by `series_field`, extracting the measure with `measure` per record.
pub fn group_records<'a, F>(
    records: &[&'a Record],
    grouping: &Grouping,
    series_field: Option<&str>,
    mut measure: F,
) -> GroupedBatch
where
    F: FnMut(&'a Record) -> Option<f64>,
{
    let mut batch = GroupedBatch::default();
    let mut x_frequency: HashMap<String, usize> = HashMap::new();

    for &record in records {
        let x_key = grouping.key_for(record);
        if x_key.is_empty() && grouping.column_type == ColumnType::Temporal {
            batch.has_unknown_bucket = true;
        }
        let series_key = match series_field {
            Some(field) => record.display(field),
            None => SINGLE_SERIES.to_string(),
        };
        *x_frequency.entry(x_key.clone()).or_insert(0) += 1;
        batch
            .cells
            .entry((x_key, series_key))
            .or_default()
            .accumulate(measure(record), record);
    }

    batch.x_keys = order_x_keys(&x_frequency, grouping);
    batch.series_keys = batch
        .cells
        .keys()
        .map(|(_, s)| s.clone())
        .unique()
        .sorted()
        .collect();
    batch
}

fn order_x_keys(frequency: &HashMap<String, usize>, grouping: &Grouping) -> Vec<String> {
    let mut keys: Vec<&String> = frequency.keys().collect();
    match grouping.column_type {
        // Day/week/month/quarter/year labels are all lexicographically
        // chronological; the unknown bucket ("") sorts first.
        ColumnType::Temporal => keys.sort(),
        ColumnType::Numeric => keys.sort_by(|a, b| {
            let left: f64 = a.parse().unwrap_or(f64::NAN);
            let right: f64 = b.parse().unwrap_or(f64::NAN);
            left.total_cmp(&right).then_with(|| a.cmp(b))
        }),
        ColumnType::Boolean | ColumnType::Categorical => match grouping.sort {
            SortPolicy::AlphaAscending => keys.sort(),
            SortPolicy::AlphaDescending => keys.sort_by(|a, b| b.cmp(a)),
            SortPolicy::FrequencyAscending => {
                keys.sort_by(|a, b| frequency[*a].cmp(&frequency[*b]).then_with(|| a.cmp(b)));
            }
            SortPolicy::FrequencyDescending => {
                keys.sort_by(|a, b| frequency[*b].cmp(&frequency[*a]).then_with(|| a.cmp(b)));
            }
        },
    }
    keys.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Scalar;

    fn rec(date: &str, line: &str, boards: f64) -> Record {
        [
            ("Report Date".to_string(), Scalar::Text(date.to_string())),
            ("Line".to_string(), Scalar::Text(line.to_string())),
            ("Total Boards".to_string(), Scalar::Number(boards)),
        ]
        .into_iter()
        .collect()
    }

    fn by_day() -> Grouping {
        Grouping::new("Report Date", ColumnType::Temporal)
    }

    #[test]
    fn sums_per_day_in_chronological_order() {
        let records = vec![
            rec("2024-01-02", "SMT-1", 5.0),
            rec("2024-01-01", "SMT-1", 10.0),
            rec("2024-01-02", "SMT-2", 7.0),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let batch = group_records(&refs, &by_day(), None, |r| r.number("Total Boards"));
        assert_eq!(batch.x_keys, vec!["2024-01-01", "2024-01-02"]);
        let cell = batch.cell("2024-01-02", SINGLE_SERIES).unwrap();
        assert_eq!(cell.reduce(Aggregation::Sum), 12.0);
        assert_eq!(cell.reduce(Aggregation::Count), 2.0);
        assert_eq!(cell.reduce(Aggregation::Min), 5.0);
        assert_eq!(cell.reduce(Aggregation::Max), 7.0);
    }

    #[test]
    fn series_keys_sort_alphabetically() {
        let records = vec![
            rec("2024-01-01", "SMT-2", 1.0),
            rec("2024-01-01", "SMT-1", 1.0),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let batch = group_records(&refs, &by_day(), Some("Line"), |r| r.number("Total Boards"));
        assert_eq!(batch.series_keys, vec!["SMT-1", "SMT-2"]);
    }

    #[test]
    fn skipped_measures_do_not_poison_averages() {
        let records = vec![
            rec("2024-01-01", "SMT-1", 10.0),
            rec("2024-01-01", "SMT-1", 20.0),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let mut calls = 0;
        let batch = group_records(&refs, &by_day(), None, |r| {
            calls += 1;
            if calls == 1 {
                None
            } else {
                r.number("Total Boards")
            }
        });
        let cell = batch.cell("2024-01-01", SINGLE_SERIES).unwrap();
        assert_eq!(cell.touched, 2);
        assert_eq!(cell.count, 1);
        assert_eq!(cell.reduce(Aggregation::Average), 20.0);
    }

    #[test]
    fn empty_cells_reduce_to_zero() {
        let cell = AggregateCell::default();
        assert_eq!(cell.reduce(Aggregation::Average), 0.0);
        assert_eq!(cell.reduce(Aggregation::Min), 0.0);
        assert_eq!(cell.reduce(Aggregation::Max), 0.0);
        assert_eq!(cell.reduce(Aggregation::Sum), 0.0);
        assert_eq!(cell.reduce(Aggregation::Count), 0.0);
    }

    #[test]
    fn unknown_dates_are_bucketed_not_dropped() {
        let records = vec![rec("garbled", "SMT-1", 1.0), rec("2024-01-01", "SMT-1", 2.0)];
        let refs: Vec<&Record> = records.iter().collect();
        let batch = group_records(&refs, &by_day(), None, |r| r.number("Total Boards"));
        assert!(batch.has_unknown_bucket);
        assert_eq!(batch.touched_total(), 2);
        assert_eq!(batch.x_keys.first().map(String::as_str), Some(""));
    }

    #[test]
    fn frequency_sort_orders_categorical_labels() {
        let records = vec![
            rec("2024-01-01", "SMT-1", 1.0),
            rec("2024-01-01", "SMT-2", 1.0),
            rec("2024-01-01", "SMT-2", 1.0),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let grouping = Grouping::new("Line", ColumnType::Categorical)
            .sorted(SortPolicy::FrequencyDescending);
        let batch = group_records(&refs, &grouping, None, |_| Some(1.0));
        assert_eq!(batch.x_keys, vec!["SMT-2", "SMT-1"]);
    }

    #[test]
    fn metadata_tracks_contributing_dates_and_lines() {
        let records = vec![
            rec("2024-01-01", "SMT-1", 1.0),
            rec("2024-01-02", "SMT-2", 1.0),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let grouping = Grouping::new("Line", ColumnType::Categorical);
        let batch = group_records(&refs, &grouping, None, |_| Some(1.0));
        let meta = &batch.cell("SMT-1", SINGLE_SERIES).unwrap().meta;
        assert!(meta.dates.contains("2024-01-01"));
        assert!(meta.lines.contains("SMT-1"));
        assert!(!meta.lines.contains("SMT-2"));
    }
}
