//! Named, pre-configured analytical views.
//!
//! Each preset bundles a grouping, a measure, an aggregation, and a chart
//! shape. The catalog is static and read-only; running a preset is a pure
//! function of (records, filter).

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregation;
use crate::data::Record;
use crate::expr::FieldBindings;
use crate::filter::RecordFilter;
use crate::group::{Binning, Grouping, SortPolicy};
use crate::infer::ColumnType;
use crate::query::{run_query, Measure, MinSampleRule, QueryRequest, SeriesBundle};
use crate::stats::{correlation, pareto, ratio_ranking, ParetoCurve, RatioEntry, DEFAULT_MIN_DENOMINATOR};

/// Closed set of chart shapes the presentation layer knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    /// Single value series over time with a mean +/- 3 sigma band.
    ControlTimeSeries,
    /// Ranked bars with a cumulative-share line on a second axis.
    ParetoBarLine,
    /// Volume bars paired with a rate line on a second axis.
    RatePairBarLine,
    /// Scatter of two derived rates, one point per group.
    RateScatter,
    /// One time series per series-dimension value.
    MultiSeriesTime,
    /// Single ranked bar series.
    RankedBar,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresetDefinition {
    pub id: &'static str,
    pub display_name: &'static str,
    pub shape: ShapeKind,
    pub x_title: &'static str,
    pub y_title: &'static str,
}

/// The static preset registry. Never mutated at runtime.
pub fn catalog() -> &'static [PresetDefinition] {
    static CATALOG: OnceLock<Vec<PresetDefinition>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            PresetDefinition {
                id: "falsecall-rate-trend",
                display_name: "False-call rate per board over time",
                shape: ShapeKind::ControlTimeSeries,
                x_title: "Report date",
                y_title: "False calls per board",
            },
            PresetDefinition {
                id: "defect-pareto",
                display_name: "Defect Pareto",
                shape: ShapeKind::ParetoBarLine,
                x_title: "Defect",
                y_title: "NG parts",
            },
            PresetDefinition {
                id: "line-volume-rate",
                display_name: "Board volume and false-call rate by line",
                shape: ShapeKind::RatePairBarLine,
                x_title: "Line",
                y_title: "Boards / false calls per board",
            },
            PresetDefinition {
                id: "falsecall-vs-defect",
                display_name: "False-call PPM vs defect PPM by model",
                shape: ShapeKind::RateScatter,
                x_title: "False-call PPM",
                y_title: "Defect PPM",
            },
            PresetDefinition {
                id: "line-rate-comparison",
                display_name: "False-call rate per line over time",
                shape: ShapeKind::MultiSeriesTime,
                x_title: "Report date",
                y_title: "False calls per board",
            },
            PresetDefinition {
                id: "model-falsecall-ranking",
                display_name: "Models ranked by false-call rate",
                shape: ShapeKind::RankedBar,
                x_title: "Model",
                y_title: "False calls per board",
            },
        ]
    })
}

pub fn find(id: &str) -> Option<&'static PresetDefinition> {
    catalog().iter().find(|p| p.id == id)
}

/// Output of one preset run. The base bundle carries labels, series, and
/// provenance for every shape; shape-specific extras ride alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetOutput {
    pub preset_id: String,
    pub shape: ShapeKind,
    pub bundle: SeriesBundle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pareto: Option<ParetoCurve>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking: Option<Vec<RatioEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<f64>,
}

/// Default minimum board total before a model appears in rankings; small
/// samples produce rates nobody should act on.
pub const RANKING_MIN_BOARDS: f64 = 7.0;

const TOP_RANKED: usize = 15;

/// Shared derived measure for per-board false-call rates.
const RATE_PER_BOARD: &str = "falseCalls / totalBoards";

fn date_grouping() -> Grouping {
    Grouping::new("Report Date", ColumnType::Temporal).binned(Binning::Day)
}

/// Execute a preset against a filtered batch.
pub fn run_preset(
    definition: &PresetDefinition,
    records: &[Record],
    filter: &RecordFilter,
) -> PresetOutput {
    let bindings = FieldBindings::default();
    let mut output = PresetOutput {
        preset_id: definition.id.to_string(),
        shape: definition.shape,
        bundle: SeriesBundle::default(),
        pareto: None,
        ranking: None,
        correlation: None,
    };

    match definition.shape {
        ShapeKind::ControlTimeSeries => {
            let request = QueryRequest {
                filter: filter.clone(),
                grouping: date_grouping(),
                series_field: None,
                measure: Measure::derived(RATE_PER_BOARD),
                aggregation: Aggregation::Average,
                bindings,
                min_sample: None,
                with_control_limits: true,
            };
            output.bundle = run_query(records, &request);
        }
        ShapeKind::ParetoBarLine => {
            let request = QueryRequest {
                filter: filter.clone(),
                grouping: Grouping::new("Defect Name", ColumnType::Categorical)
                    .sorted(SortPolicy::FrequencyDescending),
                series_field: None,
                measure: Measure::field("NG Parts"),
                aggregation: Aggregation::Sum,
                bindings,
                min_sample: None,
                with_control_limits: false,
            };
            let bundle = run_query(records, &request);
            let pairs: Vec<(String, f64)> = bundle
                .labels
                .iter()
                .zip(bundle.series.first().map(|s| s.values.as_slice()).unwrap_or(&[]))
                .map(|(label, value)| (label.clone(), value.unwrap_or(0.0)))
                .collect();
            output.pareto = Some(pareto(&pairs));
            output.bundle = bundle;
        }
        ShapeKind::RatePairBarLine => {
            let volume = QueryRequest {
                filter: filter.clone(),
                grouping: Grouping::new("Line", ColumnType::Categorical),
                series_field: None,
                measure: Measure::field("Total Boards"),
                aggregation: Aggregation::Sum,
                bindings: bindings.clone(),
                min_sample: None,
                with_control_limits: false,
            };
            let mut bundle = run_query(records, &volume);
            let rate = QueryRequest {
                measure: Measure::derived(RATE_PER_BOARD),
                aggregation: Aggregation::Average,
                bindings,
                ..volume
            };
            let rate_bundle = run_query(records, &rate);
            // Rate values re-aligned to the volume bundle's label order.
            if let Some(rate_series) = rate_bundle.series.into_iter().next() {
                let aligned = bundle
                    .labels
                    .iter()
                    .map(|label| {
                        rate_bundle
                            .labels
                            .iter()
                            .position(|l| l == label)
                            .and_then(|idx| rate_series.values.get(idx).copied().flatten())
                    })
                    .collect();
                bundle.series.push(crate::query::Series {
                    label: rate_series.label,
                    values: aligned,
                });
            }
            // Metadata rows are keyed per map, so ordering does not matter.
            bundle.metadata.extend(rate_bundle.metadata);
            output.bundle = bundle;
        }
        ShapeKind::RateScatter => {
            let base = QueryRequest {
                filter: filter.clone(),
                grouping: Grouping::new("Model Name", ColumnType::Categorical),
                series_field: None,
                measure: Measure::derived("(falseCalls / totalParts) * 1000000"),
                aggregation: Aggregation::Average,
                bindings: bindings.clone(),
                min_sample: None,
                with_control_limits: false,
            };
            let fc_bundle = run_query(records, &base);
            let ng = QueryRequest {
                measure: Measure::field("NG PPM"),
                bindings,
                ..base
            };
            let ng_bundle = run_query(records, &ng);
            let xs: Vec<f64> = series_values(&fc_bundle);
            let ys: Vec<f64> = fc_bundle
                .labels
                .iter()
                .map(|label| {
                    ng_bundle
                        .labels
                        .iter()
                        .position(|l| l == label)
                        .and_then(|idx| {
                            ng_bundle
                                .series
                                .first()
                                .and_then(|s| s.values.get(idx).copied().flatten())
                        })
                        .unwrap_or(0.0)
                })
                .collect();
            output.correlation = Some(correlation(&xs, &ys));
            let mut bundle = fc_bundle;
            bundle.series.push(crate::query::Series {
                label: "NG PPM".to_string(),
                values: ys.into_iter().map(Some).collect(),
            });
            bundle.metadata.extend(ng_bundle.metadata);
            output.bundle = bundle;
        }
        ShapeKind::MultiSeriesTime => {
            let request = QueryRequest {
                filter: filter.clone(),
                grouping: date_grouping(),
                series_field: Some("Line".to_string()),
                measure: Measure::derived(RATE_PER_BOARD),
                aggregation: Aggregation::Average,
                bindings,
                min_sample: None,
                with_control_limits: false,
            };
            output.bundle = run_query(records, &request);
        }
        ShapeKind::RankedBar => {
            let request = QueryRequest {
                filter: filter.clone(),
                grouping: Grouping::new("Model Name", ColumnType::Categorical),
                series_field: None,
                measure: Measure::field("FalseCall Parts"),
                aggregation: Aggregation::Sum,
                bindings: bindings.clone(),
                min_sample: Some(MinSampleRule {
                    qualifying_field: bindings.total_boards.clone(),
                    threshold: RANKING_MIN_BOARDS,
                }),
                with_control_limits: false,
            };
            let fc_label = request.measure.describe().to_string();
            let fc_bundle = run_query(records, &request);
            let boards = QueryRequest {
                measure: Measure::field("Total Boards"),
                ..request
            };
            let board_bundle = run_query(records, &boards);
            let entries: Vec<(String, f64, f64)> = fc_bundle
                .labels
                .iter()
                .enumerate()
                .map(|(idx, label)| {
                    let num = series_value_at(&fc_bundle, idx);
                    let den = series_value_at(&board_bundle, idx);
                    (label.clone(), num, den)
                })
                .collect();
            let ranking = ratio_ranking(&entries, DEFAULT_MIN_DENOMINATOR, TOP_RANKED);
            let labels: Vec<String> = ranking.iter().map(|e| e.label.clone()).collect();
            let values: Vec<Option<f64>> = ranking.iter().map(|e| Some(e.ratio)).collect();
            let mut bundle = fc_bundle;
            // Provenance re-keyed under the ranked series, dropping labels
            // the ranking excluded.
            let mut meta_row = bundle.metadata.remove(&fc_label).unwrap_or_default();
            meta_row.retain(|label, _| labels.contains(label));
            bundle.metadata = BTreeMap::from([(RATE_PER_BOARD.to_string(), meta_row)]);
            bundle.labels = labels;
            bundle.series = vec![crate::query::Series {
                label: RATE_PER_BOARD.to_string(),
                values,
            }];
            output.ranking = Some(ranking);
            output.bundle = bundle;
        }
    }

    output
}

fn series_values(bundle: &SeriesBundle) -> Vec<f64> {
    bundle
        .series
        .first()
        .map(|s| s.values.iter().map(|v| v.unwrap_or(0.0)).collect())
        .unwrap_or_default()
}

fn series_value_at(bundle: &SeriesBundle, idx: usize) -> f64 {
    bundle
        .series
        .first()
        .and_then(|s| s.values.get(idx).copied().flatten())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Scalar;

    fn moat_record(date: &str, model: &str, line: &str, boards: f64, fc: f64) -> Record {
        [
            ("Report Date".to_string(), Scalar::Text(date.to_string())),
            ("Model Name".to_string(), Scalar::Text(model.to_string())),
            ("Line".to_string(), Scalar::Text(line.to_string())),
            ("Total Boards".to_string(), Scalar::Number(boards)),
            ("FalseCall Parts".to_string(), Scalar::Number(fc)),
            ("Total Parts".to_string(), Scalar::Number(boards * 100.0)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn catalog_ids_are_unique_and_resolvable() {
        let ids: Vec<&str> = catalog().iter().map(|p| p.id).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
        for id in ids {
            assert!(find(id).is_some());
        }
        assert!(find("no-such-preset").is_none());
    }

    #[test]
    fn control_time_series_preset_attaches_limits() {
        let records = vec![
            moat_record("2024-01-01", "A", "SMT-1", 10.0, 5.0),
            moat_record("2024-01-02", "A", "SMT-1", 10.0, 5.0),
        ];
        let preset = find("falsecall-rate-trend").unwrap();
        let output = run_preset(preset, &records, &RecordFilter::new());
        assert_eq!(output.shape, ShapeKind::ControlTimeSeries);
        assert!(output.bundle.control_limits.is_some());
        assert_eq!(output.bundle.series[0].values, vec![Some(0.5), Some(0.5)]);
    }

    #[test]
    fn ranked_bar_preset_excludes_models_below_board_threshold() {
        let mut records = Vec::new();
        for _ in 0..5 {
            records.push(moat_record("2024-01-01", "A", "SMT-1", 1.0, 3.0));
        }
        for _ in 0..3 {
            records.push(moat_record("2024-01-01", "B", "SMT-1", 10.0 / 3.0, 1.0));
        }
        let preset = find("model-falsecall-ranking").unwrap();
        let output = run_preset(preset, &records, &RecordFilter::new());
        assert_eq!(output.bundle.labels, vec!["B"]);
        let ranking = output.ranking.unwrap();
        assert_eq!(ranking.len(), 1);
        assert!((ranking[0].ratio - 0.3).abs() < 1e-9);
        // Provenance resolves under the emitted series label, not the
        // intermediate numerator field.
        let meta = output.bundle.point_meta(RATE_PER_BOARD, "B").unwrap();
        assert!(meta.models.contains("B"));
        assert!(output.bundle.point_meta("FalseCall Parts", "B").is_none());
    }

    #[test]
    fn rate_pair_preset_keys_metadata_by_emitted_series() {
        let records = vec![
            moat_record("2024-01-01", "A", "SMT-1", 10.0, 5.0),
            moat_record("2024-01-01", "A", "SMT-2", 20.0, 4.0),
        ];
        let preset = find("line-volume-rate").unwrap();
        let output = run_preset(preset, &records, &RecordFilter::new());
        assert_eq!(output.bundle.series.len(), 2);
        for series in &output.bundle.series {
            assert!(output.bundle.point_meta(&series.label, "SMT-1").is_some());
        }
    }

    #[test]
    fn multi_series_preset_splits_by_line() {
        let records = vec![
            moat_record("2024-01-01", "A", "SMT-1", 10.0, 5.0),
            moat_record("2024-01-01", "A", "SMT-2", 10.0, 2.0),
        ];
        let preset = find("line-rate-comparison").unwrap();
        let output = run_preset(preset, &records, &RecordFilter::new());
        assert_eq!(output.bundle.series.len(), 2);
        assert_eq!(output.bundle.series[0].label, "SMT-1");
    }

    #[test]
    fn scatter_preset_reports_correlation() {
        let mut records = Vec::new();
        for (model, fc, ng) in [("A", 10.0, 20.0), ("B", 20.0, 40.0), ("C", 30.0, 60.0)] {
            let mut r = moat_record("2024-01-01", model, "SMT-1", 10.0, fc);
            r.insert("NG PPM", Scalar::Number(ng));
            records.push(r);
        }
        let preset = find("falsecall-vs-defect").unwrap();
        let output = run_preset(preset, &records, &RecordFilter::new());
        let r = output.correlation.unwrap();
        assert!((r - 1.0).abs() < 1e-9);
        assert!(output.bundle.point_meta("NG PPM", "A").is_some());
    }
}
