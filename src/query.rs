//! Query execution: filter, group, aggregate, and shape the output series.
//!
//! One query execution is a pure function of (records, request); no state
//! survives between calls. Empty input or an empty filtered set is a valid
//! terminal state and produces an empty bundle, never an error.

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::aggregate::{group_records, Aggregation, GroupedBatch, PointMeta, SINGLE_SERIES};
use crate::data::Record;
use crate::expr::{FieldBindings, MeasureExpr};
use crate::filter::RecordFilter;
use crate::group::Grouping;
use crate::infer::ColumnType;
use crate::stats::{control_limits, ControlLimits};

/// Label shown for the bucket of records whose grouping date failed to
/// parse. Kept (not dropped) so totals reconcile; callers may hide it.
pub const UNKNOWN_LABEL: &str = "unknown";

/// What a query measures per record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measure {
    /// A raw numeric field read straight off each record.
    RawField { field: String },
    /// A derived arithmetic expression over false-call/board/part counts.
    DerivedExpression { expression: String },
}

impl Measure {
    pub fn field(name: impl Into<String>) -> Self {
        Measure::RawField { field: name.into() }
    }

    pub fn derived(expression: impl Into<String>) -> Self {
        Measure::DerivedExpression {
            expression: expression.into(),
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            Measure::RawField { field } => field,
            Measure::DerivedExpression { expression } => expression,
        }
    }
}

/// Drop grouping keys whose qualifying total falls below a threshold before
/// the series is derived. "Only models with at least 7 boards" is the
/// canonical use; tiny samples otherwise produce noisy rates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinSampleRule {
    /// Field summed per candidate key to decide survival.
    pub qualifying_field: String,
    pub threshold: f64,
}

/// Full description of one engine invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    #[serde(default)]
    pub filter: RecordFilter,
    pub grouping: Grouping,
    #[serde(default)]
    pub series_field: Option<String>,
    pub measure: Measure,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub bindings: FieldBindings,
    #[serde(default)]
    pub min_sample: Option<MinSampleRule>,
    /// Attach a mean +/- 3 sigma band to single-series output.
    #[serde(default)]
    pub with_control_limits: bool,
}

/// One named, ordered value sequence aligned to the bundle's labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub label: String,
    pub values: Vec<Option<f64>>,
}

/// Renderer-agnostic query output: ordered labels, one or more aligned
/// series, per-point provenance, and optional statistical extras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesBundle {
    pub labels: Vec<String>,
    pub series: Vec<Series>,
    /// series label -> x label -> contributing dates/lines/models.
    pub metadata: BTreeMap<String, BTreeMap<String, PointMeta>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_limits: Option<ControlLimits>,
    /// Set when one of the labels is the unparseable-date bucket.
    #[serde(default)]
    pub has_unknown_bucket: bool,
    /// Set when the derived-expression measure failed validation; every
    /// point is then null and the caller should surface the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure_error: Option<String>,
}

impl SeriesBundle {
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn point_meta(&self, series_label: &str, x_label: &str) -> Option<&PointMeta> {
        self.metadata.get(series_label)?.get(x_label)
    }
}

/// Compiled measure: either a direct field read or a validated expression.
enum CompiledMeasure {
    Field(String),
    Expr(MeasureExpr),
    /// Grammar rejection; evaluates to no value for every record.
    Invalid(String),
}

impl CompiledMeasure {
    fn compile(measure: &Measure) -> Self {
        match measure {
            Measure::RawField { field } => CompiledMeasure::Field(field.clone()),
            Measure::DerivedExpression { expression } => match MeasureExpr::parse(expression) {
                Ok(expr) => CompiledMeasure::Expr(expr),
                Err(err) => {
                    warn!("rejected derived expression '{expression}': {err}");
                    CompiledMeasure::Invalid(err.to_string())
                }
            },
        }
    }

    fn error(&self) -> Option<String> {
        match self {
            CompiledMeasure::Invalid(message) => Some(message.clone()),
            _ => None,
        }
    }

    fn evaluate(&self, record: &Record, bindings: &FieldBindings) -> Option<f64> {
        match self {
            CompiledMeasure::Field(field) => record.number(field),
            CompiledMeasure::Expr(expr) => expr.evaluate(record, bindings),
            CompiledMeasure::Invalid(_) => None,
        }
    }
}

/// Execute one query against an in-memory batch.
pub fn run_query(records: &[Record], request: &QueryRequest) -> SeriesBundle {
    let compiled = CompiledMeasure::compile(&request.measure);
    let filtered = request.filter.apply(records);
    debug!(
        "query over {} record(s), {} after filtering",
        records.len(),
        filtered.len()
    );

    let surviving = match &request.min_sample {
        Some(rule) => apply_min_sample(&filtered, &request.grouping, rule),
        None => filtered,
    };

    if surviving.is_empty() {
        return SeriesBundle {
            measure_error: compiled.error(),
            ..SeriesBundle::default()
        };
    }

    let batch = group_records(&surviving, &request.grouping, request.series_field.as_deref(), |r| {
        compiled.evaluate(r, &request.bindings)
    });

    build_bundle(&batch, request, compiled.error())
}

/// Sum the qualifying field per candidate x-key and keep only records whose
/// key met the threshold.
fn apply_min_sample<'a>(
    records: &[&'a Record],
    grouping: &Grouping,
    rule: &MinSampleRule,
) -> Vec<&'a Record> {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for record in records {
        let key = grouping.key_for(record);
        let qualifying = record.number(&rule.qualifying_field).unwrap_or(0.0);
        *totals.entry(key).or_insert(0.0) += qualifying;
    }
    records
        .iter()
        .filter(|record| {
            let key = grouping.key_for(record);
            totals.get(&key).copied().unwrap_or(0.0) >= rule.threshold
        })
        .copied()
        .collect()
}

/// The unknown-bucket relabel only applies to temporal groupings; an empty
/// categorical key is a genuinely empty field value and stays empty.
fn display_label(x_key: &str, temporal: bool) -> String {
    if x_key.is_empty() && temporal {
        UNKNOWN_LABEL.to_string()
    } else {
        x_key.to_string()
    }
}

fn build_bundle(
    batch: &GroupedBatch,
    request: &QueryRequest,
    measure_error: Option<String>,
) -> SeriesBundle {
    let temporal = request.grouping.column_type == ColumnType::Temporal;
    let labels: Vec<String> = batch
        .x_keys
        .iter()
        .map(|k| display_label(k, temporal))
        .collect();
    let single_label = request.measure.describe().to_string();
    let invalid_measure = measure_error.is_some();

    let mut series = Vec::new();
    let mut metadata: BTreeMap<String, BTreeMap<String, PointMeta>> = BTreeMap::new();

    for series_key in &batch.series_keys {
        let label = if series_key == SINGLE_SERIES {
            single_label.clone()
        } else {
            series_key.clone()
        };
        let mut values = Vec::with_capacity(batch.x_keys.len());
        let mut meta_row = BTreeMap::new();
        for x_key in &batch.x_keys {
            match batch.cell(x_key, series_key) {
                Some(cell) => {
                    // An invalid expression means every record had no value;
                    // reducing those empty cells would render zeros.
                    if invalid_measure {
                        values.push(None);
                    } else {
                        values.push(Some(cell.reduce(request.aggregation)));
                    }
                    meta_row.insert(display_label(x_key, temporal), cell.meta.clone());
                }
                None => values.push(None),
            }
        }
        metadata.insert(label.clone(), meta_row);
        series.push(Series { label, values });
    }

    let control = if request.with_control_limits && series.len() == 1 && !invalid_measure {
        let values: Vec<f64> = series[0].values.iter().flatten().copied().collect();
        Some(control_limits(&values))
    } else {
        None
    };

    SeriesBundle {
        labels,
        series,
        metadata,
        control_limits: control,
        has_unknown_bucket: batch.has_unknown_bucket,
        measure_error,
    }
}
