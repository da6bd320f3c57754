//! Column classification for schema-less record batches.
//!
//! Samples up to [`SAMPLE_ROWS`] records per batch and classifies every field
//! as temporal, numeric, boolean, or categorical. The result feeds both the
//! grouping-key derivation and the dimension pickers upstream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::{looks_temporal, Record, Scalar};

pub const SAMPLE_ROWS: usize = 50;

/// Share of non-empty sampled values that must match before a field is
/// classified as a given type. Ties and misses fall through to categorical.
const CLASSIFY_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Temporal,
    Numeric,
    Boolean,
    Categorical,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Temporal => "temporal",
            ColumnType::Numeric => "numeric",
            ColumnType::Boolean => "boolean",
            ColumnType::Categorical => "categorical",
        }
    }
}

/// Classification of one batch: field -> type, plus the field vocabulary in
/// the order the first record declared it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub types: HashMap<String, ColumnType>,
    pub field_order: Vec<String>,
}

impl ColumnProfile {
    pub fn column_type(&self, field: &str) -> ColumnType {
        self.types
            .get(field)
            .copied()
            .unwrap_or(ColumnType::Categorical)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[derive(Default)]
struct TypeTally {
    non_empty: usize,
    temporal: usize,
    numeric: usize,
    boolean: usize,
}

impl TypeTally {
    fn update(&mut self, value: &Scalar) {
        if value.is_missing() {
            return;
        }
        self.non_empty += 1;
        match value {
            Scalar::Date(_) => self.temporal += 1,
            Scalar::Number(_) => self.numeric += 1,
            Scalar::Bool(_) => self.boolean += 1,
            Scalar::Text(s) => {
                let trimmed = s.trim();
                if looks_temporal(trimmed) {
                    self.temporal += 1;
                } else if trimmed.parse::<f64>().map(|n| n.is_finite()) == Ok(true) {
                    self.numeric += 1;
                } else if trimmed.eq_ignore_ascii_case("true")
                    || trimmed.eq_ignore_ascii_case("false")
                {
                    self.boolean += 1;
                }
            }
            Scalar::Missing => {}
        }
    }

    fn decide(&self) -> ColumnType {
        if self.non_empty == 0 {
            return ColumnType::Categorical;
        }
        let threshold = self.non_empty as f64 * CLASSIFY_THRESHOLD;
        // Precedence order matters: a column of ISO dates also fails numeric
        // parsing, but mixed columns must resolve deterministically.
        if self.temporal as f64 >= threshold {
            ColumnType::Temporal
        } else if self.numeric as f64 >= threshold {
            ColumnType::Numeric
        } else if self.boolean as f64 >= threshold {
            ColumnType::Boolean
        } else {
            ColumnType::Categorical
        }
    }
}

/// Classify every field observed in a sample of the batch.
///
/// An empty batch produces an empty profile; callers defer to built-in field
/// lists in that case rather than erroring.
pub fn profile_columns(records: &[Record]) -> ColumnProfile {
    let Some(first) = records.first() else {
        return ColumnProfile::default();
    };
    let field_order: Vec<String> = first.field_names().map(str::to_string).collect();

    let mut tallies: HashMap<String, TypeTally> = HashMap::new();
    for record in records.iter().take(SAMPLE_ROWS) {
        for (name, value) in record.iter() {
            tallies.entry(name.to_string()).or_default().update(value);
        }
    }

    let types = tallies
        .into_iter()
        .map(|(name, tally)| (name, tally.decide()))
        .collect();

    ColumnProfile { types, field_order }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, Scalar)]) -> Record {
        pairs
            .iter()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn empty_batch_produces_empty_profile() {
        let profile = profile_columns(&[]);
        assert!(profile.is_empty());
        assert!(profile.field_order.is_empty());
    }

    #[test]
    fn classifies_each_kind_from_text_values() {
        let records: Vec<Record> = (0..10)
            .map(|i| {
                rec(&[
                    ("Report Date", Scalar::Text(format!("2024-01-{:02}", i + 1))),
                    ("Total Boards", Scalar::Text(format!("{i}"))),
                    ("Passed", Scalar::Text(if i % 2 == 0 { "true" } else { "false" }.into())),
                    ("Line", Scalar::Text(format!("SMT-{i}"))),
                ])
            })
            .collect();
        let profile = profile_columns(&records);
        assert_eq!(profile.column_type("Report Date"), ColumnType::Temporal);
        assert_eq!(profile.column_type("Total Boards"), ColumnType::Numeric);
        assert_eq!(profile.column_type("Passed"), ColumnType::Boolean);
        assert_eq!(profile.column_type("Line"), ColumnType::Categorical);
        assert_eq!(
            profile.field_order,
            vec!["Report Date", "Total Boards", "Passed", "Line"]
        );
    }

    #[test]
    fn mixed_column_below_threshold_is_categorical() {
        // Half numeric, half text: neither reaches the 60% bar.
        let records: Vec<Record> = (0..10)
            .map(|i| {
                let value = if i < 5 {
                    Scalar::Text(i.to_string())
                } else {
                    Scalar::Text(format!("op-{i}"))
                };
                rec(&[("Operator", value)])
            })
            .collect();
        let profile = profile_columns(&records);
        assert_eq!(profile.column_type("Operator"), ColumnType::Categorical);
    }

    #[test]
    fn empty_values_are_excluded_from_the_denominator() {
        let mut records: Vec<Record> = (0..3)
            .map(|i| rec(&[("Qty", Scalar::Text(i.to_string()))]))
            .collect();
        records.push(rec(&[("Qty", Scalar::Missing)]));
        records.push(rec(&[("Qty", Scalar::Text("  ".into()))]));
        let profile = profile_columns(&records);
        assert_eq!(profile.column_type("Qty"), ColumnType::Numeric);
    }

    #[test]
    fn unknown_field_defaults_to_categorical() {
        let profile = profile_columns(&[rec(&[("A", Scalar::Number(1.0))])]);
        assert_eq!(profile.column_type("never seen"), ColumnType::Categorical);
    }
}
