//! Record filtering: date window, membership predicates, substring matches.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data::Record;

/// Default field the date window applies to when a query does not name one.
pub const DEFAULT_DATE_FIELD: &str = "Report Date";

/// An immutable filter for one query execution. All predicate groups are
/// ANDed together; within one field's allowed-value set, membership is OR.
/// Unset predicates always pass, so the default filter is the identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordFilter {
    #[serde(default)]
    pub date_field: Option<String>,
    #[serde(default)]
    pub date_start: Option<NaiveDate>,
    #[serde(default)]
    pub date_end: Option<NaiveDate>,
    /// field -> allowed values (assembly, revision, line, customer, operator).
    #[serde(default)]
    pub allowed: BTreeMap<String, Vec<String>>,
    /// field -> case-insensitive substring.
    #[serde(default)]
    pub contains: BTreeMap<String, String>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date_window(
        mut self,
        field: impl Into<String>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Self {
        self.date_field = Some(field.into());
        self.date_start = start;
        self.date_end = end;
        self
    }

    pub fn allow(mut self, field: impl Into<String>, values: Vec<String>) -> Self {
        self.allowed.insert(field.into(), values);
        self
    }

    pub fn containing(mut self, field: impl Into<String>, needle: impl Into<String>) -> Self {
        self.contains.insert(field.into(), needle.into());
        self
    }

    pub fn is_identity(&self) -> bool {
        self.date_start.is_none()
            && self.date_end.is_none()
            && self.allowed.values().all(|v| v.is_empty())
            && self.contains.values().all(|v| v.is_empty())
    }

    fn date_field(&self) -> &str {
        self.date_field.as_deref().unwrap_or(DEFAULT_DATE_FIELD)
    }

    /// True when the record passes every configured predicate.
    pub fn matches(&self, record: &Record) -> bool {
        if self.date_start.is_some() || self.date_end.is_some() {
            // Window bounds are inclusive and compared at day granularity.
            // A record whose date does not parse fails a bounded window.
            let Some(day) = record.date(self.date_field()) else {
                return false;
            };
            if let Some(start) = self.date_start {
                if day < start {
                    return false;
                }
            }
            if let Some(end) = self.date_end {
                if day > end {
                    return false;
                }
            }
        }

        for (field, values) in &self.allowed {
            if values.is_empty() {
                continue;
            }
            let actual = record.display(field);
            if !values.iter().any(|allowed| *allowed == actual) {
                return false;
            }
        }

        for (field, needle) in &self.contains {
            if needle.is_empty() {
                continue;
            }
            let haystack = record.display(field).to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }

        true
    }

    /// Filter a batch, preserving input order. No side effects.
    pub fn apply<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Scalar;

    fn rec(date: &str, line: &str, customer: &str) -> Record {
        [
            ("Report Date".to_string(), Scalar::Text(date.to_string())),
            ("Line".to_string(), Scalar::Text(line.to_string())),
            ("Customer".to_string(), Scalar::Text(customer.to_string())),
        ]
        .into_iter()
        .collect()
    }

    fn batch() -> Vec<Record> {
        vec![
            rec("2024-01-01", "SMT-1", "Acme Industrial"),
            rec("2024-01-15", "SMT-2", "Borealis"),
            rec("2024-02-01", "SMT-1", "Acme Industrial"),
            rec("bad-date", "SMT-3", "Cobalt"),
        ]
    }

    #[test]
    fn empty_filter_is_identity() {
        let records = batch();
        let filter = RecordFilter::new();
        assert!(filter.is_identity());
        let out = filter.apply(&records);
        assert_eq!(out.len(), records.len());
        for (kept, original) in out.iter().zip(records.iter()) {
            assert_eq!(**kept, *original);
        }
    }

    #[test]
    fn date_window_is_inclusive_and_day_granular() {
        let records = batch();
        let filter = RecordFilter::new().date_window(
            "Report Date",
            NaiveDate::from_ymd_opt(2024, 1, 1),
            NaiveDate::from_ymd_opt(2024, 1, 15),
        );
        let out = filter.apply(&records);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].display("Line"), "SMT-1");
        assert_eq!(out[1].display("Line"), "SMT-2");
    }

    #[test]
    fn unparseable_date_fails_a_bounded_window() {
        let records = batch();
        let filter =
            RecordFilter::new().date_window("Report Date", NaiveDate::from_ymd_opt(2000, 1, 1), None);
        assert_eq!(filter.apply(&records).len(), 3);
    }

    #[test]
    fn membership_is_or_within_field_and_anded_across() {
        let records = batch();
        let filter = RecordFilter::new()
            .allow("Line", vec!["SMT-1".into(), "SMT-2".into()])
            .allow("Customer", vec!["Acme Industrial".into()]);
        let out = filter.apply(&records);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.display("Customer") == "Acme Industrial"));
    }

    #[test]
    fn contains_is_case_insensitive() {
        let records = batch();
        let filter = RecordFilter::new().containing("Customer", "ACME");
        assert_eq!(filter.apply(&records).len(), 2);
    }

    #[test]
    fn empty_predicate_entries_pass() {
        let records = batch();
        let filter = RecordFilter::new()
            .allow("Line", Vec::new())
            .containing("Customer", "");
        assert_eq!(filter.apply(&records).len(), records.len());
    }
}
