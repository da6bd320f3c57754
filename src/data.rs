use std::fmt;

use chrono::NaiveDate;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single dynamically-typed cell value.
///
/// Inspection report batches carry no fixed schema, so every field is one of
/// these variants; the column classifier decides how a whole field is treated.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
    Missing,
}

impl Scalar {
    /// Best-effort numeric view (text values are parsed; non-finite rejected).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) if n.is_finite() => Some(*n),
            Scalar::Text(s) => {
                let parsed: f64 = s.trim().parse().ok()?;
                parsed.is_finite().then_some(parsed)
            }
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Best-effort calendar-day view. Text values are truncated to their
    /// first ten characters before parsing, which strips any time-of-day
    /// suffix and keeps the comparison free of timezone drift.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Scalar::Date(d) => Some(*d),
            Scalar::Text(s) => parse_report_date(s),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Scalar::Missing => true,
            Scalar::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Scalar::Text(s) => s.clone(),
            Scalar::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{n:.0}")
                } else {
                    n.to_string()
                }
            }
            Scalar::Bool(b) => b.to_string(),
            Scalar::Date(d) => d.format("%Y-%m-%d").to_string(),
            Scalar::Missing => String::new(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d/%m/%Y"];

/// Parse a report date from loosely formatted text. Values longer than ten
/// characters are truncated first so `2024-01-05T08:30:00` and
/// `2024-01-05 08:30` both resolve to the same day.
pub fn parse_report_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let head: String = trimmed.chars().take(10).collect();
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(head.trim(), fmt) {
            return Some(parsed);
        }
    }
    None
}

/// True when the text looks like a calendar date without keeping the parse.
pub fn looks_temporal(value: &str) -> bool {
    parse_report_date(value).is_some()
}

/// One inspection record: an ordered field-name to value mapping.
///
/// Field order is preserved because the first record of a batch defines the
/// field vocabulary shown to dimension pickers. Lookups fall back to the
/// snake_case spelling of a display header ("Report Date" vs "report_date"),
/// matching how upstream exports name their columns inconsistently.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Scalar)>,
}

impl Record {
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Scalar) {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.fields.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Scalar> {
        if let Some((_, v)) = self.fields.iter().find(|(n, _)| n == name) {
            return Some(v);
        }
        // Alternate header spelling used by older upload paths.
        let alt = snake_header(name);
        if alt != name {
            if let Some((_, v)) = self.fields.iter().find(|(n, _)| *n == alt) {
                return Some(v);
            }
        }
        None
    }

    /// Value of a field rendered for grouping; empty string when absent.
    pub fn display(&self, name: &str) -> String {
        self.get(name).map(Scalar::as_display).unwrap_or_default()
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Scalar::as_number)
    }

    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        self.get(name).and_then(Scalar::as_date)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl FromIterator<(String, Scalar)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Scalar)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

/// "FalseCall Parts" -> "falsecall_parts", "Report Date" -> "report_date".
pub fn snake_header(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '/' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Text(s) => serializer.serialize_str(s),
            Scalar::Number(n) => serializer.serialize_f64(*n),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            Scalar::Missing => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScalarVisitor;

        impl<'de> Visitor<'de> for ScalarVisitor {
            type Value = Scalar;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string, number, boolean, or null")
            }

            fn visit_bool<E: serde::de::Error>(self, v: bool) -> Result<Scalar, E> {
                Ok(Scalar::Bool(v))
            }

            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Scalar, E> {
                Ok(Scalar::Number(v as f64))
            }

            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Scalar, E> {
                Ok(Scalar::Number(v as f64))
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Scalar, E> {
                Ok(Scalar::Number(v))
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Scalar, E> {
                Ok(Scalar::Text(v.to_string()))
            }

            fn visit_none<E: serde::de::Error>(self) -> Result<Scalar, E> {
                Ok(Scalar::Missing)
            }

            fn visit_unit<E: serde::de::Error>(self) -> Result<Scalar, E> {
                Ok(Scalar::Missing)
            }
        }

        deserializer.deserialize_any(ScalarVisitor)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Record, A::Error> {
                let mut record = Record::new();
                while let Some((name, value)) = access.next_entry::<String, Scalar>()? {
                    record.insert(name, value);
                }
                Ok(record)
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}
