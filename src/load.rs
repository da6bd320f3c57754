//! Record-batch loading for the CLI.
//!
//! The engine itself never does I/O; this module is the CLI-side caller that
//! materializes a batch from a CSV export or a JSON array of objects.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::debug;

use crate::data::{Record, Scalar};

/// Load a record batch, dispatching on the file extension (`.json` is a JSON
/// array of flat objects; everything else is read as headered CSV).
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let records = if is_json {
        load_json(path)?
    } else {
        load_csv(path)?
    };
    debug!("loaded {} record(s) from {:?}", records.len(), path);
    Ok(records)
}

fn load_json(path: &Path) -> Result<Vec<Record>> {
    let raw = fs::read_to_string(path).with_context(|| format!("Reading {path:?}"))?;
    let records: Vec<Record> =
        serde_json::from_str(&raw).with_context(|| format!("Parsing {path:?} as a JSON array"))?;
    Ok(records)
}

fn load_csv(path: &Path) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Opening {path:?}"))?;
    let headers = reader
        .headers()
        .with_context(|| format!("Reading headers from {path:?}"))?
        .clone();
    if headers.is_empty() {
        bail!("{path:?} has no header row");
    }

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let cell = row.get(col).unwrap_or("").trim();
                let value = if cell.is_empty() {
                    Scalar::Missing
                } else {
                    Scalar::Text(cell.to_string())
                };
                (name.to_string(), value)
            })
            .collect();
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_csv_with_missing_cells() {
        let mut file = NamedTempFile::with_suffix(".csv").unwrap();
        writeln!(file, "Report Date,Total Boards,Line").unwrap();
        writeln!(file, "2024-01-01,10,SMT-1").unwrap();
        writeln!(file, "2024-01-02,,SMT-2").unwrap();
        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].number("Total Boards"), Some(10.0));
        assert!(records[1].get("Total Boards").unwrap().is_missing());
    }

    #[test]
    fn loads_json_array_of_objects() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"[{{"Report Date":"2024-01-01","Total Boards":10,"Passed":true}}]"#
        )
        .unwrap();
        let records = load_records(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].number("Total Boards"), Some(10.0));
        assert_eq!(records[0].display("Passed"), "true");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(file, "{{not json").unwrap();
        assert!(load_records(file.path()).is_err());
    }
}
