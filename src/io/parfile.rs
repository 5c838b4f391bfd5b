//! io::parfile — parameter-value file (`.par`) loader.
//!
//! A `.par` file holds a `PRECIS DPOINT` header line followed by one
//! `PARNME PARVAL SCALE OFFSET` row per parameter. Values are loaded into a
//! name-indexed [`ParameterValues`]; names are lowercased.
use std::path::Path;

use crate::errors::{PestError, PestResult};
use crate::io::control::records::{Line, Record, content_lines};
use crate::io::control::{Named, NamedRecords};

const SECTION: &str = "parameter values";

/// One row of a parameter-value file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValue {
    pub name: String,
    pub value: f64,
    pub scale: f64,
    pub offset: f64,
}

impl Named for ParameterValue {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Estimated parameter values, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValues {
    pub precis: String,
    pub dpoint: String,
    values: NamedRecords<ParameterValue>,
}

impl ParameterValues {
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    /// Value of parameter `name` (case-insensitive).
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|p| p.value)
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.names()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterValue> {
        self.values.iter()
    }
}

/// Load the parameter-value file at `path`.
pub fn parse(path: impl AsRef<Path>) -> PestResult<ParameterValues> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| PestError::io(path, e))?;
    let values = parse_str(&text)?;
    log::info!("loaded {} parameter values from {}", values.len(), path.display());
    Ok(values)
}

/// Parse parameter-value text held in memory.
pub fn parse_str(text: &str) -> PestResult<ParameterValues> {
    let lines = content_lines(text);
    let Some((header, rows)) = lines.split_first() else {
        return Err(PestError::InvalidHeader { line: 1, reason: "empty parameter file".into() });
    };
    let head: Vec<&str> = header.text.split_whitespace().collect();
    if head.len() < 2 {
        return Err(PestError::InvalidHeader {
            line: header.number,
            reason: "expected 'PRECIS DPOINT'".into(),
        });
    }

    let mut values = NamedRecords::default();
    for line in rows {
        values.insert(row(*line)?, SECTION)?;
    }
    Ok(ParameterValues { precis: head[0].to_lowercase(), dpoint: head[1].to_lowercase(), values })
}

fn row(line: Line<'_>) -> PestResult<ParameterValue> {
    let rec = Record::new(line, SECTION);
    rec.require(4)?;
    Ok(ParameterValue {
        name: rec.lower(0),
        value: rec.float(1, "PARVAL")?,
        scale: rec.float(2, "SCALE")?,
        offset: rec.float(3, "OFFSET")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_str_reads_header_and_rows() {
        let text = "single point\nHK1  2.5  1.0  0.0\nrch1 1.0d-3 1.0 0.0\n";

        let pv = parse_str(text).unwrap();

        assert_eq!((pv.precis.as_str(), pv.dpoint.as_str()), ("single", "point"));
        assert_eq!(pv.names(), vec!["hk1", "rch1"]);
        assert_eq!(pv.value("hk1"), Some(2.5));
        assert_eq!(pv.value("RCH1"), Some(1.0e-3));
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let short = "single point\nhk1 2.5 1.0\n";
        assert_eq!(
            parse_str(short).unwrap_err(),
            PestError::FieldCount { line: 2, section: SECTION, expected: 4, found: 3 }
        );

        assert!(matches!(parse_str("").unwrap_err(), PestError::InvalidHeader { line: 1, .. }));
    }
}
