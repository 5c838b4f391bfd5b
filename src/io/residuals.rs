//! io::residuals — residuals-table (`.res` / `.rei`) loader.
//!
//! Purpose
//! -------
//! Load the whitespace-delimited residuals table written by PEST into an
//! immutable, name-indexed [`ResidualsTable`], with weighted and absolute
//! residual columns computed once at load time.
//!
//! Key behaviors
//! -------------
//! - Locate the header row by content: the first line with a `name` token and
//!   a token containing `residual` (case-insensitive). The number of lines
//!   before it is kept as [`ResidualsTable::header_offset`].
//! - Map columns by header token: `name`, `group`, `measured`,
//!   `modelled`/`modeled`, `residual`, `weight`, `weight*residual`. Other
//!   columns are ignored.
//! - Derive a missing `residual` as `measured − modelled` and a missing
//!   `weight` as `(weight*residual) / residual`.
//! - Compute `weighted_residual = weight · residual`, its absolute value,
//!   `|residual|`, and `weighted_residual²` for every record.
//!
//! Invariants & assumptions
//! ------------------------
//! - Observation names and groups are lowercased; names are unique.
//! - Records keep file order.
//! - A weight that cannot be derived (zero residual) fails the load rather
//!   than defaulting.
//!
//! Downstream usage
//! ----------------
//! - The weight vector aligned to a Jacobian's rows comes from
//!   [`ResidualsTable::weights_for`]; `phi` comes from [`ResidualsTable::phi`].
//!   Final weights live here rather than in the control file because
//!   regularisation weights are adjusted during the run.
//!
//! Testing notes
//! -------------
//! - Unit tests cover header location after a preamble, column derivation,
//!   objective-function rollups and each error path.
use std::collections::HashMap;
use std::path::Path;

use ndarray::Array1;

use crate::errors::{PestError, PestResult};
use crate::io::control::records::parse_f64;
use crate::io::control::{Named, NamedRecords};

const SECTION: &str = "residuals";

/// One observation row of the residuals table, with derived columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualRecord {
    pub name: String,
    pub group: String,
    pub measured: f64,
    pub modelled: f64,
    pub residual: f64,
    pub weight: f64,
    pub weighted_residual: f64,
    pub absolute_residual: f64,
    pub weighted_absolute_residual: f64,
    pub weighted_squared_residual: f64,
}

impl ResidualRecord {
    fn new(
        name: String, group: String, measured: f64, modelled: f64, residual: f64, weight: f64,
    ) -> Self {
        let weighted_residual = weight * residual;
        ResidualRecord {
            name,
            group,
            measured,
            modelled,
            residual,
            weight,
            weighted_residual,
            absolute_residual: residual.abs(),
            weighted_absolute_residual: weighted_residual.abs(),
            weighted_squared_residual: weighted_residual * weighted_residual,
        }
    }
}

impl Named for ResidualRecord {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Contribution of one observation group to the objective function.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveContribution {
    pub group: String,
    pub phi: f64,
    /// Share of the total objective function, in percent.
    pub percent: f64,
}

/// ResidualsTable — residuals of a PEST run keyed by observation name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualsTable {
    records: NamedRecords<ResidualRecord>,
    header_offset: usize,
}

impl ResidualsTable {
    /// Number of lines skipped before the header row.
    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for `name` (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&ResidualRecord> {
        self.records.get(name)
    }

    pub fn records(&self) -> impl Iterator<Item = &ResidualRecord> {
        self.records.iter()
    }

    /// Observation names in file order.
    pub fn names(&self) -> Vec<&str> {
        self.records.names()
    }

    /// Distinct group names in order of first appearance.
    pub fn groups(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for r in self.records.iter() {
            if !seen.contains(&r.group.as_str()) {
                seen.push(r.group.as_str());
            }
        }
        seen
    }

    /// Records belonging to `group` (case-insensitive).
    pub fn group<'a>(&'a self, group: &str) -> impl Iterator<Item = &'a ResidualRecord> + 'a {
        let group = group.to_lowercase();
        self.records.iter().filter(move |r| r.group == group)
    }

    /// Weights aligned to `observations` (e.g. Jacobian rows).
    ///
    /// Errors
    /// ------
    /// - `PestError::UnknownObservation` for the first name not in the table.
    pub fn weights_for(&self, observations: &[String]) -> PestResult<Array1<f64>> {
        observations
            .iter()
            .map(|o| {
                self.get(o)
                    .map(|r| r.weight)
                    .ok_or_else(|| PestError::UnknownObservation { name: o.clone() })
            })
            .collect::<PestResult<Vec<f64>>>()
            .map(Array1::from)
    }

    /// Objective function: Σ (weight · residual)² over all records.
    pub fn phi(&self) -> f64 {
        self.records.iter().map(|r| r.weighted_squared_residual).sum()
    }

    /// Objective function per group, in order of first appearance.
    pub fn phi_by_group(&self) -> Vec<(String, f64)> {
        let mut totals: Vec<(String, f64)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for r in self.records.iter() {
            match index.get(r.group.as_str()) {
                Some(&i) => totals[i].1 += r.weighted_squared_residual,
                None => {
                    index.insert(r.group.as_str(), totals.len());
                    totals.push((r.group.clone(), r.weighted_squared_residual));
                }
            }
        }
        totals
    }

    /// Per-group objective contributions, ascending by percent.
    ///
    /// With a zero total objective function every percent is `0.0`.
    pub fn objective_contributions(&self) -> Vec<ObjectiveContribution> {
        let total = self.phi();
        let mut out: Vec<ObjectiveContribution> = self
            .phi_by_group()
            .into_iter()
            .map(|(group, phi)| {
                let percent = if total > 0.0 { 100.0 * phi / total } else { 0.0 };
                ObjectiveContribution { group, phi, percent }
            })
            .collect();
        out.sort_by(|a, b| a.percent.total_cmp(&b.percent));
        out
    }
}

/// Load the residuals table at `path`.
pub fn parse(path: impl AsRef<Path>) -> PestResult<ResidualsTable> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| PestError::io(path, e))?;
    let table = parse_str(&text)?;
    log::info!(
        "loaded residuals {} ({} observations, header at line {})",
        path.display(),
        table.len(),
        table.header_offset + 1
    );
    Ok(table)
}

/// Column positions resolved from the header row.
struct Columns {
    width: usize,
    name: usize,
    group: usize,
    measured: usize,
    modelled: usize,
    residual: Option<usize>,
    weight: Option<usize>,
    weighted_residual: Option<usize>,
}

impl Columns {
    fn from_header(header: &str) -> PestResult<Self> {
        let tokens: Vec<String> = header.split_whitespace().map(str::to_lowercase).collect();
        let find = |names: &[&str]| tokens.iter().position(|t| names.contains(&t.as_str()));
        let require = |names: &[&str], column: &'static str| {
            find(names).ok_or(PestError::MissingColumn { column })
        };

        let columns = Columns {
            width: tokens.len(),
            name: require(&["name"], "name")?,
            group: require(&["group"], "group")?,
            measured: require(&["measured"], "measured")?,
            modelled: require(&["modelled", "modeled"], "modelled")?,
            residual: find(&["residual"]),
            weight: find(&["weight"]),
            weighted_residual: find(&["weight*residual"]),
        };
        if columns.weight.is_none() && columns.weighted_residual.is_none() {
            return Err(PestError::MissingColumn { column: "weight" });
        }
        Ok(columns)
    }
}

fn is_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    let mut tokens = lower.split_whitespace();
    let has_name = tokens.clone().any(|t| t == "name");
    has_name && tokens.any(|t| t.contains("residual"))
}

/// Parse residuals-table text held in memory.
///
/// Errors
/// ------
/// - `PestError::MissingHeaderRow` when no header row is found.
/// - `PestError::MissingColumn` when a required column is absent.
/// - `PestError::FieldCount` / `PestError::FieldType` for short or
///   malformed rows.
/// - `PestError::UnderivableColumn` when a weight must be derived from a
///   zero residual.
/// - `PestError::DuplicateName` for a repeated observation.
pub fn parse_str(text: &str) -> PestResult<ResidualsTable> {
    let lines: Vec<&str> = text.lines().collect();
    let header_offset = lines.iter().position(|l| is_header(l)).ok_or(PestError::MissingHeaderRow)?;
    let cols = Columns::from_header(lines[header_offset])?;
    log::debug!("residuals header at line {} with {} columns", header_offset + 1, cols.width);

    let mut records = NamedRecords::default();
    for (i, line) in lines.iter().enumerate().skip(header_offset + 1) {
        let number = i + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.len() < cols.width {
            return Err(PestError::FieldCount {
                line: number,
                section: SECTION,
                expected: cols.width,
                found: tokens.len(),
            });
        }
        let float = |idx: usize, field: &'static str| {
            parse_f64(tokens[idx]).ok_or_else(|| PestError::FieldType {
                line: number,
                field,
                value: tokens[idx].to_string(),
            })
        };

        let measured = float(cols.measured, "measured")?;
        let modelled = float(cols.modelled, "modelled")?;
        let residual = match cols.residual {
            Some(idx) => float(idx, "residual")?,
            None => measured - modelled,
        };
        let weight = match (cols.weight, cols.weighted_residual) {
            (Some(idx), _) => float(idx, "weight")?,
            (None, Some(idx)) => {
                let wr = float(idx, "weight*residual")?;
                if residual == 0.0 {
                    return Err(PestError::UnderivableColumn { line: number, column: "weight" });
                }
                wr / residual
            }
            (None, None) => return Err(PestError::MissingColumn { column: "weight" }),
        };

        let record = ResidualRecord::new(
            tokens[cols.name].to_lowercase(),
            tokens[cols.group].to_lowercase(),
            measured,
            modelled,
            residual,
            weight,
        );
        records.insert(record, SECTION)?;
    }

    Ok(ResidualsTable { records, header_offset })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use approx::assert_relative_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Header location after a variable preamble.
    // - Derived columns and derivation of residual/weight when absent.
    // - Objective-function rollups (phi, per group, percent contributions).
    // - Error paths: missing header, missing column, short row, zero
    //   residual with derived weight.
    //
    // They intentionally DO NOT cover:
    // - Summary statistics (see `stats::summary`).
    // -------------------------------------------------------------------------

    const TOL: f64 = 1e-12;

    /// Residuals matching the observations and prior of the minimal
    /// control-file fixture.
    pub(crate) const MINIMAL_RES: &str = "\
 MODEL OUTPUTS AT END OF OPTIMISATION ITERATION NO. 3:

 Name   Group     Measured   Modelled   Residual   Weight
 h1     heads     10.0       9.5        0.5        1.0
 H2     heads     11.5       12.0       -0.5       1.0
 h3     heads     12.0       11.0       1.0        0.0
 q1     flux      -250.0     -300.0     50.0       0.01
 pi1    regul_hk  0.0        0.1        -0.1       2.0
";

    #[test]
    // Purpose
    // -------
    // Verify the header is located by content and the derived columns are
    // computed once at load.
    //
    // Given
    // -----
    // - `MINIMAL_RES` with a two-line preamble.
    //
    // Expect
    // ------
    // - header_offset == 2 and derived columns follow weight · residual.
    fn parse_str_locates_header_and_derives_columns() {
        // Act
        let res = parse_str(MINIMAL_RES).unwrap();

        // Assert
        assert_eq!(res.header_offset(), 2);
        assert_eq!(res.names(), vec!["h1", "h2", "h3", "q1", "pi1"]);
        let q1 = res.get("Q1").unwrap();
        assert_relative_eq!(q1.weighted_residual, 0.5, epsilon = TOL);
        assert_relative_eq!(q1.weighted_squared_residual, 0.25, epsilon = TOL);
        let h2 = res.get("h2").unwrap();
        assert_eq!(h2.absolute_residual, 0.5);
        assert_eq!(h2.weighted_absolute_residual, 0.5);
        assert_eq!(res.groups(), vec!["heads", "flux", "regul_hk"]);
    }

    #[test]
    // Purpose
    // -------
    // Verify phi and its per-group split, including percent contributions
    // sorted ascending.
    //
    // Given
    // -----
    // - Weighted residuals: heads 0.5, -0.5, 0.0; flux 0.5; regul_hk -0.2.
    //
    // Expect
    // ------
    // - phi = 0.79, heads 0.5, flux 0.25, regul_hk 0.04.
    fn phi_and_objective_contributions() {
        let res = parse_str(MINIMAL_RES).unwrap();

        assert_relative_eq!(res.phi(), 0.79, epsilon = TOL);
        let by_group = res.phi_by_group();
        assert_eq!(by_group[0].0, "heads");
        assert_relative_eq!(by_group[0].1, 0.5, epsilon = TOL);

        let contrib = res.objective_contributions();
        let order: Vec<&str> = contrib.iter().map(|c| c.group.as_str()).collect();
        assert_eq!(order, vec!["regul_hk", "flux", "heads"]);
        let total: f64 = contrib.iter().map(|c| c.percent).sum();
        assert_relative_eq!(total, 100.0, epsilon = 1e-9);
    }

    #[test]
    // Purpose
    // -------
    // Ensure residual and weight are derived when only measured/modelled and
    // weight*residual are present.
    //
    // Given
    // -----
    // - A header without `Residual` or `Weight` columns.
    //
    // Expect
    // ------
    // - residual = measured − modelled, weight = wr / residual.
    fn missing_residual_and_weight_are_derived() {
        let text = "Name Group Measured Modeled Weight*Residual\nobs1 g 3.0 1.0 4.0\n";

        let res = parse_str(text).unwrap();

        let r = res.get("obs1").unwrap();
        assert_eq!(r.residual, 2.0);
        assert_eq!(r.weight, 2.0);
        assert_eq!(res.header_offset(), 0);
    }

    #[test]
    fn zero_residual_with_derived_weight_is_underivable() {
        let text = "Name Group Measured Modelled Weight*Residual\n\nobs1 g 1.0 1.0 0.0\n";

        let err = parse_str(text).unwrap_err();

        assert_eq!(err, PestError::UnderivableColumn { line: 3, column: "weight" });
    }

    #[test]
    fn weights_for_aligns_to_requested_order() {
        let res = parse_str(MINIMAL_RES).unwrap();

        let w = res.weights_for(&["q1".to_string(), "h3".to_string(), "pi1".to_string()]).unwrap();
        assert_eq!(w.to_vec(), vec![0.01, 0.0, 2.0]);

        let err = res.weights_for(&["zz".to_string()]).unwrap_err();
        assert_eq!(err, PestError::UnknownObservation { name: "zz".into() });
    }

    #[test]
    fn structural_errors_are_reported() {
        assert_eq!(parse_str("no table here\n").unwrap_err(), PestError::MissingHeaderRow);

        let no_group = "Name Measured Modelled Residual Weight\n";
        assert_eq!(parse_str(no_group).unwrap_err(), PestError::MissingColumn { column: "group" });

        let short = "Name Group Measured Modelled Residual Weight\nobs1 g 1.0 1.0 0.0\n";
        let err = parse_str(short).unwrap_err();
        assert!(matches!(err, PestError::FieldCount { line: 2, expected: 6, found: 5, .. }));
        assert_eq!(err.kind(), ErrorKind::Schema);
    }
}
