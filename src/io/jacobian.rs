//! io::jacobian — binary sensitivity-matrix (Jacobian) decoder.
//!
//! Purpose
//! -------
//! Decode the binary Jacobian file written by PEST into a dense,
//! observation-by-parameter [`JacobianMatrix`] with labelled axes.
//!
//! Key behaviors
//! -------------
//! - Read a header of three little-endian `i32` values: `n_par`, `n_obs`
//!   (both stored with an arbitrary sign, so their absolute values are used)
//!   and the number of sparse records.
//! - Read `n_records` pairs `(j: i32, value: f64)`, where `j` is a 1-based,
//!   column-major linear index into the `n_obs × n_par` matrix, and scatter
//!   them into an all-zero matrix.
//! - Read `n_par` 12-byte and `n_obs` 20-byte blank-padded name fields.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every cell not named by a record is exactly `0.0`.
//! - The header counts are checked against the buffer length before the
//!   matrix is allocated; a short buffer is reported as truncation.
//! - A later record for the same index overwrites an earlier one.
//! - Names are right-trimmed and lowercased.
//! - The whole file is read into memory before decoding.
//!
//! Conventions
//! -----------
//! - Rows index observations and columns index parameters.
//! - Index decoding: `col = (j − 1) / n_obs + 1`, `row = j − (col − 1)·n_obs`,
//!   stored at zero-based `[row − 1, col − 1]`.
//!
//! Downstream usage
//! ----------------
//! - Parse once and pass `&JacobianMatrix` to every engine that needs it; the
//!   value is immutable and decoding is the dominant I/O cost.
//!
//! Testing notes
//! -------------
//! - Unit tests build synthetic buffers and check placement, zero fill,
//!   index range checks, truncation, and header/caller count agreement.
use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array2, ArrayView1};

use crate::errors::{PestError, PestResult};
use crate::io::cursor::ByteCursor;

/// Width of a parameter name field in bytes.
pub const PARAMETER_NAME_WIDTH: usize = 12;
/// Width of an observation name field in bytes.
pub const OBSERVATION_NAME_WIDTH: usize = 20;
/// Width of one sparse record: `i32` index plus `f64` value.
const RECORD_WIDTH: usize = 12;

/// JacobianMatrix — dense `n_obs × n_par` sensitivity matrix with labels.
///
/// Purpose
/// -------
/// Hold the decoded Jacobian together with ordered parameter (column) and
/// observation (row) labels, and offer name-indexed read-only access.
///
/// Fields
/// ------
/// - `values`: `Array2<f64>`
///   Matrix of partial derivatives, rows = observations, columns =
///   parameters.
/// - `parameters` / `observations`: `Vec<String>`
///   Lowercased axis labels in file order.
///
/// Invariants
/// ----------
/// - `values.nrows() == observations.len()` and
///   `values.ncols() == parameters.len()`.
/// - Label lookups resolve to the first occurrence of a name.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianMatrix {
    values: Array2<f64>,
    parameters: Vec<String>,
    observations: Vec<String>,
    parameter_index: HashMap<String, usize>,
    observation_index: HashMap<String, usize>,
}

impl JacobianMatrix {
    /// Build a labelled Jacobian from an existing matrix.
    ///
    /// Labels are lowercased. Fails with `PestError::DimensionMismatch` when
    /// the label counts do not match the matrix shape.
    pub fn new(
        values: Array2<f64>, parameters: Vec<String>, observations: Vec<String>,
    ) -> PestResult<Self> {
        if values.ncols() != parameters.len() {
            return Err(PestError::DimensionMismatch {
                operation: "jacobian parameters",
                expected: values.ncols(),
                found: parameters.len(),
            });
        }
        if values.nrows() != observations.len() {
            return Err(PestError::DimensionMismatch {
                operation: "jacobian observations",
                expected: values.nrows(),
                found: observations.len(),
            });
        }
        let parameters: Vec<String> = parameters.into_iter().map(|p| p.to_lowercase()).collect();
        let observations: Vec<String> =
            observations.into_iter().map(|o| o.to_lowercase()).collect();
        let parameter_index = build_index(&parameters);
        let observation_index = build_index(&observations);
        Ok(JacobianMatrix { values, parameters, observations, parameter_index, observation_index })
    }

    /// Number of parameters (columns).
    pub fn n_par(&self) -> usize {
        self.parameters.len()
    }

    /// Number of observations (rows).
    pub fn n_obs(&self) -> usize {
        self.observations.len()
    }

    /// The full matrix, rows = observations, columns = parameters.
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Parameter labels in column order.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Observation labels in row order.
    pub fn observations(&self) -> &[String] {
        &self.observations
    }

    /// Column position of a parameter (case-insensitive).
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_index.get(&name.to_lowercase()).copied()
    }

    /// Row position of an observation (case-insensitive).
    pub fn observation_index(&self, name: &str) -> Option<usize> {
        self.observation_index.get(&name.to_lowercase()).copied()
    }

    /// Sensitivity of `observation` to `parameter`.
    pub fn value(&self, observation: &str, parameter: &str) -> Option<f64> {
        let row = self.observation_index(observation)?;
        let col = self.parameter_index(parameter)?;
        Some(self.values[[row, col]])
    }

    /// Column of sensitivities for one parameter.
    pub fn column(&self, parameter: &str) -> Option<ArrayView1<'_, f64>> {
        self.parameter_index(parameter).map(|col| self.values.column(col))
    }

    /// Row of sensitivities for one observation.
    pub fn row(&self, observation: &str) -> Option<ArrayView1<'_, f64>> {
        self.observation_index(observation).map(|row| self.values.row(row))
    }
}

fn build_index(names: &[String]) -> HashMap<String, usize> {
    let mut index = HashMap::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        index.entry(name.clone()).or_insert(i);
    }
    index
}

/// Read a Jacobian file and check its header against the caller's counts.
///
/// Parameters
/// ----------
/// - `path`: file to decode.
/// - `n_par`, `n_obs`: expected dimensions, typically `NPAR` and
///   `NOBS + NPRIOR` from the control file.
///
/// Errors
/// ------
/// - `PestError::Io` when the file cannot be read, `PestError::Truncated`
///   when it ends early.
/// - `PestError::DimensionMismatch` when the header disagrees with
///   `n_par`/`n_obs`.
/// - `PestError::LinearIndexOutOfRange` when a record index falls outside
///   `[1, n_par * n_obs]`.
pub fn parse(path: impl AsRef<Path>, n_par: usize, n_obs: usize) -> PestResult<JacobianMatrix> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| PestError::io(path, e))?;
    let jco = decode(&bytes, Some((n_par, n_obs)))?;
    log::info!(
        "loaded jacobian {} ({} observations x {} parameters)",
        path.display(),
        jco.n_obs(),
        jco.n_par()
    );
    Ok(jco)
}

/// Read a Jacobian file, trusting the dimensions stored in its header.
pub fn read(path: impl AsRef<Path>) -> PestResult<JacobianMatrix> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| PestError::io(path, e))?;
    let jco = decode(&bytes, None)?;
    log::info!(
        "loaded jacobian {} ({} observations x {} parameters)",
        path.display(),
        jco.n_obs(),
        jco.n_par()
    );
    Ok(jco)
}

/// Decode an in-memory Jacobian buffer.
///
/// `expected` is an optional `(n_par, n_obs)` pair checked against the
/// header. See the module docs for the layout.
pub fn decode(bytes: &[u8], expected: Option<(usize, usize)>) -> PestResult<JacobianMatrix> {
    let mut cur = ByteCursor::new(bytes);
    let n_par = cur.read_i32()?.unsigned_abs() as usize;
    let n_obs = cur.read_i32()?.unsigned_abs() as usize;
    let n_records = cur.read_i32()?;
    if n_records < 0 {
        return Err(PestError::NegativeRecordCount { value: n_records });
    }

    if let Some((exp_par, exp_obs)) = expected {
        if exp_par != n_par {
            return Err(PestError::DimensionMismatch {
                operation: "jacobian header parameters",
                expected: exp_par,
                found: n_par,
            });
        }
        if exp_obs != n_obs {
            return Err(PestError::DimensionMismatch {
                operation: "jacobian header observations",
                expected: exp_obs,
                found: n_obs,
            });
        }
    }
    log::debug!("jacobian header: npar={n_par} nobs={n_obs} records={n_records}");

    // Size the body from the header before allocating the dense matrix.
    let body = body_len(n_records as usize, n_par, n_obs);
    let Some((_, max)) = body.filter(|&(needed, _)| needed <= cur.remaining()) else {
        return Err(PestError::Truncated {
            offset: cur.pos(),
            needed: body.map_or(usize::MAX, |(needed, _)| needed),
            available: cur.remaining(),
        });
    };

    let mut values = Array2::<f64>::zeros((n_obs, n_par));
    for _ in 0..n_records {
        let j = cur.read_i32()?;
        let value = cur.read_f64()?;
        if j < 1 || j as usize > max {
            return Err(PestError::LinearIndexOutOfRange { index: i64::from(j), max });
        }
        let j = j as usize;
        let col = (j - 1) / n_obs + 1;
        let row = j - (col - 1) * n_obs;
        values[[row - 1, col - 1]] = value;
    }

    let parameters =
        (0..n_par).map(|_| cur.read_name(PARAMETER_NAME_WIDTH)).collect::<PestResult<Vec<_>>>()?;
    let observations = (0..n_obs)
        .map(|_| cur.read_name(OBSERVATION_NAME_WIDTH))
        .collect::<PestResult<Vec<_>>>()?;

    if cur.remaining() > 0 {
        return Err(PestError::TrailingBytes { count: cur.remaining() });
    }

    JacobianMatrix::new(values, parameters, observations)
}

/// Bytes of record and name data implied by the header, with the cell count.
///
/// `None` when either product overflows `usize`.
fn body_len(n_records: usize, n_par: usize, n_obs: usize) -> Option<(usize, usize)> {
    let records = n_records.checked_mul(RECORD_WIDTH)?;
    let names = n_par
        .checked_mul(PARAMETER_NAME_WIDTH)?
        .checked_add(n_obs.checked_mul(OBSERVATION_NAME_WIDTH)?)?;
    let cells = n_par.checked_mul(n_obs)?;
    Some((records.checked_add(names)?, cells))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Placement of sparse records via column-major linear indices.
    // - Zero fill of cells absent from the record stream.
    // - Name decoding (trim + lowercase).
    // - Error paths: out-of-range index, truncation, header mismatch,
    //   negative record count, trailing bytes.
    //
    // They intentionally DO NOT cover:
    // - Statistics computed from the decoded matrix (see `stats`).
    // -------------------------------------------------------------------------

    /// Encode a Jacobian buffer in the on-disk layout.
    pub(crate) fn encode_jco(
        n_par: i32, n_obs: i32, records: &[(i32, f64)], pars: &[&str], obs: &[&str],
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&n_par.to_le_bytes());
        buf.extend_from_slice(&n_obs.to_le_bytes());
        buf.extend_from_slice(&(records.len() as i32).to_le_bytes());
        for (j, v) in records {
            buf.extend_from_slice(&j.to_le_bytes());
            buf.extend_from_slice(&v.to_le_bytes());
        }
        for p in pars {
            buf.extend_from_slice(format!("{:<12}", p).as_bytes());
        }
        for o in obs {
            buf.extend_from_slice(format!("{:<20}", o).as_bytes());
        }
        buf
    }

    #[test]
    // Purpose
    // -------
    // Verify that three sparse records land at their hand-computed cells and
    // that the remaining cell is exactly zero.
    //
    // Given
    // -----
    // - n_par = 2, n_obs = 2 and records j=1 → (0,0), j=2 → (1,0),
    //   j=4 → (1,1).
    //
    // Expect
    // ------
    // - values == [[1.5, 0.0], [-2.0, 3.25]] and lowercased labels.
    fn decode_places_records_column_major_and_zero_fills() {
        // Arrange
        let buf = encode_jco(2, 2, &[(1, 1.5), (2, -2.0), (4, 3.25)], &["HK", "RCH"], &["OBS1", "obs2"]);

        // Act
        let jco = decode(&buf, Some((2, 2))).unwrap();

        // Assert
        assert_eq!(jco.values(), &array![[1.5, 0.0], [-2.0, 3.25]]);
        assert_eq!(jco.values()[[0, 1]], 0.0);
        assert_eq!(jco.parameters(), &["hk".to_string(), "rch".to_string()]);
        assert_eq!(jco.observations(), &["obs1".to_string(), "obs2".to_string()]);
        assert_eq!(jco.value("OBS2", "rch"), Some(3.25));
    }

    #[test]
    // Purpose
    // -------
    // Ensure negative header dimensions are read by absolute value.
    //
    // Given
    // -----
    // - Header n_par = -1, n_obs = -3 with one record at j = 3.
    //
    // Expect
    // ------
    // - A 3x1 matrix with value at row 2.
    fn decode_uses_absolute_header_dimensions() {
        let buf = encode_jco(-1, -3, &[(3, 7.0)], &["p"], &["a", "b", "c"]);

        let jco = decode(&buf, None).unwrap();

        assert_eq!(jco.n_par(), 1);
        assert_eq!(jco.n_obs(), 3);
        assert_eq!(jco.values()[[2, 0]], 7.0);
        assert_eq!(jco.column("p").unwrap().to_vec(), vec![0.0, 0.0, 7.0]);
    }

    #[test]
    // Purpose
    // -------
    // Ensure indices outside [1, n_par * n_obs] are rejected as format errors.
    //
    // Given
    // -----
    // - A 2x2 matrix with a record at j = 5 and another at j = 0.
    //
    // Expect
    // ------
    // - `LinearIndexOutOfRange` for both.
    fn decode_rejects_out_of_range_indices() {
        for bad in [5, 0] {
            let buf = encode_jco(2, 2, &[(bad, 1.0)], &["a", "b"], &["x", "y"]);

            let err = decode(&buf, None).unwrap_err();

            assert_eq!(err, PestError::LinearIndexOutOfRange { index: i64::from(bad), max: 4 });
            assert_eq!(err.kind(), ErrorKind::Format);
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure a buffer cut inside the name block is an I/O-category error.
    //
    // Given
    // -----
    // - A valid buffer with its last 5 bytes removed.
    //
    // Expect
    // ------
    // - `PestError::Truncated` with kind `Io`.
    fn decode_reports_truncation_as_io_error() {
        let mut buf = encode_jco(1, 1, &[(1, 1.0)], &["a"], &["x"]);
        buf.truncate(buf.len() - 5);

        let err = decode(&buf, None).unwrap_err();

        assert!(matches!(err, PestError::Truncated { .. }));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    // Purpose
    // -------
    // Ensure a header claiming more data than the buffer holds fails before
    // the matrix is allocated.
    //
    // Given
    // -----
    // - A bare 12-byte header with n_par = n_obs = i32::MAX and no records.
    // - A header declaring 3 records followed by only one.
    //
    // Expect
    // ------
    // - `PestError::Truncated` at offset 12 for both, never a panic.
    fn decode_rejects_header_larger_than_buffer() {
        // Arrange
        let mut huge = Vec::new();
        huge.extend_from_slice(&i32::MAX.to_le_bytes());
        huge.extend_from_slice(&i32::MAX.to_le_bytes());
        huge.extend_from_slice(&0i32.to_le_bytes());

        let mut short = encode_jco(1, 1, &[(1, 1.0)], &["a"], &["x"]);
        short[8..12].copy_from_slice(&3i32.to_le_bytes());

        // Act
        let huge_err = decode(&huge, None).unwrap_err();
        let short_err = decode(&short, None).unwrap_err();

        // Assert
        assert!(matches!(huge_err, PestError::Truncated { offset: 12, available: 0, .. }));
        assert_eq!(huge_err.kind(), ErrorKind::Io);
        assert_eq!(
            short_err,
            PestError::Truncated { offset: 12, needed: 3 * 12 + 12 + 20, available: 12 + 12 + 20 }
        );
    }

    #[test]
    fn decode_rejects_header_disagreeing_with_caller_counts() {
        let buf = encode_jco(2, 1, &[], &["a", "b"], &["x"]);

        let err = decode(&buf, Some((3, 1))).unwrap_err();

        assert_eq!(
            err,
            PestError::DimensionMismatch {
                operation: "jacobian header parameters",
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn decode_rejects_negative_record_count_and_trailing_bytes() {
        let mut neg = Vec::new();
        neg.extend_from_slice(&1i32.to_le_bytes());
        neg.extend_from_slice(&1i32.to_le_bytes());
        neg.extend_from_slice(&(-1i32).to_le_bytes());
        assert_eq!(decode(&neg, None).unwrap_err(), PestError::NegativeRecordCount { value: -1 });

        let mut extra = encode_jco(1, 1, &[], &["a"], &["x"]);
        extra.push(0);
        assert_eq!(decode(&extra, None).unwrap_err(), PestError::TrailingBytes { count: 1 });
    }

    #[test]
    fn parse_reads_from_disk_and_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.jco");
        std::fs::write(&path, encode_jco(1, 2, &[(2, 4.0)], &["k"], &["h1", "h2"])).unwrap();

        let jco = parse(&path, 1, 2).unwrap();
        assert_eq!(jco.row("h2").unwrap().to_vec(), vec![4.0]);

        let err = read(dir.path().join("absent.jco")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn new_rejects_label_shape_mismatch() {
        let err = JacobianMatrix::new(Array2::zeros((2, 1)), vec!["p".into()], vec!["o".into()])
            .unwrap_err();

        assert!(matches!(err, PestError::DimensionMismatch { expected: 2, found: 1, .. }));
    }
}
