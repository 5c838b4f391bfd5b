//! errors — crate-wide error taxonomy for PEST post-processing.
//!
//! Purpose
//! -------
//! Provide a single error enum, [`PestError`], and result alias,
//! [`PestResult`], shared by the control-file parser, the binary Jacobian
//! decoder, the residuals loader, and the statistics engines built on top of
//! them. Every variant belongs to exactly one [`ErrorKind`] so callers can
//! branch on the failure category without matching individual variants.
//!
//! Key behaviors
//! -------------
//! - Group failures into four categories: I/O (missing, unreadable or
//!   truncated input), format (bad tag structure or binary layout), schema
//!   (field count/type or declared-count mismatches, with line context), and
//!   degenerate input (zero degrees of freedom, all-zero weights, singular or
//!   non-convergent linear algebra).
//! - Attach human-readable `Display` messages that embed the offending
//!   payload (line number, field name, matrix dimensions).
//!
//! Invariants & assumptions
//! ------------------------
//! - Parsers fail fast on the first structural anomaly; no variant represents
//!   a partially parsed value.
//! - Linear-algebra variants always carry the operation name and the matrix
//!   dimensions involved.
//! - Line numbers are 1-based physical line numbers of the input text.
//!
//! Conventions
//! -----------
//! - Payloads are small owned values (`String`, `usize`, `&'static str`) so
//!   errors are cheap to clone and compare in tests.
//! - `std::io::Error` is converted at the call site together with the path
//!   that failed, since the bare I/O error carries no file context.
//!
//! Testing notes
//! -------------
//! - Unit tests below verify category mapping and payload embedding in the
//!   `Display` output.

use std::path::Path;

/// Crate-wide result alias.
pub type PestResult<T> = Result<T, PestError>;

/// Failure category of a [`PestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing, unreadable or truncated input.
    Io,
    /// Malformed text structure or binary layout.
    Format,
    /// Field count/type mismatch against a section schema or declared count.
    Schema,
    /// Numerically degenerate input for a statistics engine.
    DegenerateInput,
}

/// PestError — unified error type for parsing and statistics.
///
/// Purpose
/// -------
/// Represent every failure the crate can report. Variants are grouped by
/// [`ErrorKind`]; use [`PestError::kind`] to recover the category.
///
/// Invariants
/// ----------
/// - `line` payloads are 1-based.
/// - `operation` payloads name the computation that failed (e.g.
///   `"covariance"`), and `rows`/`cols` give the shape of the matrix it was
///   operating on.
#[derive(Debug, Clone, PartialEq)]
pub enum PestError {
    // ---- I/O ----
    /// File could not be opened or read.
    Io { path: String, reason: String },

    /// Binary stream ended before a complete value could be read.
    Truncated { offset: usize, needed: usize, available: usize },

    // ---- Format ----
    /// A required section tag never appeared.
    MissingSection { section: &'static str },

    /// A section tag appeared more than once.
    DuplicateSection { section: &'static str, line: usize },

    /// A tag, stray line, or end of input appeared where a record was expected.
    UnexpectedTag { section: &'static str, line: usize },

    /// The fixed head of a file does not have the expected shape.
    InvalidHeader { line: usize, reason: String },

    /// No residuals header row (name + residual columns) was found.
    MissingHeaderRow,

    /// A decoded Jacobian linear index falls outside `[1, n_par * n_obs]`.
    LinearIndexOutOfRange { index: i64, max: usize },

    /// A Jacobian header declares a negative record count.
    NegativeRecordCount { value: i32 },

    /// Bytes remain after the last Jacobian name field.
    TrailingBytes { count: usize },

    // ---- Schema ----
    /// A record has fewer fields than its section schema requires.
    FieldCount { line: usize, section: &'static str, expected: usize, found: usize },

    /// A field could not be converted to its schema type.
    FieldType { line: usize, field: &'static str, value: String },

    /// A declared count disagrees with the records actually present.
    CountMismatch { section: &'static str, declared: usize, found: usize },

    /// A name occurs twice in a section that must be keyed uniquely.
    DuplicateName { section: &'static str, name: String },

    /// A required residuals column is absent from the header row.
    MissingColumn { column: &'static str },

    /// A residuals column could not be derived from the columns present.
    UnderivableColumn { line: usize, column: &'static str },

    /// An observation name has no counterpart in the weight source.
    UnknownObservation { name: String },

    /// A parameter name has no counterpart in the control file.
    UnknownParameter { name: String },

    /// Two inputs disagree on a dimension.
    DimensionMismatch { operation: &'static str, expected: usize, found: usize },

    // ---- Degenerate input ----
    /// Non-zero weight count does not exceed the parameter count.
    NonPositiveDof { nonzero_weights: usize, n_par: usize },

    /// Every effective weight is zero.
    AllWeightsZero,

    /// A linear system is singular.
    SingularMatrix { operation: &'static str, rows: usize, cols: usize },

    /// An iterative decomposition did not converge.
    NoConvergence { operation: &'static str, rows: usize, cols: usize },

    /// A covariance diagonal entry is not strictly positive.
    NonPositiveVariance { parameter: String, value: f64 },

    /// A computation produced NaN or ±∞.
    NonFiniteResult { operation: &'static str, rows: usize, cols: usize },
}

impl PestError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PestError::Io { .. } | PestError::Truncated { .. } => ErrorKind::Io,
            PestError::MissingSection { .. }
            | PestError::DuplicateSection { .. }
            | PestError::UnexpectedTag { .. }
            | PestError::InvalidHeader { .. }
            | PestError::MissingHeaderRow
            | PestError::LinearIndexOutOfRange { .. }
            | PestError::NegativeRecordCount { .. }
            | PestError::TrailingBytes { .. } => ErrorKind::Format,
            PestError::FieldCount { .. }
            | PestError::FieldType { .. }
            | PestError::CountMismatch { .. }
            | PestError::DuplicateName { .. }
            | PestError::MissingColumn { .. }
            | PestError::UnderivableColumn { .. }
            | PestError::UnknownObservation { .. }
            | PestError::UnknownParameter { .. }
            | PestError::DimensionMismatch { .. } => ErrorKind::Schema,
            PestError::NonPositiveDof { .. }
            | PestError::AllWeightsZero
            | PestError::SingularMatrix { .. }
            | PestError::NoConvergence { .. }
            | PestError::NonPositiveVariance { .. }
            | PestError::NonFiniteResult { .. } => ErrorKind::DegenerateInput,
        }
    }

    /// Build an [`PestError::Io`] from a failed filesystem call.
    pub(crate) fn io(path: &Path, err: std::io::Error) -> PestError {
        PestError::Io { path: path.display().to_string(), reason: err.to_string() }
    }
}

impl std::error::Error for PestError {}

impl std::fmt::Display for PestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- I/O ----
            PestError::Io { path, reason } => {
                write!(f, "I/O error reading {path}: {reason}")
            }
            PestError::Truncated { offset, needed, available } => {
                write!(
                    f,
                    "Input truncated at byte {offset}: needed {needed} bytes, {available} available"
                )
            }
            // ---- Format ----
            PestError::MissingSection { section } => {
                write!(f, "Required section '{section}' not found")
            }
            PestError::DuplicateSection { section, line } => {
                write!(f, "Section '{section}' repeated at line {line}")
            }
            PestError::UnexpectedTag { section, line } => {
                write!(f, "Unexpected tag or end of input in section '{section}' at line {line}")
            }
            PestError::InvalidHeader { line, reason } => {
                write!(f, "Invalid header at line {line}: {reason}")
            }
            PestError::MissingHeaderRow => {
                write!(f, "No header row containing 'name' and 'residual' columns")
            }
            PestError::LinearIndexOutOfRange { index, max } => {
                write!(f, "Jacobian linear index {index} outside [1, {max}]")
            }
            PestError::NegativeRecordCount { value } => {
                write!(f, "Jacobian header declares a negative record count: {value}")
            }
            PestError::TrailingBytes { count } => {
                write!(f, "{count} unexpected bytes after the Jacobian name fields")
            }
            // ---- Schema ----
            PestError::FieldCount { line, section, expected, found } => {
                write!(
                    f,
                    "Line {line} in section '{section}': expected at least {expected} fields, found {found}"
                )
            }
            PestError::FieldType { line, field, value } => {
                write!(f, "Line {line}: field {field} has invalid value '{value}'")
            }
            PestError::CountMismatch { section, declared, found } => {
                write!(
                    f,
                    "Section '{section}' declares {declared} records but {found} were found"
                )
            }
            PestError::DuplicateName { section, name } => {
                write!(f, "Duplicate name '{name}' in section '{section}'")
            }
            PestError::MissingColumn { column } => {
                write!(f, "Required column '{column}' missing from header row")
            }
            PestError::UnderivableColumn { line, column } => {
                write!(f, "Line {line}: column '{column}' cannot be derived from the columns present")
            }
            PestError::UnknownObservation { name } => {
                write!(f, "Observation '{name}' not found in weight source")
            }
            PestError::UnknownParameter { name } => {
                write!(f, "Parameter '{name}' not found in control file")
            }
            PestError::DimensionMismatch { operation, expected, found } => {
                write!(f, "{operation}: dimension mismatch, expected {expected}, found {found}")
            }
            // ---- Degenerate input ----
            PestError::NonPositiveDof { nonzero_weights, n_par } => {
                write!(
                    f,
                    "Non-positive degrees of freedom: {nonzero_weights} non-zero weights for {n_par} parameters"
                )
            }
            PestError::AllWeightsZero => {
                write!(f, "All effective observation weights are zero")
            }
            PestError::SingularMatrix { operation, rows, cols } => {
                write!(f, "{operation}: singular {rows}x{cols} matrix")
            }
            PestError::NoConvergence { operation, rows, cols } => {
                write!(f, "{operation}: decomposition of {rows}x{cols} matrix did not converge")
            }
            PestError::NonPositiveVariance { parameter, value } => {
                write!(f, "Variance of parameter '{parameter}' is not positive: {value}")
            }
            PestError::NonFiniteResult { operation, rows, cols } => {
                write!(f, "{operation}: non-finite entries in {rows}x{cols} result")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Category mapping through `PestError::kind`.
    // - Embedding of payload values (line, field, dimensions) in `Display`.
    //
    // They intentionally DO NOT cover:
    // - The call sites that raise each variant; those are exercised in the
    //   parser and engine modules.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that each category is reported for a representative variant.
    //
    // Given
    // -----
    // - One variant from each of the four categories.
    //
    // Expect
    // ------
    // - `kind()` returns the documented category.
    fn pest_error_kind_maps_each_category() {
        assert_eq!(
            PestError::Truncated { offset: 0, needed: 4, available: 1 }.kind(),
            ErrorKind::Io
        );
        assert_eq!(PestError::MissingSection { section: "parameter data" }.kind(), ErrorKind::Format);
        assert_eq!(
            PestError::FieldType { line: 3, field: "NPAR", value: "x".to_string() }.kind(),
            ErrorKind::Schema
        );
        assert_eq!(PestError::AllWeightsZero.kind(), ErrorKind::DegenerateInput);
    }

    #[test]
    // Purpose
    // -------
    // Ensure schema errors report both the line number and field name.
    //
    // Given
    // -----
    // - A `FieldType` error at line 12 for field `PARVAL1`.
    //
    // Expect
    // ------
    // - The message contains "12", "PARVAL1" and the offending value.
    fn field_type_display_includes_line_and_field() {
        // Arrange
        let err = PestError::FieldType { line: 12, field: "PARVAL1", value: "abc".to_string() };

        // Act
        let msg = err.to_string();

        // Assert
        assert!(msg.contains("12"), "missing line number.\nGot: {msg}");
        assert!(msg.contains("PARVAL1"), "missing field name.\nGot: {msg}");
        assert!(msg.contains("abc"), "missing offending value.\nGot: {msg}");
    }

    #[test]
    // Purpose
    // -------
    // Ensure linear-algebra failures carry operation and dimensions.
    //
    // Given
    // -----
    // - A `SingularMatrix` error for "covariance" on a 3x3 matrix.
    //
    // Expect
    // ------
    // - The message contains the operation name and "3x3".
    fn singular_matrix_display_includes_operation_and_shape() {
        let err = PestError::SingularMatrix { operation: "covariance", rows: 3, cols: 3 };

        let msg = err.to_string();

        assert!(msg.contains("covariance"));
        assert!(msg.contains("3x3"));
    }
}
