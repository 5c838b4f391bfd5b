//! stats::linalg — `ndarray` ⇄ `nalgebra` bridging helpers.
//!
//! Purpose
//! -------
//! Values exposed to callers are `ndarray` arrays; decompositions run on
//! `nalgebra::DMatrix`. These helpers copy between the two, build the
//! weighted Jacobian, and validate finiteness so that engines can report
//! failures with the operation name and matrix shape attached.
//!
//! Conventions
//! -----------
//! - Copies are explicit and column-major on the `nalgebra` side.
//! - [`fill_upper_symmetric`] reads only the upper triangle of its input.
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::errors::{PestError, PestResult};

/// Iteration cap for iterative decompositions (eigen, SVD).
pub(crate) const MAX_ITER: usize = 10_000;

/// Copy a general `ndarray` matrix into a new `DMatrix`.
pub(crate) fn to_dmatrix(a: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Copy a `DMatrix` back into an `ndarray` matrix.
pub(crate) fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// fill_upper_symmetric — copy the upper triangle of `a` into both
/// triangles of `out`.
///
/// `out` ends up exactly symmetric and depends only on `a[[i, j]]` for
/// `i <= j`; the strict lower triangle of `a` is never read. `nalgebra`'s
/// symmetric eigensolver reads the lower triangle, so this fixes which half
/// of a covariance matrix drives the decomposition.
///
/// Panics
/// ------
/// - If `a` and `out` are not both `n×n` with the same `n`.
pub(crate) fn fill_upper_symmetric(a: &Array2<f64>, out: &mut DMatrix<f64>) {
    let n = a.ncols();
    for j in 0..n {
        for i in 0..=j {
            let v = a[[i, j]];
            out[(i, j)] = v;
            out[(j, i)] = v;
        }
    }
}

/// Scale row `i` of `j` by `w[i]`, i.e. `diag(w) · J`.
pub(crate) fn weighted_rows(j: &Array2<f64>, w: &Array1<f64>) -> Array2<f64> {
    j * &w.view().insert_axis(Axis(1))
}

/// Fail with `NonFiniteResult` if any entry of `a` is NaN or infinite.
pub(crate) fn ensure_finite(a: &Array2<f64>, operation: &'static str) -> PestResult<()> {
    if a.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(PestError::NonFiniteResult { operation, rows: a.nrows(), cols: a.ncols() })
    }
}
