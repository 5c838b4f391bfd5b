//! stats — covariance-family matrices and residual summaries.
//!
//! Purpose
//! -------
//! Derive the statistical artifacts used to judge calibration quality from
//! the immutable values produced by [`crate::io`].
//!
//! Key behaviors
//! -------------
//! - [`StatisticalMatrixEngine`] computes [`CovarianceMatrix`],
//!   [`CorrelationMatrix`] and [`EigenDecomposition`] from a Jacobian and
//!   the final residuals.
//! - [`ResidualSummary`] describes residuals per observation group, configured
//!   through [`SummaryOptions`].
//! - `linalg` bridges `ndarray` storage and `nalgebra` decompositions.
//!
//! Invariants & assumptions
//! ------------------------
//! - Results are recomputed per call; no engine mutates its inputs.
//! - Linear-algebra failures are never retried and always carry the
//!   operation name and matrix shape.
pub(crate) mod linalg;
pub mod matrices;
pub mod summary;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::matrices::{
    CorrelationMatrix, CovarianceMatrix, EigenDecomposition, StatisticalMatrixEngine,
};
pub use self::summary::{ResidualSummary, SummaryOptions, VarianceKind};

pub mod prelude {
    pub use super::matrices::{
        CorrelationMatrix, CovarianceMatrix, EigenDecomposition, StatisticalMatrixEngine,
    };
    pub use super::summary::{ResidualSummary, SummaryOptions, VarianceKind};
}
