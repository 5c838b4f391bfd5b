//! pest_diagnostics — post-processing of PEST parameter-estimation runs.
//!
//! Purpose
//! -------
//! Read the files a PEST run leaves behind (control file, binary Jacobian,
//! residuals table, parameter values) and derive the statistics used to
//! diagnose calibration quality: parameter covariance, correlation and
//! eigen-decomposition, composite parameter sensitivity, residual summaries
//! and truncated-SVD identifiability.
//!
//! Key behaviors
//! -------------
//! - [`io`] parses each file once into an immutable, name-indexed value.
//! - [`stats`] derives covariance-family matrices and residual summaries.
//! - [`sensitivity`] filters observation weights and computes per-parameter
//!   sensitivity.
//! - [`identifiability`] measures parameter resolution from a truncated SVD of
//!   the weighted Jacobian.
//!
//! Invariants & assumptions
//! ------------------------
//! - Parsers fail fast on the first structural anomaly; engines never
//!   substitute defaults for failed computations.
//! - All names are lowercased at ingestion, so lookups are case-insensitive.
//! - Engines borrow parsed values and never mutate them; a parsed Jacobian can
//!   be shared across every engine.
//!
//! Conventions
//! -----------
//! - Jacobian rows are observations (then prior information) and columns are
//!   parameters; every derived matrix follows the Jacobian column order.
//! - Errors are reported through [`errors::PestError`], grouped by
//!   [`errors::ErrorKind`].
//! - Progress is reported through the `log` facade; the library installs no
//!   logger.
//!
//! Downstream usage
//! ----------------
//! ```no_run
//! use pest_diagnostics::prelude::*;
//!
//! # fn main() -> PestResult<()> {
//! let pst = io::control::parse("case.pst")?;
//! let jco = io::jacobian::parse("case.jco", pst.control.npar, pst.control.nobs + pst.control.nprior)?;
//! let res = io::residuals::parse("case.rei")?;
//!
//! let cov = StatisticalMatrixEngine::new(&jco, &res)?.covariance()?;
//! let cor = cov.correlation()?;
//!
//! let weights = FilterPolicy::new().with_drop_regularisation(true).effective_weights(&jco, &res)?;
//! let sen = SensitivityVector::from_weights(&jco, &pst, &weights)?;
//! let ident = Identifiability::compute(&jco, &weights, 5)?;
//! # let _ = (cor, sen, ident);
//! # Ok(())
//! # }
//! ```
//!
//! Testing notes
//! -------------
//! - Each module carries unit tests; `tests/integration_pest_pipeline.rs`
//!   drives the whole pipeline from files on disk.

pub mod errors;
pub mod identifiability;
pub mod io;
pub mod sensitivity;
pub mod stats;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::errors::{ErrorKind, PestError, PestResult};
pub use self::identifiability::Identifiability;
pub use self::io::{ControlFile, JacobianMatrix, ParameterValues, ResidualsTable};
pub use self::sensitivity::{EffectiveWeights, FilterPolicy, SensitivityVector, WeightSource};
pub use self::stats::{
    CorrelationMatrix, CovarianceMatrix, EigenDecomposition, ResidualSummary,
    StatisticalMatrixEngine, SummaryOptions, VarianceKind,
};

// ---- Optional convenience prelude for downstream crates ------------------
//
// `use pest_diagnostics::prelude::*;` imports the readers and engines in a
// single line.

pub mod prelude {
    pub use crate::errors::{ErrorKind, PestError, PestResult};
    pub use crate::identifiability::Identifiability;
    pub use crate::io::{self, prelude::*};
    pub use crate::sensitivity::prelude::*;
    pub use crate::stats::prelude::*;
}
