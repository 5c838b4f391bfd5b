//! io — readers for the files a PEST run leaves behind.
//!
//! Purpose
//! -------
//! Turn the run-control file, the binary Jacobian, the residuals table and
//! parameter-value files into immutable, name-indexed Rust values that the
//! statistics engines consume by reference.
//!
//! Key behaviors
//! -------------
//! - [`control`]: tag-delimited `.pst` parser producing [`ControlFile`].
//! - [`jacobian`]: bit-exact decoder for the binary `.jco` layout producing
//!   [`JacobianMatrix`].
//! - [`residuals`]: content-located `.res`/`.rei` table loader producing
//!   [`ResidualsTable`].
//! - [`parfile`]: `.par` loader producing [`ParameterValues`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Every file is read whole, parsed once, and released; no handles are
//!   kept open.
//! - Names are lowercased at ingestion in every reader so that lookups are
//!   case-insensitive across files.
//! - Every reader fails fast with a [`PestError`](crate::errors::PestError);
//!   no partial values are returned.
//!
//! Downstream usage
//! ----------------
//! - Parse each file once and share the values by reference; the Jacobian in
//!   particular is the dominant I/O cost.
pub mod control;
pub(crate) mod cursor;
pub mod jacobian;
pub mod parfile;
pub mod residuals;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::control::ControlFile;
pub use self::jacobian::JacobianMatrix;
pub use self::parfile::ParameterValues;
pub use self::residuals::{ResidualRecord, ResidualsTable};

pub mod prelude {
    pub use super::control::{
        ControlData, ControlFile, ObservationData, ParameterData, ParameterTransform,
        PriorInformation,
    };
    pub use super::jacobian::JacobianMatrix;
    pub use super::parfile::ParameterValues;
    pub use super::residuals::{ResidualRecord, ResidualsTable};
}
