//! sensitivity — filtered observation weights and per-parameter sensitivity.
//!
//! Purpose
//! -------
//! Quantify how strongly each parameter influences the weighted
//! observations of a PEST run, optionally restricted to a subset of the
//! observations.
//!
//! Key behaviors
//! -------------
//! - [`WeightSource`] abstracts over where raw weights come from: the final
//!   [`ResidualsTable`](crate::io::ResidualsTable) or the initial
//!   [`ControlFile`](crate::io::ControlFile) (observations, then prior
//!   information).
//! - [`FilterPolicy`] masks raw weights into [`EffectiveWeights`] in a fixed
//!   stage order.
//! - [`SensitivityVector`] computes `‖J[:,p] ∘ w_eff‖₂ / nnz(w_eff)` for every
//!   parameter and offers rankings and group rollups.
//!
//! Invariants & assumptions
//! ------------------------
//! - Masking is monotonic: no stage raises a weight.
//! - An all-zero effective weight vector is a degenerate-input error.
//!
//! Downstream usage
//! ----------------
//! - Build one [`EffectiveWeights`] per policy and reuse it for both
//!   [`SensitivityVector::from_weights`] and
//!   [`Identifiability::compute`](crate::identifiability::Identifiability::compute).
//!
//! Testing notes
//! -------------
//! - `filter` tests cover stage semantics and weight-source alignment;
//!   `engine` tests cover the formula, rollups and error paths.
pub mod engine;
pub mod filter;

// ---- Re-exports (primary surface) -----------------------------------------

pub use self::engine::{ParameterSensitivity, SensitivityVector};
pub use self::filter::{EffectiveWeights, FilterPolicy, WeightSource};

pub mod prelude {
    pub use super::engine::{ParameterSensitivity, SensitivityVector};
    pub use super::filter::{EffectiveWeights, FilterPolicy, WeightSource};
}
