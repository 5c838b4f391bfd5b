//! identifiability — parameter identifiability from a truncated SVD.
//!
//! Purpose
//! -------
//! Measure how well each parameter is resolved by the weighted observations:
//! decompose `diag(w)·J = U Σ Vᵀ` and, for a truncation rank `k`, sum the
//! squared components of each parameter over the first `k` right singular
//! vectors (largest singular values first).
//!
//! Key behaviors
//! -------------
//! - Singular values are sorted descending before truncation.
//! - `k` larger than the number of singular vectors, `min(n_obs, n_par)`, is
//!   clamped with a warning.
//! - Values lie in `[0, 1]` and are non-decreasing in `k`; at full rank with
//!   `n_obs >= n_par` every value is 1.
//!
//! Invariants & assumptions
//! ------------------------
//! - Weights are the effective weights of a [`FilterPolicy`] pass, aligned to
//!   the Jacobian rows.
//! - At least one weight is non-zero.
//!
//! Downstream usage
//! ----------------
//! - Compute sensitivities and identifiability from the same
//!   [`EffectiveWeights`] so both analyses see the same observations.
//!
//! [`FilterPolicy`]: crate::sensitivity::FilterPolicy
use ndarray::Array1;

use crate::errors::{PestError, PestResult};
use crate::io::JacobianMatrix;
use crate::sensitivity::EffectiveWeights;
use crate::stats::linalg::{MAX_ITER, ensure_finite, to_dmatrix, weighted_rows};

/// Identifiability — per-parameter identifiability for one truncation rank.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifiability {
    values: Array1<f64>,
    parameters: Vec<String>,
    singular_values: Array1<f64>,
    rank: usize,
}

impl Identifiability {
    /// compute — truncated-SVD identifiability of every Jacobian parameter.
    ///
    /// Parameters
    /// ----------
    /// - `jacobian`: sensitivities, rows = observations.
    /// - `weights`: effective weights aligned to the Jacobian rows.
    /// - `k`: number of leading singular vectors to keep.
    ///
    /// Errors
    /// ------
    /// - `PestError::DimensionMismatch` when `weights` is not aligned.
    /// - `PestError::AllWeightsZero` when every weight is zero.
    /// - `PestError::NonFiniteResult` when the weighted Jacobian holds NaN/∞.
    /// - `PestError::NoConvergence` when the SVD fails.
    pub fn compute(jacobian: &JacobianMatrix, weights: &EffectiveWeights, k: usize) -> PestResult<Self> {
        const OP: &str = "truncated svd";
        let (n_obs, n_par) = (jacobian.n_obs(), jacobian.n_par());
        if weights.weights().len() != n_obs {
            return Err(PestError::DimensionMismatch {
                operation: "identifiability weights",
                expected: n_obs,
                found: weights.weights().len(),
            });
        }
        if weights.nonzero() == 0 {
            return Err(PestError::AllWeightsZero);
        }

        let wj = weighted_rows(jacobian.values(), weights.weights());
        ensure_finite(&wj, OP)?;
        let svd = to_dmatrix(wj.view())
            .try_svd(false, true, f64::EPSILON, MAX_ITER)
            .ok_or(PestError::NoConvergence { operation: OP, rows: n_obs, cols: n_par })?;
        let v_t = svd.v_t.ok_or(PestError::NoConvergence { operation: OP, rows: n_obs, cols: n_par })?;

        let n_sv = svd.singular_values.len();
        let mut order: Vec<usize> = (0..n_sv).collect();
        order.sort_by(|&a, &b| svd.singular_values[b].total_cmp(&svd.singular_values[a]));
        let singular_values = Array1::from_iter(order.iter().map(|&i| svd.singular_values[i]));

        let rank = if k > n_sv {
            log::warn!("truncation rank {k} exceeds {n_sv} singular vectors; using {n_sv}");
            n_sv
        } else {
            k
        };

        let values = Array1::from_shape_fn(n_par, |p| {
            order[..rank].iter().map(|&i| v_t[(i, p)] * v_t[(i, p)]).sum::<f64>()
        });
        log::debug!("identifiability: rank {rank} of {n_sv}, {n_par} parameters");

        Ok(Identifiability { values, parameters: jacobian.parameters().to_vec(), singular_values, rank })
    }

    /// Identifiability in Jacobian column order.
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Full singular spectrum of the weighted Jacobian, descending.
    pub fn singular_values(&self) -> &Array1<f64> {
        &self.singular_values
    }

    /// Truncation rank actually used (after clamping).
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Identifiability of one parameter (case-insensitive).
    pub fn get(&self, parameter: &str) -> Option<f64> {
        let name = parameter.to_lowercase();
        self.parameters.iter().position(|p| *p == name).map(|i| self.values[i])
    }

    /// The `n` most identifiable parameters, highest first.
    pub fn most_identifiable(&self, n: usize) -> Vec<(&str, f64)> {
        let mut pairs: Vec<(&str, f64)> =
            self.parameters.iter().map(String::as_str).zip(self.values.iter().copied()).collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs.truncate(n);
        pairs
    }
}
