//! sensitivity::engine — composite scaled sensitivity per parameter.
//!
//! Purpose
//! -------
//! Compute, for every Jacobian column, `‖J[:,p] ∘ w_eff‖₂ / nnz(w_eff)` and
//! attach the parameter's declared group so results can be rolled up.
//!
//! Invariants & assumptions
//! ------------------------
//! - Entries follow Jacobian column order.
//! - Every Jacobian parameter must be declared in the control file.
//! - `nnz(w_eff) > 0`; an all-zero effective weight vector is an error.
//!
//! Conventions
//! -----------
//! - Rankings sort by sensitivity, ties keep column order.
//! - Group rollups (`sum_by_group`, `mean_by_group`) are sorted descending.
use std::collections::HashMap;

use ndarray::Axis;

use crate::errors::{PestError, PestResult};
use crate::io::{ControlFile, JacobianMatrix};
use crate::sensitivity::filter::{EffectiveWeights, FilterPolicy, WeightSource};
use crate::stats::linalg::weighted_rows;

/// Sensitivity of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSensitivity {
    pub parameter: String,
    pub group: String,
    /// `‖J[:,p] ∘ w_eff‖₂ / nnz(w_eff)`.
    ///
    /// Not monotone under masking: zeroing weights shrinks `nnz(w_eff)` and
    /// can raise this value. Compare [`Self::weighted_norm`] instead.
    pub sensitivity: f64,
    /// `‖J[:,p] ∘ w_eff‖₂` before normalisation; never increases when more
    /// weights are masked.
    pub weighted_norm: f64,
}

/// SensitivityVector — per-parameter sensitivities of one run.
///
/// Purpose
/// -------
/// Hold the sensitivity of every Jacobian parameter together with its
/// parameter group, and offer the rankings and group rollups reporting
/// code needs.
///
/// Invariants
/// ----------
/// - `entries` is in Jacobian column order.
/// - `nonzero_weights > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensitivityVector {
    entries: Vec<ParameterSensitivity>,
    nonzero_weights: usize,
}

impl SensitivityVector {
    /// compute — filter raw weights and derive sensitivities.
    ///
    /// Parameters
    /// ----------
    /// - `jacobian`: sensitivities, rows = observations.
    /// - `control`: provides each parameter's group.
    /// - `source`: raw weights and observation groups (residuals table or
    ///   control file).
    /// - `policy`: observation filter.
    ///
    /// Errors
    /// ------
    /// - `PestError::UnknownObservation` when a Jacobian row is missing from
    ///   `source`.
    /// - `PestError::UnknownParameter` when a Jacobian column is missing from
    ///   `control`.
    /// - `PestError::AllWeightsZero` when the policy leaves no weight.
    pub fn compute<W: WeightSource + ?Sized>(
        jacobian: &JacobianMatrix, control: &ControlFile, source: &W, policy: &FilterPolicy,
    ) -> PestResult<Self> {
        let weights = policy.effective_weights(jacobian, source)?;
        Self::from_weights(jacobian, control, &weights)
    }

    /// Derive sensitivities from precomputed effective weights.
    ///
    /// Errors
    /// ------
    /// - `PestError::DimensionMismatch` when `weights` is not aligned to the
    ///   Jacobian rows, plus the errors of [`Self::compute`].
    pub fn from_weights(
        jacobian: &JacobianMatrix, control: &ControlFile, weights: &EffectiveWeights,
    ) -> PestResult<Self> {
        if weights.weights().len() != jacobian.n_obs() {
            return Err(PestError::DimensionMismatch {
                operation: "sensitivity weights",
                expected: jacobian.n_obs(),
                found: weights.weights().len(),
            });
        }
        let nonzero_weights = weights.nonzero();
        if nonzero_weights == 0 {
            return Err(PestError::AllWeightsZero);
        }

        let wj = weighted_rows(jacobian.values(), weights.weights());
        let norms = wj.map_axis(Axis(0), |col| col.dot(&col).sqrt());
        let entries = jacobian
            .parameters()
            .iter()
            .zip(norms.iter())
            .map(|(name, &norm)| {
                let par = control
                    .parameter(name)
                    .ok_or_else(|| PestError::UnknownParameter { name: name.clone() })?;
                Ok(ParameterSensitivity {
                    parameter: name.clone(),
                    group: par.group.clone(),
                    sensitivity: norm / nonzero_weights as f64,
                    weighted_norm: norm,
                })
            })
            .collect::<PestResult<Vec<_>>>()?;

        log::debug!(
            "sensitivity: {} parameters over {} non-zero weights",
            entries.len(),
            nonzero_weights
        );
        Ok(SensitivityVector { entries, nonzero_weights })
    }

    /// Entries in Jacobian column order.
    pub fn entries(&self) -> &[ParameterSensitivity] {
        &self.entries
    }

    pub fn nonzero_weights(&self) -> usize {
        self.nonzero_weights
    }

    /// Sensitivity of one parameter (case-insensitive).
    pub fn get(&self, parameter: &str) -> Option<f64> {
        let name = parameter.to_lowercase();
        self.entries.iter().find(|e| e.parameter == name).map(|e| e.sensitivity)
    }

    fn descending(&self) -> Vec<&ParameterSensitivity> {
        let mut sorted: Vec<&ParameterSensitivity> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.sensitivity.total_cmp(&a.sensitivity));
        sorted
    }

    /// The `n` most sensitive parameters, most sensitive first.
    pub fn most_sensitive(&self, n: usize) -> Vec<&ParameterSensitivity> {
        self.descending().into_iter().take(n).collect()
    }

    /// The `n` least sensitive parameters, least sensitive first.
    pub fn least_sensitive(&self, n: usize) -> Vec<&ParameterSensitivity> {
        let mut sorted: Vec<&ParameterSensitivity> = self.entries.iter().collect();
        sorted.sort_by(|a, b| a.sensitivity.total_cmp(&b.sensitivity));
        sorted.truncate(n);
        sorted
    }

    /// Parameters of one group, most sensitive first.
    pub fn group(&self, group: &str) -> Vec<&ParameterSensitivity> {
        let group = group.to_lowercase();
        self.descending().into_iter().filter(|e| e.group == group).collect()
    }

    /// `(group, Σ sensitivity, count)` in order of first appearance.
    fn group_totals(&self) -> Vec<(String, f64, usize)> {
        let mut totals: Vec<(String, f64, usize)> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for e in &self.entries {
            match index.get(e.group.as_str()) {
                Some(&i) => {
                    totals[i].1 += e.sensitivity;
                    totals[i].2 += 1;
                }
                None => {
                    index.insert(e.group.as_str(), totals.len());
                    totals.push((e.group.clone(), e.sensitivity, 1));
                }
            }
        }
        totals
    }

    /// Summed sensitivity per parameter group, largest first.
    pub fn sum_by_group(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> =
            self.group_totals().into_iter().map(|(g, sum, _)| (g, sum)).collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }

    /// Mean sensitivity per parameter group, largest first.
    pub fn mean_by_group(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .group_totals()
            .into_iter()
            .map(|(g, sum, count)| (g, sum / count as f64))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::io::control::parse_str as parse_pst;
    use crate::io::control::tests::MINIMAL_PST;
    use crate::io::residuals::{parse_str as parse_res, tests::MINIMAL_RES};
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The sensitivity formula on a hand-computed Jacobian.
    // - Rankings and group rollups.
    // - Effect of `drop_regularisation` on weights and weighted norms.
    // - Degenerate and unknown-name errors.
    // -------------------------------------------------------------------------

    const TOL: f64 = 1e-12;

    /// Jacobian over the minimal fixture: rows h1 h2 h3 q1 pi1, columns
    /// hk1 hk2 rch1.
    fn fixture_jco() -> JacobianMatrix {
        JacobianMatrix::new(
            array![
                [3.0, 0.0, 1.0],
                [4.0, 1.0, 0.0],
                [9.0, 9.0, 9.0],
                [0.0, 0.0, 200.0],
                [1.0, -1.0, 0.0]
            ],
            vec!["hk1".into(), "hk2".into(), "rch1".into()],
            vec!["h1".into(), "h2".into(), "h3".into(), "q1".into(), "pi1".into()],
        )
        .unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Verify the sensitivity formula against hand values.
    //
    // Given
    // -----
    // - Residual weights [1, 1, 0, 0.01, 2] (h3 zero-weighted), nnz = 4.
    //
    // Expect
    // ------
    // - hk1: ‖[3, 4, 0, 0, 2]‖ / 4 = sqrt(29) / 4.
    // - rch1: ‖[1, 0, 0, 2, 0]‖ / 4 = sqrt(5) / 4.
    fn compute_matches_hand_values() {
        // Arrange
        let pst = parse_pst(MINIMAL_PST).unwrap();
        let res = parse_res(MINIMAL_RES).unwrap();
        let jco = fixture_jco();

        // Act
        let sen = SensitivityVector::compute(&jco, &pst, &res, &FilterPolicy::new()).unwrap();

        // Assert
        assert_eq!(sen.nonzero_weights(), 4);
        assert_relative_eq!(sen.get("HK1").unwrap(), 29f64.sqrt() / 4.0, epsilon = TOL);
        assert_relative_eq!(sen.get("hk2").unwrap(), 5f64.sqrt() / 4.0, epsilon = TOL);
        assert_relative_eq!(sen.get("rch1").unwrap(), 5f64.sqrt() / 4.0, epsilon = TOL);
        assert_eq!(sen.entries()[2].group, "rch");
    }

    #[test]
    fn rankings_and_group_rollups() {
        let pst = parse_pst(MINIMAL_PST).unwrap();
        let res = parse_res(MINIMAL_RES).unwrap();
        let sen = SensitivityVector::compute(&fixture_jco(), &pst, &res, &FilterPolicy::new())
            .unwrap();

        let top: Vec<&str> = sen.most_sensitive(1).iter().map(|e| e.parameter.as_str()).collect();
        assert_eq!(top, vec!["hk1"]);
        let bottom = sen.least_sensitive(2);
        assert_eq!(bottom.len(), 2);
        assert!(bottom[0].sensitivity <= bottom[1].sensitivity);
        assert_eq!(sen.group("HK").len(), 2);

        let sums = sen.sum_by_group();
        assert_eq!(sums[0].0, "hk");
        assert_relative_eq!(sums[0].1, (29f64.sqrt() + 5f64.sqrt()) / 4.0, epsilon = TOL);
        let means = sen.mean_by_group();
        assert_relative_eq!(means[0].1, (29f64.sqrt() + 5f64.sqrt()) / 8.0, epsilon = TOL);
        assert_eq!(means[1].0, "rch");
    }

    #[test]
    // Purpose
    // -------
    // Ensure dropping regularisation only removes weight: no effective
    // weight and no weighted norm grows.
    //
    // Given
    // -----
    // - The fixture with and without `drop_regularisation`.
    //
    // Expect
    // ------
    // - pi1's effective weight becomes 0; every other weight is unchanged.
    // - Each parameter's weighted norm is <= its unfiltered value.
    // - rch1 has no pi1 entry, so its norm stays sqrt(5) while nnz drops from
    //   4 to 3: the normalised value rises from sqrt(5)/4 to sqrt(5)/3.
    fn drop_regularisation_only_removes_weight() {
        let pst = parse_pst(MINIMAL_PST).unwrap();
        let res = parse_res(MINIMAL_RES).unwrap();
        let jco = fixture_jco();
        let plain = FilterPolicy::new();
        let dropped = FilterPolicy::new().with_drop_regularisation(true);

        let w_plain = plain.effective_weights(&jco, &res).unwrap();
        let w_drop = dropped.effective_weights(&jco, &res).unwrap();
        let s_plain = SensitivityVector::from_weights(&jco, &pst, &w_plain).unwrap();
        let s_drop = SensitivityVector::from_weights(&jco, &pst, &w_drop).unwrap();

        assert_eq!(w_drop.get("pi1"), Some(0.0));
        for (a, b) in w_drop.weights().iter().zip(w_plain.weights().iter()) {
            assert!(a <= b);
        }
        for (a, b) in s_drop.entries().iter().zip(s_plain.entries().iter()) {
            assert!(a.weighted_norm <= b.weighted_norm);
        }
        assert_eq!(s_drop.nonzero_weights(), 3);
        assert_relative_eq!(s_plain.get("rch1").unwrap(), 5f64.sqrt() / 4.0, epsilon = 1e-12);
        assert_relative_eq!(s_drop.get("rch1").unwrap(), 5f64.sqrt() / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_and_unknown_inputs_are_rejected() {
        let pst = parse_pst(MINIMAL_PST).unwrap();
        let res = parse_res(MINIMAL_RES).unwrap();
        let jco = fixture_jco();

        let none = FilterPolicy::new().with_keep_groups(["nothing"]);
        let err = SensitivityVector::compute(&jco, &pst, &res, &none).unwrap_err();
        assert_eq!(err, PestError::AllWeightsZero);
        assert_eq!(err.kind(), ErrorKind::DegenerateInput);

        let stray = JacobianMatrix::new(
            array![[1.0], [1.0]],
            vec!["kx".into()],
            vec!["h1".into(), "h2".into()],
        )
        .unwrap();
        let err = SensitivityVector::compute(&stray, &pst, &res, &FilterPolicy::new()).unwrap_err();
        assert_eq!(err, PestError::UnknownParameter { name: "kx".into() });
    }
}
