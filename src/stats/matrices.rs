//! stats::matrices — covariance, correlation and eigen-decomposition.
//!
//! Purpose
//! -------
//! Derive the posterior parameter covariance matrix of a PEST run from its
//! Jacobian and final residuals, plus the correlation matrix and the
//! symmetric eigen-decomposition of the covariance.
//!
//! Key behaviors
//! -------------
//! - [`StatisticalMatrixEngine`] borrows a [`JacobianMatrix`] and caches the
//!   weight vector `w` (aligned to the Jacobian rows) and `phi`, both taken
//!   from a [`ResidualsTable`].
//! - `cov = phi / (nnz(w) − n_par) · (Jᵀ · diag(w²) · J)⁻¹`.
//! - `cor[i,j] = cov[i,j] / sqrt(cov[i,i] · cov[j,j])` with the diagonal set
//!   to exactly `1.0`.
//! - The eigen-decomposition reads only the upper triangle of `cov` and
//!   returns eigenvalues in ascending order with matching eigenvector
//!   columns.
//!
//! Invariants & assumptions
//! ------------------------
//! - Every result is a pure function of the cached `(J, w, phi)` triple and
//!   is recomputed on each call.
//! - Covariance output is exactly symmetric.
//! - Weights come from the residuals table, not the control file: PEST
//!   adjusts regularisation weights during the run, so only the final table
//!   reflects the objective function that was minimised.
//!
//! Conventions
//! -----------
//! - Matrices are `n_par × n_par` and indexed in Jacobian column order; each
//!   result carries its parameter labels.
//! - Failures carry the operation name and matrix shape.
//!
//! Downstream usage
//! ----------------
//! - `let eng = StatisticalMatrixEngine::new(&jco, &res)?;` then
//!   `eng.covariance()?`, `.correlation()?` or `.eigen()?`. When more than
//!   one artifact is needed, compute the covariance once and derive the
//!   others from it via [`CovarianceMatrix::correlation`] and
//!   [`CovarianceMatrix::eigen`].
//!
//! Testing notes
//! -------------
//! - Unit tests check covariance against a hand-computed 2-parameter case,
//!   correlation diagonal and symmetry, eigenvalue ordering and the
//!   upper-triangle convention, and the degenerate-input errors.
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

use crate::errors::{PestError, PestResult};
use crate::io::control::is_regularisation_group;
use crate::io::{JacobianMatrix, ResidualsTable};
use crate::stats::linalg::{
    MAX_ITER, ensure_finite, fill_upper_symmetric, to_array2, to_dmatrix, weighted_rows,
};

/// Position of `name` in `parameters` (case-insensitive).
fn position(parameters: &[String], name: &str) -> Option<usize> {
    let name = name.to_lowercase();
    parameters.iter().position(|p| *p == name)
}

/// CovarianceMatrix — posterior parameter covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    values: Array2<f64>,
    parameters: Vec<String>,
}

impl CovarianceMatrix {
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Covariance of two parameters by name.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.values[[position(&self.parameters, a)?, position(&self.parameters, b)?]])
    }

    /// Variance of one parameter.
    pub fn variance(&self, parameter: &str) -> Option<f64> {
        self.get(parameter, parameter)
    }

    /// Square roots of the diagonal, in parameter order.
    pub fn standard_deviations(&self) -> Array1<f64> {
        self.values.diag().mapv(f64::sqrt)
    }

    /// correlation — normalise the covariance to unit diagonal.
    ///
    /// Errors
    /// ------
    /// - `PestError::NonPositiveVariance` when a diagonal entry is not
    ///   strictly positive (or not finite).
    pub fn correlation(&self) -> PestResult<CorrelationMatrix> {
        let diag = self.values.diag();
        for (p, &v) in self.parameters.iter().zip(diag.iter()) {
            if !(v > 0.0 && v.is_finite()) {
                return Err(PestError::NonPositiveVariance { parameter: p.clone(), value: v });
            }
        }
        let sd = self.standard_deviations();
        let n = self.parameters.len();
        let values = Array2::from_shape_fn((n, n), |(i, j)| {
            if i == j { 1.0 } else { self.values[[i, j]] / (sd[i] * sd[j]) }
        });
        Ok(CorrelationMatrix { values, parameters: self.parameters.clone() })
    }

    /// eigen — symmetric eigen-decomposition from the upper triangle.
    ///
    /// Returns
    /// -------
    /// [`EigenDecomposition`] with ascending eigenvalues; column `k` of the
    /// eigenvector matrix belongs to eigenvalue `k` and rows follow
    /// parameter order.
    ///
    /// Errors
    /// ------
    /// - `PestError::NonFiniteResult` if the covariance holds NaN/∞.
    /// - `PestError::NoConvergence` if the iterative solver fails.
    pub fn eigen(&self) -> PestResult<EigenDecomposition> {
        const OP: &str = "eigen-decomposition";
        let n = self.parameters.len();
        ensure_finite(&self.values, OP)?;

        let mut m = DMatrix::<f64>::zeros(n, n);
        fill_upper_symmetric(&self.values, &mut m);
        let eig = m
            .try_symmetric_eigen(f64::EPSILON, MAX_ITER)
            .ok_or(PestError::NoConvergence { operation: OP, rows: n, cols: n })?;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
        let eigenvalues = Array1::from_iter(order.iter().map(|&k| eig.eigenvalues[k]));
        let eigenvectors = Array2::from_shape_fn((n, n), |(i, c)| eig.eigenvectors[(i, order[c])]);
        ensure_finite(&eigenvectors, OP)?;

        Ok(EigenDecomposition { eigenvalues, eigenvectors, parameters: self.parameters.clone() })
    }
}

/// CorrelationMatrix — parameter correlation with unit diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    values: Array2<f64>,
    parameters: Vec<String>,
}

impl CorrelationMatrix {
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.values[[position(&self.parameters, a)?, position(&self.parameters, b)?]])
    }

    /// Off-diagonal pairs `(a, b, r)` with `|r| >= threshold`, upper
    /// triangle only, strongest first.
    pub fn strong_pairs(&self, threshold: f64) -> Vec<(&str, &str, f64)> {
        let n = self.parameters.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let r = self.values[[i, j]];
                if r.abs() >= threshold {
                    pairs.push((self.parameters[i].as_str(), self.parameters[j].as_str(), r));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
        pairs
    }
}

/// EigenDecomposition — eigenvalues (ascending) and eigenvectors of the
/// covariance matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct EigenDecomposition {
    eigenvalues: Array1<f64>,
    eigenvectors: Array2<f64>,
    parameters: Vec<String>,
}

impl EigenDecomposition {
    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    /// Rows are parameters, column `k` pairs with `eigenvalues()[k]`.
    pub fn eigenvectors(&self) -> &Array2<f64> {
        &self.eigenvectors
    }

    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Component of `parameter` in eigenvector `k`.
    pub fn component(&self, parameter: &str, k: usize) -> Option<f64> {
        let i = position(&self.parameters, parameter)?;
        self.eigenvectors.get([i, k]).copied()
    }
}

/// StatisticalMatrixEngine — covariance-family statistics of one run.
///
/// Purpose
/// -------
/// Hold a borrowed Jacobian plus the cached weight vector and objective
/// function so that covariance, correlation and eigen-decomposition can be
/// recomputed on demand without re-reading any file.
///
/// Invariants
/// ----------
/// - `weights.len() == jacobian.n_obs()`, aligned to Jacobian rows.
/// - `nonzero` counts the strictly non-zero weights.
#[derive(Debug, Clone)]
pub struct StatisticalMatrixEngine<'a> {
    jacobian: &'a JacobianMatrix,
    weights: Array1<f64>,
    phi: f64,
    nonzero: usize,
}

impl<'a> StatisticalMatrixEngine<'a> {
    /// Build an engine from a Jacobian and the residuals of the same run.
    ///
    /// Errors
    /// ------
    /// - `PestError::UnknownObservation` when a Jacobian row has no residual
    ///   record.
    pub fn new(jacobian: &'a JacobianMatrix, residuals: &ResidualsTable) -> PestResult<Self> {
        let weights = residuals.weights_for(jacobian.observations())?;
        if residuals.groups().into_iter().any(is_regularisation_group) {
            log::warn!(
                "residuals include regularisation groups; covariance reflects the regularised objective function"
            );
        }
        Self::from_parts(jacobian, weights, residuals.phi())
    }

    /// Build an engine from an explicit weight vector and objective value.
    ///
    /// Errors
    /// ------
    /// - `PestError::DimensionMismatch` when `weights` does not match the
    ///   Jacobian row count.
    pub fn from_parts(jacobian: &'a JacobianMatrix, weights: Array1<f64>, phi: f64) -> PestResult<Self> {
        if weights.len() != jacobian.n_obs() {
            return Err(PestError::DimensionMismatch {
                operation: "observation weights",
                expected: jacobian.n_obs(),
                found: weights.len(),
            });
        }
        let nonzero = weights.iter().filter(|&&w| w != 0.0).count();
        Ok(StatisticalMatrixEngine { jacobian, weights, phi, nonzero })
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// Number of non-zero weights.
    pub fn nonzero_weights(&self) -> usize {
        self.nonzero
    }

    /// Degrees of freedom, `nnz(w) − n_par`, when positive.
    pub fn degrees_of_freedom(&self) -> Option<usize> {
        self.nonzero.checked_sub(self.jacobian.n_par()).filter(|&d| d > 0)
    }

    /// covariance — posterior parameter covariance matrix.
    ///
    /// Errors
    /// ------
    /// - `PestError::NonPositiveDof` when `nnz(w) <= n_par`.
    /// - `PestError::SingularMatrix` when `Jᵀ·diag(w²)·J` cannot be inverted.
    /// - `PestError::NonFiniteResult` when the inverse holds NaN/∞.
    pub fn covariance(&self) -> PestResult<CovarianceMatrix> {
        const OP: &str = "covariance";
        let n_par = self.jacobian.n_par();
        let dof = self.degrees_of_freedom().ok_or(PestError::NonPositiveDof {
            nonzero_weights: self.nonzero,
            n_par,
        })?;

        // Jᵀ·diag(w²)·J == (diag(w)·J)ᵀ · (diag(w)·J)
        let wj = weighted_rows(self.jacobian.values(), &self.weights);
        let normal = wj.t().dot(&wj);
        ensure_finite(&normal, OP)?;

        let inverse = to_dmatrix(normal.view())
            .try_inverse()
            .ok_or(PestError::SingularMatrix { operation: OP, rows: n_par, cols: n_par })?;
        let inverse = to_array2(&inverse);
        let scale = self.phi / dof as f64;
        let values = (&inverse + &inverse.t()) * (0.5 * scale);
        ensure_finite(&values, OP)?;

        log::debug!("covariance: n_par={n_par} dof={dof} phi={}", self.phi);
        Ok(CovarianceMatrix { values, parameters: self.jacobian.parameters().to_vec() })
    }

    /// Correlation matrix derived from [`Self::covariance`].
    pub fn correlation(&self) -> PestResult<CorrelationMatrix> {
        self.covariance()?.correlation()
    }

    /// Eigen-decomposition derived from [`Self::covariance`].
    pub fn eigen(&self) -> PestResult<EigenDecomposition> {
        self.covariance()?.eigen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use approx::assert_relative_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Covariance for a hand-computed two-parameter Jacobian.
    // - Correlation: unit diagonal, symmetry, non-positive variance.
    // - Eigen-decomposition: ascending order, A v = λ v, upper-triangle read.
    // - Degenerate input: non-positive dof, singular normal matrix, weight
    //   length mismatch.
    //
    // They intentionally DO NOT cover:
    // - File parsing (see `io`), which the integration tests exercise.
    // -------------------------------------------------------------------------

    const TOL: f64 = 1e-10;

    fn jco(values: Array2<f64>) -> JacobianMatrix {
        let pars = (0..values.ncols()).map(|i| format!("p{i}")).collect();
        let obs = (0..values.nrows()).map(|i| format!("o{i}")).collect();
        JacobianMatrix::new(values, pars, obs).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Verify the covariance formula against a hand computation.
    //
    // Given
    // -----
    // - J = [[1,0],[0,1],[1,1]], w = [1,1,2], phi = 6.
    // - JᵀW²J = [[5,4],[4,5]], inverse = [[5,-4],[-4,5]]/9, dof = 1.
    //
    // Expect
    // ------
    // - cov = 6 · inverse, standard deviations sqrt(10/3).
    fn covariance_matches_hand_computation() {
        // Arrange
        let j = jco(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let eng = StatisticalMatrixEngine::from_parts(&j, array![1.0, 1.0, 2.0], 6.0).unwrap();

        // Act
        let cov = eng.covariance().unwrap();

        // Assert
        let expected = array![[5.0, -4.0], [-4.0, 5.0]] * (6.0 / 9.0);
        for (a, b) in cov.values().iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = TOL);
        }
        assert_eq!(cov.values()[[0, 1]], cov.values()[[1, 0]]);
        assert_relative_eq!(cov.variance("P1").unwrap(), 10.0 / 3.0, epsilon = TOL);
        for sd in cov.standard_deviations() {
            assert_relative_eq!(sd, (10.0f64 / 3.0).sqrt(), epsilon = TOL);
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure the correlation diagonal is 1 and off-diagonals are normalised.
    //
    // Given
    // -----
    // - The covariance from the hand-computed case.
    //
    // Expect
    // ------
    // - diag == 1 within 1e-9 and r01 = -4/5.
    fn correlation_has_unit_diagonal() {
        let j = jco(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let eng = StatisticalMatrixEngine::from_parts(&j, array![1.0, 1.0, 2.0], 6.0).unwrap();

        let cor = eng.correlation().unwrap();

        for i in 0..2 {
            assert_relative_eq!(cor.values()[[i, i]], 1.0, epsilon = 1e-9);
        }
        assert_relative_eq!(cor.get("p0", "p1").unwrap(), -0.8, epsilon = TOL);
        let pairs = cor.strong_pairs(0.5);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].0, pairs[0].1), ("p0", "p1"));
    }

    #[test]
    fn correlation_rejects_non_positive_variance() {
        let cov = CovarianceMatrix {
            values: array![[1.0, 0.0], [0.0, 0.0]],
            parameters: vec!["a".into(), "b".into()],
        };

        let err = cov.correlation().unwrap_err();

        assert_eq!(err, PestError::NonPositiveVariance { parameter: "b".into(), value: 0.0 });
    }

    #[test]
    // Purpose
    // -------
    // Verify ascending eigenvalues, eigen-pair consistency and that only the
    // upper triangle is read.
    //
    // Given
    // -----
    // - cov = [[2, 1], [X, 2]] where X is garbage in the lower triangle.
    //
    // Expect
    // ------
    // - eigenvalues [1, 3] and A v = λ v for the symmetric upper-derived A.
    fn eigen_is_ascending_and_reads_upper_triangle() {
        let cov = CovarianceMatrix {
            values: array![[2.0, 1.0], [-50.0, 2.0]],
            parameters: vec!["a".into(), "b".into()],
        };

        let eig = cov.eigen().unwrap();

        assert_relative_eq!(eig.eigenvalues()[0], 1.0, epsilon = TOL);
        assert_relative_eq!(eig.eigenvalues()[1], 3.0, epsilon = TOL);
        let a = array![[2.0, 1.0], [1.0, 2.0]];
        for k in 0..2 {
            let v = eig.eigenvectors().column(k).to_owned();
            let av = a.dot(&v);
            for i in 0..2 {
                assert_relative_eq!(av[i], eig.eigenvalues()[k] * v[i], epsilon = 1e-9);
            }
        }
        assert_relative_eq!(eig.component("b", 1).unwrap().abs(), 0.5f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    // Purpose
    // -------
    // Ensure degenerate inputs are reported rather than producing numbers.
    //
    // Given
    // -----
    // - Two non-zero weights for two parameters (dof = 0).
    // - A Jacobian with an all-zero column (singular normal matrix).
    //
    // Expect
    // ------
    // - `NonPositiveDof` and `SingularMatrix`, both degenerate-input errors.
    fn degenerate_inputs_are_rejected() {
        let j = jco(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
        let eng = StatisticalMatrixEngine::from_parts(&j, array![1.0, 0.0, 1.0], 1.0).unwrap();
        let err = eng.covariance().unwrap_err();
        assert_eq!(err, PestError::NonPositiveDof { nonzero_weights: 2, n_par: 2 });
        assert_eq!(err.kind(), ErrorKind::DegenerateInput);

        let j = jco(array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);
        let eng = StatisticalMatrixEngine::from_parts(&j, array![1.0, 1.0, 1.0], 1.0).unwrap();
        assert_eq!(
            eng.covariance().unwrap_err(),
            PestError::SingularMatrix { operation: "covariance", rows: 2, cols: 2 }
        );
    }

    #[test]
    fn from_parts_checks_weight_length() {
        let j = jco(array![[1.0], [2.0]]);

        let err = StatisticalMatrixEngine::from_parts(&j, array![1.0], 1.0).unwrap_err();

        assert!(matches!(err, PestError::DimensionMismatch { expected: 2, found: 1, .. }));
    }
}
