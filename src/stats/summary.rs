//! stats::summary — descriptive statistics of residuals by observation group.
//!
//! Purpose
//! -------
//! Summarise the residuals of selected observation groups: counts, spread,
//! quantiles and error magnitudes (MAE, RMSE). Regularisation groups are
//! always excluded; zero-weighted observations are excluded by default.
//!
//! Conventions
//! -----------
//! - Statistics are over the unweighted `residual` column.
//! - Quantiles interpolate linearly between neighbouring order statistics
//!   at position `(n − 1)·τ`.
//! - Variance and standard deviation are sample (`n − 1`) or population
//!   (`n`) according to [`SummaryOptions::variance`].
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::io::ResidualsTable;
use crate::io::control::is_regularisation_group;

/// Divisor used for variance and standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VarianceKind {
    /// `n − 1`
    #[default]
    Sample,
    /// `n`
    Population,
}

/// SummaryOptions — record selection and variance convention.
///
/// Fields
/// ------
/// - `exclude_zero_weight`: drop observations whose weight is not strictly
///   positive. Default `true`.
/// - `variance`: [`VarianceKind`]. Default `Sample`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryOptions {
    pub exclude_zero_weight: bool,
    pub variance: VarianceKind,
}

impl SummaryOptions {
    pub fn new(exclude_zero_weight: bool, variance: VarianceKind) -> Self {
        SummaryOptions { exclude_zero_weight, variance }
    }
}

impl Default for SummaryOptions {
    fn default() -> Self {
        SummaryOptions { exclude_zero_weight: true, variance: VarianceKind::Sample }
    }
}

/// Descriptive statistics of a set of residuals.
///
/// Sample variance of a single residual is NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualSummary {
    pub n: usize,
    pub range: f64,
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub variance: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max_abs: f64,
    pub min_abs: f64,
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// `rmse / range`; infinite when all residuals are equal.
    pub rmse_over_range: f64,
}

impl ResidualSummary {
    /// Summarise `residuals`; `None` when the slice is empty.
    pub fn from_residuals(residuals: &[f64], variance: VarianceKind) -> Option<Self> {
        if residuals.is_empty() {
            return None;
        }
        let max = Statistics::max(residuals);
        let min = Statistics::min(residuals);
        let var = match variance {
            VarianceKind::Sample => Statistics::variance(residuals),
            VarianceKind::Population => Statistics::population_variance(residuals),
        };
        let n = residuals.len();
        let mut data = Data::new(residuals.to_vec());
        let abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
        let rmse = Statistics::quadratic_mean(residuals);
        let range = max - min;

        Some(ResidualSummary {
            n,
            range,
            max,
            min,
            mean: Statistics::mean(residuals),
            std_dev: var.sqrt(),
            variance: var,
            q25: linear_quantile(&mut data, n, 0.25),
            median: linear_quantile(&mut data, n, 0.5),
            q75: linear_quantile(&mut data, n, 0.75),
            max_abs: Statistics::max(&abs),
            min_abs: Statistics::min(&abs),
            mae: Statistics::mean(&abs),
            rmse,
            rmse_over_range: rmse / range,
        })
    }
}

/// Quantile `tau` of `n > 0` values, interpolating linearly between the
/// order statistics around position `(n − 1)·tau`.
fn linear_quantile(data: &mut Data<Vec<f64>>, n: usize, tau: f64) -> f64 {
    let h = (n - 1) as f64 * tau;
    let lo = h.floor();
    let below = data.order_statistic(lo as usize + 1);
    let above = data.order_statistic(h.ceil() as usize + 1);
    below + (h - lo) * (above - below)
}

impl ResidualsTable {
    /// describe_groups — summary of the residuals in `groups`.
    ///
    /// Regularisation groups are skipped even when listed. Returns `None`
    /// when no residual survives the selection.
    pub fn describe_groups(&self, groups: &[&str], options: &SummaryOptions) -> Option<ResidualSummary> {
        let wanted: Vec<String> = groups.iter().map(|g| g.to_lowercase()).collect();
        let residuals: Vec<f64> = self
            .records()
            .filter(|r| wanted.contains(&r.group))
            .filter(|r| !is_regularisation_group(&r.group))
            .filter(|r| !options.exclude_zero_weight || r.weight > 0.0)
            .map(|r| r.residual)
            .collect();
        ResidualSummary::from_residuals(&residuals, options.variance)
    }

    /// Summary for each non-regularisation group with at least one selected
    /// residual, in order of first appearance.
    pub fn describe_all_groups(&self, options: &SummaryOptions) -> Vec<(String, ResidualSummary)> {
        self.groups()
            .into_iter()
            .filter(|g| !is_regularisation_group(g))
            .filter_map(|g| self.describe_groups(&[g], options).map(|s| (g.to_string(), s)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::residuals::{parse_str, tests::MINIMAL_RES};
    use approx::assert_relative_eq;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Basic statistics for a hand-checked residual vector.
    // - Group selection: regularisation always dropped, zero weights
    //   optionally dropped.
    // - Linear-interpolation quartiles for even and odd sample sizes.
    // -------------------------------------------------------------------------

    const TOL: f64 = 1e-12;

    #[test]
    // Purpose
    // -------
    // Verify the statistics of a simple residual vector.
    //
    // Given
    // -----
    // - residuals [-2, 1, 4].
    //
    // Expect
    // ------
    // - mean 1, sample variance 9, range 6, MAE 7/3, RMSE sqrt(7).
    fn from_residuals_matches_hand_values() {
        let s = ResidualSummary::from_residuals(&[-2.0, 1.0, 4.0], VarianceKind::Sample).unwrap();

        assert_eq!(s.n, 3);
        assert_relative_eq!(s.mean, 1.0, epsilon = TOL);
        assert_relative_eq!(s.variance, 9.0, epsilon = TOL);
        assert_relative_eq!(s.std_dev, 3.0, epsilon = TOL);
        assert_eq!((s.max, s.min, s.range), (4.0, -2.0, 6.0));
        assert_relative_eq!(s.median, 1.0, epsilon = TOL);
        assert_eq!((s.max_abs, s.min_abs), (4.0, 1.0));
        assert_relative_eq!(s.mae, 7.0 / 3.0, epsilon = TOL);
        assert_relative_eq!(s.rmse, 7.0f64.sqrt(), epsilon = TOL);
        assert_relative_eq!(s.rmse_over_range, 7.0f64.sqrt() / 6.0, epsilon = TOL);

        let p = ResidualSummary::from_residuals(&[-2.0, 1.0, 4.0], VarianceKind::Population).unwrap();
        assert_relative_eq!(p.variance, 6.0, epsilon = TOL);
        assert!(ResidualSummary::from_residuals(&[], VarianceKind::Sample).is_none());
    }

    #[test]
    // Purpose
    // -------
    // Verify quartiles interpolate linearly between order statistics.
    //
    // Given
    // -----
    // - residuals [4, 1, 3, 2] (unsorted) and [10, 0, 5, 20, 15].
    //
    // Expect
    // ------
    // - [1, 2, 3, 4]: q25 = 1.75, median = 2.5, q75 = 3.25.
    // - [0, 5, 10, 15, 20]: q25 = 5, median = 10, q75 = 15.
    fn quartiles_interpolate_between_order_statistics() {
        // Act
        let even = ResidualSummary::from_residuals(&[4.0, 1.0, 3.0, 2.0], VarianceKind::Sample).unwrap();
        let odd =
            ResidualSummary::from_residuals(&[10.0, 0.0, 5.0, 20.0, 15.0], VarianceKind::Sample).unwrap();
        let single = ResidualSummary::from_residuals(&[0.7], VarianceKind::Sample).unwrap();

        // Assert
        assert_relative_eq!(even.q25, 1.75, epsilon = TOL);
        assert_relative_eq!(even.median, 2.5, epsilon = TOL);
        assert_relative_eq!(even.q75, 3.25, epsilon = TOL);
        assert_relative_eq!(odd.q25, 5.0, epsilon = TOL);
        assert_relative_eq!(odd.median, 10.0, epsilon = TOL);
        assert_relative_eq!(odd.q75, 15.0, epsilon = TOL);
        assert_eq!((single.q25, single.median, single.q75), (0.7, 0.7, 0.7));
    }

    #[test]
    // Purpose
    // -------
    // Ensure selection drops zero weights by default and regularisation
    // groups always.
    //
    // Given
    // -----
    // - `MINIMAL_RES`: heads residuals 0.5, -0.5, 1.0 (the last zero-weighted).
    //
    // Expect
    // ------
    // - Default: n = 2 for heads; with zero weights kept: n = 3.
    // - A regularisation group alone yields `None`.
    fn describe_groups_applies_selection_rules() {
        let res = parse_str(MINIMAL_RES).unwrap();

        let default = res.describe_groups(&["HEADS"], &SummaryOptions::default()).unwrap();
        assert_eq!(default.n, 2);
        assert_relative_eq!(default.mean, 0.0, epsilon = TOL);

        let keep_zero = SummaryOptions::new(false, VarianceKind::Sample);
        assert_eq!(res.describe_groups(&["heads"], &keep_zero).unwrap().n, 3);

        assert!(res.describe_groups(&["regul_hk"], &keep_zero).is_none());

        let all = res.describe_all_groups(&SummaryOptions::default());
        let names: Vec<&str> = all.iter().map(|(g, _)| g.as_str()).collect();
        assert_eq!(names, vec!["heads", "flux"]);
    }
}
