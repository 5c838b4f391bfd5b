//! sensitivity::filter — observation weight sources and filter policies.
//!
//! Purpose
//! -------
//! Produce the effective weight vector used by sensitivity and
//! identifiability analysis: raw weights come from a [`WeightSource`] and are
//! masked by a [`FilterPolicy`].
//!
//! Key behaviors
//! -------------
//! - Stages run in a fixed order: drop regularisation, drop groups, keep
//!   groups, keep observations, remove observations.
//! - Every stage can only set a weight to zero; none restores a weight, so
//!   the effective weight of each observation never exceeds its raw weight.
//! - A keep set, when provided, zeroes every observation outside it, so keep
//!   sets intersect with the other stages rather than overriding them.
//!
//! Conventions
//! -----------
//! - All names in a policy are lowercased on insertion.
//! - Regularisation observations are those whose group name contains
//!   `regul`.
use std::collections::BTreeSet;

use ndarray::Array1;

use crate::errors::{PestError, PestResult};
use crate::io::control::is_regularisation_group;
use crate::io::{ControlFile, JacobianMatrix, ResidualsTable};

/// WeightSource — where raw observation weights and groups come from.
pub trait WeightSource {
    /// `(weight, group)` of observation `name`, or `None` if unknown.
    fn observation(&self, name: &str) -> Option<(f64, &str)>;
}

impl WeightSource for ResidualsTable {
    fn observation(&self, name: &str) -> Option<(f64, &str)> {
        self.get(name).map(|r| (r.weight, r.group.as_str()))
    }
}

/// Observation data first, then prior information.
impl WeightSource for ControlFile {
    fn observation(&self, name: &str) -> Option<(f64, &str)> {
        if let Some(o) = self.obsdata.get(name) {
            return Some((o.weight, o.group.as_str()));
        }
        self.prior.get(name).map(|p| (p.weight, p.group.as_str()))
    }
}

fn lowered<I, S>(items: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|s| s.as_ref().to_lowercase()).collect()
}

/// FilterPolicy — which observations contribute to sensitivity.
///
/// Fields
/// ------
/// - `drop_regularisation`: zero every observation in a `regul*` group.
/// - `drop_groups`: zero every observation in these groups.
/// - `keep_groups`: when `Some`, zero every observation outside these groups.
/// - `keep_observations`: when `Some`, zero every observation not listed.
/// - `remove_observations`: zero the listed observations.
///
/// `None` keep sets mean "not provided"; `Some` of an empty set keeps nothing.
///
/// Examples
/// --------
/// ```rust
/// use pest_diagnostics::sensitivity::FilterPolicy;
///
/// let policy = FilterPolicy::new()
///     .with_drop_regularisation(true)
///     .with_keep_groups(["Heads", "flux"]);
/// assert!(policy.keep_groups().unwrap().contains("heads"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    drop_regularisation: bool,
    drop_groups: BTreeSet<String>,
    keep_groups: Option<BTreeSet<String>>,
    keep_observations: Option<BTreeSet<String>>,
    remove_observations: BTreeSet<String>,
}

impl FilterPolicy {
    /// A policy that keeps every weight unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drop_regularisation(mut self, drop: bool) -> Self {
        self.drop_regularisation = drop;
        self
    }

    pub fn with_drop_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.drop_groups = lowered(groups);
        self
    }

    pub fn with_keep_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keep_groups = Some(lowered(groups));
        self
    }

    pub fn with_keep_observations<I, S>(mut self, observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keep_observations = Some(lowered(observations));
        self
    }

    pub fn with_remove_observations<I, S>(mut self, observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.remove_observations = lowered(observations);
        self
    }

    pub fn drop_regularisation(&self) -> bool {
        self.drop_regularisation
    }

    pub fn drop_groups(&self) -> &BTreeSet<String> {
        &self.drop_groups
    }

    pub fn keep_groups(&self) -> Option<&BTreeSet<String>> {
        self.keep_groups.as_ref()
    }

    pub fn keep_observations(&self) -> Option<&BTreeSet<String>> {
        self.keep_observations.as_ref()
    }

    pub fn remove_observations(&self) -> &BTreeSet<String> {
        &self.remove_observations
    }

    /// Effective weight of one observation after all stages.
    pub fn mask(&self, observation: &str, group: &str, weight: f64) -> f64 {
        let observation = observation.to_lowercase();
        let group = group.to_lowercase();
        let mut w = weight;
        if self.drop_regularisation && is_regularisation_group(&group) {
            w = 0.0;
        }
        if self.drop_groups.contains(&group) {
            w = 0.0;
        }
        if self.keep_groups.as_ref().is_some_and(|keep| !keep.contains(&group)) {
            w = 0.0;
        }
        if self.keep_observations.as_ref().is_some_and(|keep| !keep.contains(&observation)) {
            w = 0.0;
        }
        if self.remove_observations.contains(&observation) {
            w = 0.0;
        }
        w
    }

    /// effective_weights — masked weights aligned to the Jacobian rows.
    ///
    /// Errors
    /// ------
    /// - `PestError::UnknownObservation` when a Jacobian row is missing from
    ///   `source`.
    pub fn effective_weights<W: WeightSource + ?Sized>(
        &self, jacobian: &JacobianMatrix, source: &W,
    ) -> PestResult<EffectiveWeights> {
        let n = jacobian.n_obs();
        let mut groups = Vec::with_capacity(n);
        let mut weights = Array1::<f64>::zeros(n);
        for (i, name) in jacobian.observations().iter().enumerate() {
            let (raw, group) = source
                .observation(name)
                .ok_or_else(|| PestError::UnknownObservation { name: name.clone() })?;
            weights[i] = self.mask(name, group, raw);
            groups.push(group.to_lowercase());
        }
        let eff = EffectiveWeights { observations: jacobian.observations().to_vec(), groups, weights };
        log::debug!("effective weights: {} of {} non-zero", eff.nonzero(), n);
        Ok(eff)
    }
}

/// EffectiveWeights — filtered weights aligned to Jacobian rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveWeights {
    observations: Vec<String>,
    groups: Vec<String>,
    weights: Array1<f64>,
}

impl EffectiveWeights {
    pub fn observations(&self) -> &[String] {
        &self.observations
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Effective weight of one observation.
    pub fn get(&self, observation: &str) -> Option<f64> {
        let name = observation.to_lowercase();
        self.observations.iter().position(|o| *o == name).map(|i| self.weights[i])
    }

    /// Number of non-zero effective weights.
    pub fn nonzero(&self) -> usize {
        self.weights.iter().filter(|&&w| w != 0.0).count()
    }
}
