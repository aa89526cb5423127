//! Cell cross-probability and outcome entropy.
//!
//! Every corner of a cell is either below the isovalue or above it, so a
//! cell with `k` corners has `2^k` sign assignments ("outcome classes").
//! Bit `j` of an outcome index is set when corner `j` is below. The level
//! set passes through the cell for every outcome except all-below
//! (`2^k − 1`) and all-above (`0`).
//!
//! Two estimators produce a [`CellResult`] per cell:
//!
//! - **Independent** ([`independent_cell`]): corners are independent with
//!   known below-probabilities `p_j`; every outcome's probability is the
//!   exact product of `p_j` / `1 − p_j` factors.
//! - **Multivariate** ([`multivariate_cell`]): corner values are jointly
//!   normal with mean and covariance fitted to the raw samples (joint
//!   observation `i` is sample `i` of every corner). Outcome frequencies
//!   come from Monte Carlo draws of the fitted distribution.
//!
//! Entropy is measured in bits over the outcome distribution.

use rand::Rng;

use crate::config::{Backend, IsoConfig};
use crate::corner::{CornerModel, SummaryField};
use crate::error::{Error, Result};
use crate::grid::{CellTopology, MAX_CORNERS};
use crate::random::{element_rng, fill_standard_normal};
use crate::stats::{CholeskyFactor, Factorization, mean_and_covariance};

/// Number of outcome classes of a hexahedron.
const MAX_OUTCOMES: usize = 1 << MAX_CORNERS;

/// Uncertainty summary of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellResult {
    /// Probability that the level set passes through the cell.
    pub cross_probability: f64,
    /// Outcome classes whose probability exceeds the outcome epsilon.
    pub num_nonzero_outcomes: u32,
    /// Shannon entropy (bits) of the outcome distribution.
    pub entropy: f64,
}

impl CellResult {
    /// Result for a cell that cannot be evaluated.
    pub const EMPTY: CellResult = CellResult {
        cross_probability: 0.0,
        num_nonzero_outcomes: 0,
        entropy: 0.0,
    };
}

/// Per-cell output arrays, indexed by cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellResults {
    pub cross_probability: Vec<f64>,
    pub num_nonzero_prob: Vec<u32>,
    pub entropy: Vec<f64>,
}

impl CellResults {
    pub fn len(&self) -> usize {
        self.cross_probability.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cross_probability.is_empty()
    }

    /// Result of `cell`.
    pub fn get(&self, cell: usize) -> Option<CellResult> {
        Some(CellResult {
            cross_probability: *self.cross_probability.get(cell)?,
            num_nonzero_outcomes: *self.num_nonzero_prob.get(cell)?,
            entropy: *self.entropy.get(cell)?,
        })
    }
}

impl FromIterator<CellResult> for CellResults {
    fn from_iter<I: IntoIterator<Item = CellResult>>(iter: I) -> Self {
        let mut out = CellResults::default();
        for r in iter {
            out.cross_probability.push(r.cross_probability);
            out.num_nonzero_prob.push(r.num_nonzero_outcomes);
            out.entropy.push(r.entropy);
        }
        out
    }
}

/// Whether an outcome index describes a crossing for `k` corners.
#[inline]
pub fn is_crossing(outcome: usize, k: usize) -> bool {
    let all_below = u32::try_from(k)
        .ok()
        .and_then(|k| 1usize.checked_shl(k))
        .map_or(usize::MAX, |n| n - 1);
    outcome != 0 && outcome != all_below
}

/// Probability of one sign assignment for independent corners.
///
/// `probs[j]` is the probability corner `j` is below the isovalue.
pub fn outcome_probability(probs: &[f64], outcome: usize) -> f64 {
    probs
        .iter()
        .enumerate()
        .map(|(j, &p)| if (outcome >> j) & 1 == 1 { p } else { 1.0 - p })
        .product()
}

/// Folds an outcome distribution into a [`CellResult`].
///
/// `probability(o)` must give the probability of outcome `o` for
/// `o in 0..2^k`.
fn summarize<F: Fn(usize) -> f64>(k: usize, outcome_epsilon: f64, probability: F) -> CellResult {
    let mut cross_probability = 0.0;
    let mut num_nonzero_outcomes = 0;
    let mut entropy = 0.0;
    for outcome in 0..1usize << k {
        let p = probability(outcome);
        if is_crossing(outcome, k) {
            cross_probability += p;
        }
        if p > outcome_epsilon {
            num_nonzero_outcomes += 1;
        }
        if p > 0.0 {
            entropy -= p * p.log2();
        }
    }
    CellResult {
        cross_probability: cross_probability.clamp(0.0, 1.0),
        num_nonzero_outcomes,
        entropy: entropy.max(0.0),
    }
}

// ============================================================================
// Independent corners
// ============================================================================

/// Exact cell result for independent corners.
///
/// Enumerates all `2^k` sign assignments of the `k = probs.len()` corners.
/// More than 8 corners is not a cell; the all-zero result is returned.
///
/// # Examples
/// ```
/// use u_uncertain::cross::independent_cell;
/// let r = independent_cell(&[0.5; 4], 1e-4);
/// assert!((r.cross_probability - 0.875).abs() < 1e-12);
/// assert_eq!(r.num_nonzero_outcomes, 16);
/// assert!((r.entropy - 4.0).abs() < 1e-12);
/// ```
pub fn independent_cell(probs: &[f64], outcome_epsilon: f64) -> CellResult {
    if probs.len() > MAX_CORNERS {
        return CellResult::EMPTY;
    }
    summarize(probs.len(), outcome_epsilon, |o| outcome_probability(probs, o))
}

/// Applies [`independent_cell`] to every cell of `topology`.
///
/// `corner_probs[p]` is the below-probability of point `p`.
///
/// # Errors
/// Returns [`Error::InvalidInput`] if `corner_probs` does not cover every
/// point of the topology, or cells have more than 8 corners.
pub fn estimate_independent<T: CellTopology>(
    topology: &T,
    corner_probs: &[f64],
    outcome_epsilon: f64,
    backend: Backend,
) -> Result<CellResults> {
    check_topology(topology, corner_probs.len())?;
    let results = backend.map(topology.num_cells(), |cell| {
        let corners = topology.cell_corners(cell);
        let mut probs = [0.0; MAX_CORNERS];
        for (slot, &p) in probs.iter_mut().zip(corners.as_slice()) {
            *slot = corner_probs[p];
        }
        independent_cell(&probs[..corners.len()], outcome_epsilon)
    });
    Ok(results.into_iter().collect())
}

// ============================================================================
// Multivariate corners
// ============================================================================

/// Parameters of the multivariate Monte Carlo estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultivariateParams {
    pub isovalue: f64,
    pub samples: usize,
    pub regularization: f64,
    pub outcome_epsilon: f64,
}

impl From<&IsoConfig> for MultivariateParams {
    fn from(config: &IsoConfig) -> Self {
        Self {
            isovalue: config.isovalue,
            samples: config.mc_samples,
            regularization: config.regularization,
            outcome_epsilon: config.outcome_epsilon,
        }
    }
}

/// Monte Carlo cell result for jointly distributed corners.
///
/// `corner_raws[j]` holds the raw samples of corner `j`; all corners must
/// have the same sample count. Returns the all-zero result when the cell
/// has no corners, mismatched sample counts, or `params.samples == 0`.
pub fn multivariate_cell<R: Rng>(
    corner_raws: &[&[f64]],
    params: &MultivariateParams,
    rng: &mut R,
) -> CellResult {
    multivariate_cell_with_factor(corner_raws, params, rng).0
}

fn multivariate_cell_with_factor<R: Rng>(
    corner_raws: &[&[f64]],
    params: &MultivariateParams,
    rng: &mut R,
) -> (CellResult, Factorization) {
    let k = corner_raws.len();
    let empty = CellResult::EMPTY;
    if k == 0 || k > MAX_CORNERS || params.samples == 0 {
        return (empty, Factorization::Exact);
    }
    let Some((mean, cov)) = mean_and_covariance(corner_raws) else {
        return (empty, Factorization::Exact);
    };
    let factor = CholeskyFactor::regularized(&cov, k, params.regularization);

    let mut counts = [0u32; MAX_OUTCOMES];
    let mut z = [0.0; MAX_CORNERS];
    let mut x = [0.0; MAX_CORNERS];
    for _ in 0..params.samples {
        fill_standard_normal(&mut z[..k], rng);
        factor.transform(&mean, &z[..k], &mut x[..k]);
        let outcome = x[..k]
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v <= params.isovalue)
            .fold(0usize, |acc, (j, _)| acc | (1 << j));
        counts[outcome] += 1;
    }

    let total = params.samples as f64;
    let result = summarize(k, params.outcome_epsilon, |o| counts[o] as f64 / total);
    (result, factor.kind)
}

/// Applies [`multivariate_cell`] to every cell of `topology`.
///
/// Cell `c` samples from its own generator derived from `(seed, c)`, so
/// results do not depend on the backend or scheduling order.
///
/// # Errors
/// Returns [`Error::InvalidInput`] if `field` is not a mean/raw summary
/// covering every point of the topology.
pub fn estimate_multivariate<T: CellTopology>(
    topology: &T,
    field: &SummaryField,
    params: &MultivariateParams,
    seed: u64,
    backend: Backend,
) -> Result<CellResults> {
    if field.model() != CornerModel::Multivariate {
        return Err(Error::InvalidInput(format!(
            "multivariate estimation needs raw samples, got a {} summary",
            field.model()
        )));
    }
    check_topology(topology, field.len())?;

    let results = backend.map(topology.num_cells(), |cell| {
        let corners = topology.cell_corners(cell);
        let mut raws: [&[f64]; MAX_CORNERS] = [&[]; MAX_CORNERS];
        for (slot, &p) in raws.iter_mut().zip(corners.as_slice()) {
            *slot = field.raw(p).unwrap_or(&[]);
        }
        let mut rng = element_rng(seed, cell as u64);
        multivariate_cell_with_factor(&raws[..corners.len()], params, &mut rng)
    });

    let regularized = results
        .iter()
        .filter(|(_, kind)| *kind != Factorization::Exact)
        .count();
    if regularized > 0 {
        log::warn!(
            "{regularized} of {} cells needed covariance regularization",
            results.len()
        );
    }
    Ok(results.into_iter().map(|(r, _)| r).collect())
}

/// Runs the estimator matching the summary's model.
///
/// # Errors
/// Propagates validation errors of the chosen estimator.
pub fn estimate_cells<T: CellTopology>(
    topology: &T,
    field: &SummaryField,
    config: &IsoConfig,
    seed: u64,
) -> Result<CellResults> {
    match field.model() {
        CornerModel::Uniform | CornerModel::IndependentGaussian => {
            let probs = field.corner_probabilities(config.isovalue, config.backend)?;
            estimate_independent(topology, &probs, config.outcome_epsilon, config.backend)
        }
        CornerModel::Multivariate => estimate_multivariate(
            topology,
            field,
            &MultivariateParams::from(config),
            seed,
            config.backend,
        ),
    }
}

fn check_topology<T: CellTopology>(topology: &T, num_points: usize) -> Result<()> {
    if topology.corners_per_cell() > MAX_CORNERS {
        return Err(Error::InvalidInput(format!(
            "cells with {} corners are not supported",
            topology.corners_per_cell()
        )));
    }
    if topology.num_points() != num_points {
        return Err(Error::InvalidInput(format!(
            "topology has {} points but {num_points} statistics were supplied",
            topology.num_points()
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn crossing_plus_uniform_signs_is_one(
            probs in proptest::collection::vec(0.0_f64..=1.0, 4..=8),
        ) {
            let k = probs.len();
            let r = independent_cell(&probs, 1e-4);
            let all_above = outcome_probability(&probs, 0);
            let all_below = outcome_probability(&probs, (1 << k) - 1);
            prop_assert!((r.cross_probability + all_above + all_below - 1.0).abs() < 1e-9);
        }

        #[test]
        fn entropy_bounded_by_corner_count(
            probs in proptest::collection::vec(0.0_f64..=1.0, 4..=8),
        ) {
            let r = independent_cell(&probs, 1e-4);
            prop_assert!(r.entropy >= 0.0);
            prop_assert!(r.entropy <= probs.len() as f64 + 1e-9);
            prop_assert!((r.num_nonzero_outcomes as usize) <= 1 << probs.len());
        }
    }
}
