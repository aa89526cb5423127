//! Multi-variable fiber probability.
//!
//! Each point carries `D` co-located uncertain scalars, each described by a
//! `[min, max]` interval. Together they form an axis-aligned box in value
//! space over which the point's true value is taken to be uniformly
//! distributed. Given a target box, two probabilities are reported per
//! point:
//!
//! - **interior**: exact volume ratio `|point ∩ target| / |point|`;
//! - **Monte Carlo**: fraction of uniform draws from the point box that land
//!   strictly inside the target box.
//!
//! The evaluation [`FiberMode`] is chosen once per run and changes what
//! both outputs mean (see the variant docs).

use std::str::FromStr;

use rand::Rng;

use crate::config::FiberConfig;
use crate::error::{Error, Result};
use crate::random::{element_rng, uniform_in};
use crate::timing::Timed;

/// Samples per point in the default Monte Carlo mode.
pub const DEFAULT_FIBER_SAMPLES: usize = 100;

/// How each point is evaluated against the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberMode {
    /// Interior probability in closed form; Monte Carlo probability from
    /// `samples` uniform draws per point.
    MonteCarlo { samples: usize },
    /// Both outputs are the closed-form volume ratio.
    ClosedForm,
    /// Both outputs are 1 if the center of the point box lies strictly
    /// inside the target, else 0.
    Mean,
    /// Both outputs are 1 if the known true value lies strictly inside the
    /// target, else 0. Requires truth values on the field.
    Truth,
}

impl Default for FiberMode {
    fn default() -> Self {
        FiberMode::MonteCarlo {
            samples: DEFAULT_FIBER_SAMPLES,
        }
    }
}

impl FromStr for FiberMode {
    type Err = Error;

    /// Parses a mode name. `MonteCarlo` uses [`DEFAULT_FIBER_SAMPLES`].
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "montecarlo" | "monte-carlo" | "mc" => Ok(FiberMode::default()),
            "closedform" | "closed-form" => Ok(FiberMode::ClosedForm),
            "mean" => Ok(FiberMode::Mean),
            "truth" => Ok(FiberMode::Truth),
            other => Err(Error::UnsupportedModel(format!("unknown fiber mode '{other}'"))),
        }
    }
}

/// An axis-aligned box in `D`-dimensional value space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueBox<const D: usize> {
    pub min: [f64; D],
    pub max: [f64; D],
}

impl<const D: usize> ValueBox<D> {
    pub fn new(min: [f64; D], max: [f64; D]) -> Self {
        Self { min, max }
    }

    pub fn center(&self) -> [f64; D] {
        std::array::from_fn(|axis| 0.5 * (self.min[axis] + self.max[axis]))
    }

    /// Whether `value` lies strictly inside the box on every axis.
    #[inline]
    pub fn contains_strict(&self, value: &[f64; D]) -> bool {
        (0..D).all(|axis| self.min[axis] < value[axis] && value[axis] < self.max[axis])
    }

    /// Finite bounds with `min <= max` and a finite width on every axis.
    pub fn is_valid(&self) -> bool {
        (0..D).all(|axis| {
            let (lo, hi) = (self.min[axis], self.max[axis]);
            lo.is_finite() && hi.is_finite() && lo <= hi && (hi - lo).is_finite()
        })
    }
}

/// Converts mean/deviation pairs into `(mean − dev, mean + dev)` intervals.
///
/// # Errors
/// Returns [`Error::InvalidInput`] on length mismatch, a negative or
/// non-finite deviation, or a non-finite mean or bound.
///
/// # Examples
/// ```
/// use u_uncertain::fiber::min_max_from_mean_dev;
/// let (lo, hi) = min_max_from_mean_dev(&[1.0, 5.0], &[0.5, 0.0]).unwrap();
/// assert_eq!(lo, vec![0.5, 5.0]);
/// assert_eq!(hi, vec![1.5, 5.0]);
/// ```
pub fn min_max_from_mean_dev(mean: &[f64], dev: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    if mean.len() != dev.len() {
        return Err(Error::InvalidInput(format!(
            "mean has {} values but deviation has {}",
            mean.len(),
            dev.len()
        )));
    }
    if let Some(p) = dev.iter().position(|d| !(*d >= 0.0 && d.is_finite())) {
        return Err(Error::InvalidInput(format!(
            "point {p} has invalid deviation {}",
            dev[p]
        )));
    }
    let (lo, hi): (Vec<f64>, Vec<f64>) = mean
        .iter()
        .zip(dev)
        .map(|(&m, &d)| (m - d, m + d))
        .unzip();
    if let Some(p) = (0..lo.len()).find(|&p| !(hi[p] - lo[p]).is_finite()) {
        return Err(Error::InvalidInput(format!(
            "point {p} with mean {} and deviation {} has no finite interval",
            mean[p], dev[p]
        )));
    }
    Ok((lo, hi))
}

/// Per-point value boxes of `D` co-located fields, plus optional truth.
#[derive(Debug, Clone, PartialEq)]
pub struct FiberField<const D: usize> {
    boxes: Vec<ValueBox<D>>,
    truth: Option<Vec<[f64; D]>>,
}

impl<const D: usize> FiberField<D> {
    /// Builds a field from one `(min, max)` array pair per variable.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if the arrays differ in length or
    /// any interval is inverted, has a non-finite bound, or is wider than
    /// `f64::MAX`.
    pub fn from_min_max(min: [&[f64]; D], max: [&[f64]; D]) -> Result<Self> {
        let n = min.first().map_or(0, |m| m.len());
        for axis in 0..D {
            if min[axis].len() != n || max[axis].len() != n {
                return Err(Error::InvalidInput(format!(
                    "variable {axis} has {} min and {} max values, expected {n}",
                    min[axis].len(),
                    max[axis].len()
                )));
            }
        }
        let boxes: Vec<ValueBox<D>> = (0..n)
            .map(|p| {
                ValueBox::new(
                    std::array::from_fn(|axis| min[axis][p]),
                    std::array::from_fn(|axis| max[axis][p]),
                )
            })
            .collect();
        if let Some(p) = boxes.iter().position(|b| !b.is_valid()) {
            return Err(Error::InvalidInput(format!(
                "point {p} needs finite intervals with min <= max and a finite width, got {:?}",
                boxes[p]
            )));
        }
        Ok(Self { boxes, truth: None })
    }

    /// Attaches the known true value of every variable.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if any array length differs from the
    /// number of points.
    pub fn with_truth(mut self, truth: [&[f64]; D]) -> Result<Self> {
        let n = self.boxes.len();
        if let Some(axis) = truth.iter().position(|t| t.len() != n) {
            return Err(Error::InvalidInput(format!(
                "truth for variable {axis} has {} values, expected {n}",
                truth[axis].len()
            )));
        }
        self.truth = Some(
            (0..n)
                .map(|p| std::array::from_fn(|axis| truth[axis][p]))
                .collect(),
        );
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn boxes(&self) -> &[ValueBox<D>] {
        &self.boxes
    }

    pub fn truth(&self, point: usize) -> Option<&[f64; D]> {
        self.truth.as_ref()?.get(point)
    }
}

/// Exact probability that a uniform value in `point` lies inside `target`.
///
/// Product over axes of the overlap fraction. An axis where the point box
/// is degenerate is a point mass and contributes 1 if the value lies
/// strictly inside the target interval, 0 otherwise. An empty overlap on
/// any other axis gives exactly 0.
///
/// # Examples
/// ```
/// use u_uncertain::fiber::{ValueBox, interior_probability};
/// let point = ValueBox::new([0.0, 0.0, 0.0], [1.0, 1.0, 1.0]);
/// let target = ValueBox::new([0.5, 0.0, 0.0], [2.0, 1.0, 0.5]);
/// assert!((interior_probability(&point, &target) - 0.25).abs() < 1e-12);
/// ```
pub fn interior_probability<const D: usize>(point: &ValueBox<D>, target: &ValueBox<D>) -> f64 {
    let mut probability = 1.0;
    for axis in 0..D {
        let (lo, hi) = (point.min[axis], point.max[axis]);
        let (t_lo, t_hi) = (target.min[axis], target.max[axis]);
        if hi <= lo {
            if !(t_lo < lo && lo < t_hi) {
                return 0.0;
            }
            continue;
        }
        let i_lo = lo.max(t_lo);
        let i_hi = hi.min(t_hi);
        if i_lo >= i_hi {
            return 0.0;
        }
        probability *= (i_hi - i_lo) / (hi - lo);
    }
    probability
}

/// Fraction of `samples` uniform draws from `point` strictly inside
/// `target`. Zero samples give 0.
pub fn monte_carlo_probability<const D: usize, R: Rng>(
    point: &ValueBox<D>,
    target: &ValueBox<D>,
    samples: usize,
    rng: &mut R,
) -> f64 {
    if samples == 0 {
        return 0.0;
    }
    let mut inside = 0usize;
    for _ in 0..samples {
        let value: [f64; D] =
            std::array::from_fn(|axis| uniform_in(point.min[axis], point.max[axis], rng));
        if target.contains_strict(&value) {
            inside += 1;
        }
    }
    inside as f64 / samples as f64
}

/// Outputs for one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiberPoint {
    pub interior_probability: f64,
    pub monte_carlo_probability: f64,
}

impl FiberPoint {
    fn both(p: f64) -> Self {
        Self {
            interior_probability: p,
            monte_carlo_probability: p,
        }
    }
}

/// Evaluates one point under `mode`.
///
/// # Errors
/// Returns [`Error::InvalidInput`] in [`FiberMode::Truth`] when `truth` is
/// `None`.
pub fn evaluate_point<const D: usize, R: Rng>(
    point: &ValueBox<D>,
    truth: Option<&[f64; D]>,
    target: &ValueBox<D>,
    mode: FiberMode,
    rng: &mut R,
) -> Result<FiberPoint> {
    let indicator = |inside: bool| if inside { 1.0 } else { 0.0 };
    match mode {
        FiberMode::MonteCarlo { samples } => Ok(FiberPoint {
            interior_probability: interior_probability(point, target),
            monte_carlo_probability: monte_carlo_probability(point, target, samples, rng),
        }),
        FiberMode::ClosedForm => Ok(FiberPoint::both(interior_probability(point, target))),
        FiberMode::Mean => Ok(FiberPoint::both(indicator(
            target.contains_strict(&point.center()),
        ))),
        FiberMode::Truth => {
            let value = truth.ok_or_else(|| {
                Error::InvalidInput("truth mode needs true values for every point".into())
            })?;
            Ok(FiberPoint::both(indicator(target.contains_strict(value))))
        }
    }
}

/// Per-point output arrays of a fiber run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiberResults {
    pub interior_probability: Vec<f64>,
    pub monte_carlo_probability: Vec<f64>,
}

/// Evaluates every point of `field` against the configured target box.
///
/// Point `p` samples from a generator derived from `(base seed, p)`.
///
/// # Errors
/// Returns [`Error::Config`] for an invalid configuration and
/// [`Error::InvalidInput`] for truth mode on a field without truth values.
/// Both are checked before any point is evaluated.
pub fn estimate_fiber<const D: usize>(
    field: &FiberField<D>,
    config: &FiberConfig<D>,
) -> Result<FiberResults> {
    config.validate()?;
    if config.mode == FiberMode::Truth && field.truth.is_none() {
        return Err(Error::InvalidInput(
            "truth mode needs true values for every point".into(),
        ));
    }

    let _timer = Timed::info("fiber");
    let target = ValueBox::new(config.bottom_left, config.top_right);
    let seed = config.seed.resolve();
    log::debug!(
        "fiber: {} points, {D} variables, mode {:?}",
        field.len(),
        config.mode
    );

    let points = config.backend.map(field.len(), |p| {
        let mut rng = element_rng(seed, p as u64);
        evaluate_point(&field.boxes[p], field.truth(p), &target, config.mode, &mut rng)
    });

    let mut results = FiberResults {
        interior_probability: Vec::with_capacity(points.len()),
        monte_carlo_probability: Vec::with_capacity(points.len()),
    };
    for point in points {
        let point = point?;
        results.interior_probability.push(point.interior_probability);
        results.monte_carlo_probability.push(point.monte_carlo_probability);
    }
    Ok(results)
}

// ============================================================================
// Tests
// ============================================================================
