//! Corner probability models.
//!
//! A corner's true value is known only through a summary of its ensemble.
//! Each model turns that summary and an isovalue into the probability that
//! the corner lies below the isovalue:
//!
//! | Model | Summary | P(value ≤ isovalue) |
//! |---|---|---|
//! | [`CornerModel::Uniform`] | min, max | clamp((iso − min)/(max − min), 0, 1) |
//! | [`CornerModel::IndependentGaussian`] | mean, σ | Φ((iso − mean)/σ) |
//! | [`CornerModel::Multivariate`] | mean, raw samples | none per corner; see [`crate::cross`] |
//!
//! Zero-width summaries (`max == min`, `σ == 0`) are point masses: the
//! probability is 1 when the isovalue is at or above the value, else 0.

use std::fmt;
use std::str::FromStr;

use crate::config::Backend;
use crate::error::{Error, Result};

/// 1/√(2π)
const FRAC_1_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Distribution assumed for each corner's uncertain value.
///
/// Chosen once per run; every point and cell of the run uses the same
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CornerModel {
    /// Uniform over the ensemble's `[min, max]`.
    Uniform,
    /// Independent normal per corner, from the ensemble's mean and σ.
    IndependentGaussian,
    /// Joint normal over all corners of a cell, fitted to the raw samples.
    Multivariate,
}

impl CornerModel {
    /// Short name used on command lines and in output file names.
    pub fn short_name(self) -> &'static str {
        match self {
            CornerModel::Uniform => "uni",
            CornerModel::IndependentGaussian => "ig",
            CornerModel::Multivariate => "mg",
        }
    }
}

impl fmt::Display for CornerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for CornerModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uni" | "uniform" => Ok(CornerModel::Uniform),
            "ig" | "independent-gaussian" | "gaussian" => Ok(CornerModel::IndependentGaussian),
            "mg" | "multivariate" | "multivariate-gaussian" => Ok(CornerModel::Multivariate),
            other => Err(Error::UnsupportedModel(format!("distribution {other:?}"))),
        }
    }
}

// ============================================================================
// Per-corner probabilities
// ============================================================================

/// Standard normal CDF Φ(x).
///
/// Abramowitz & Stegun formula 26.2.17 with Horner evaluation; maximum
/// absolute error below 7.5 × 10⁻⁸.
///
/// # Examples
/// ```
/// use u_uncertain::corner::standard_normal_cdf;
/// assert!((standard_normal_cdf(0.0) - 0.5).abs() < 1e-7);
/// assert!((standard_normal_cdf(1.96) - 0.975).abs() < 1e-3);
/// ```
pub fn standard_normal_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return f64::NAN;
    }
    if x.is_infinite() {
        return if x > 0.0 { 1.0 } else { 0.0 };
    }
    let t = x.abs();
    let k = 1.0 / (1.0 + 0.231_641_9 * t);
    let density = FRAC_1_SQRT_2PI * (-0.5 * t * t).exp();
    let poly = k
        * (0.319_381_530
            + k * (-0.356_563_782 + k * (1.781_477_937 + k * (-1.821_255_978 + k * 1.330_274_429))));
    let upper_tail = density * poly;
    if x >= 0.0 { 1.0 - upper_tail } else { upper_tail }
}

/// Probability that a value uniform on `[min, max]` is at most `isovalue`.
///
/// # Examples
/// ```
/// use u_uncertain::corner::uniform_below;
/// assert_eq!(uniform_below(0.0, 1.0, 0.25), 0.25);
/// assert_eq!(uniform_below(0.0, 1.0, 2.0), 1.0);
/// assert_eq!(uniform_below(3.0, 3.0, 3.0), 1.0);
/// ```
pub fn uniform_below(min: f64, max: f64, isovalue: f64) -> f64 {
    if max <= min {
        return point_mass_below(min, isovalue);
    }
    ((isovalue - min) / (max - min)).clamp(0.0, 1.0)
}

/// Probability that a value drawn from N(mean, stdev²) is at most `isovalue`.
///
/// # Examples
/// ```
/// use u_uncertain::corner::gaussian_below;
/// assert!((gaussian_below(2.0, 0.5, 2.0) - 0.5).abs() < 1e-7);
/// assert_eq!(gaussian_below(2.0, 0.0, 1.0), 0.0);
/// ```
pub fn gaussian_below(mean: f64, stdev: f64, isovalue: f64) -> f64 {
    if stdev <= 0.0 {
        return point_mass_below(mean, isovalue);
    }
    standard_normal_cdf((isovalue - mean) / stdev)
}

#[inline]
fn point_mass_below(value: f64, isovalue: f64) -> f64 {
    if isovalue >= value { 1.0 } else { 0.0 }
}

// ============================================================================
// Summary fields
// ============================================================================

/// Per-point (or per-block) summary statistics, one record per point.
///
/// Built once by the block reducer (or supplied directly) and read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryField {
    /// `(min, max)` per point.
    MinMax { min: Vec<f64>, max: Vec<f64> },
    /// `(mean, σ)` per point.
    MeanStdev { mean: Vec<f64>, stdev: Vec<f64> },
    /// Mean plus `raw_len` raw samples per point, stored point-major in `raw`.
    MeanRaw {
        mean: Vec<f64>,
        raw: Vec<f64>,
        raw_len: usize,
    },
}

impl SummaryField {
    /// Builds a min/max field.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] on length mismatch or any `min > max`.
    pub fn min_max(min: Vec<f64>, max: Vec<f64>) -> Result<Self> {
        if min.len() != max.len() {
            return Err(Error::InvalidInput(format!(
                "min has {} values but max has {}",
                min.len(),
                max.len()
            )));
        }
        if let Some(p) = min.iter().zip(&max).position(|(lo, hi)| !(lo <= hi)) {
            return Err(Error::InvalidInput(format!(
                "point {p} has min {} above max {}",
                min[p], max[p]
            )));
        }
        Ok(SummaryField::MinMax { min, max })
    }

    /// Builds a mean/σ field.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] on length mismatch or a negative or
    /// NaN σ.
    pub fn mean_stdev(mean: Vec<f64>, stdev: Vec<f64>) -> Result<Self> {
        if mean.len() != stdev.len() {
            return Err(Error::InvalidInput(format!(
                "mean has {} values but stdev has {}",
                mean.len(),
                stdev.len()
            )));
        }
        if let Some(p) = stdev.iter().position(|s| !(*s >= 0.0)) {
            return Err(Error::InvalidInput(format!(
                "point {p} has invalid stdev {}",
                stdev[p]
            )));
        }
        Ok(SummaryField::MeanStdev { mean, stdev })
    }

    /// Builds a mean/raw field with `raw_len` samples per point.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if `raw_len` is zero or
    /// `raw.len() != mean.len() * raw_len`.
    pub fn mean_raw(mean: Vec<f64>, raw: Vec<f64>, raw_len: usize) -> Result<Self> {
        if raw_len == 0 || raw.len() != mean.len() * raw_len {
            return Err(Error::InvalidInput(format!(
                "raw array of {} values does not hold {} samples for each of {} points",
                raw.len(),
                raw_len,
                mean.len()
            )));
        }
        Ok(SummaryField::MeanRaw { mean, raw, raw_len })
    }

    /// Number of points (or blocks) described.
    pub fn len(&self) -> usize {
        match self {
            SummaryField::MinMax { min, .. } => min.len(),
            SummaryField::MeanStdev { mean, .. } | SummaryField::MeanRaw { mean, .. } => {
                mean.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The corner model this summary feeds.
    pub fn model(&self) -> CornerModel {
        match self {
            SummaryField::MinMax { .. } => CornerModel::Uniform,
            SummaryField::MeanStdev { .. } => CornerModel::IndependentGaussian,
            SummaryField::MeanRaw { .. } => CornerModel::Multivariate,
        }
    }

    /// Raw samples of `point`, for mean/raw fields.
    pub fn raw(&self, point: usize) -> Option<&[f64]> {
        match self {
            SummaryField::MeanRaw { raw, raw_len, .. } => {
                raw.get(point * raw_len..(point + 1) * raw_len)
            }
            _ => None,
        }
    }

    /// Probability that `point` lies below `isovalue`.
    ///
    /// Returns `None` for mean/raw fields, whose corners are only
    /// meaningful jointly.
    pub fn probability_below(&self, point: usize, isovalue: f64) -> Option<f64> {
        match self {
            SummaryField::MinMax { min, max } => {
                Some(uniform_below(*min.get(point)?, *max.get(point)?, isovalue))
            }
            SummaryField::MeanStdev { mean, stdev } => {
                Some(gaussian_below(*mean.get(point)?, *stdev.get(point)?, isovalue))
            }
            SummaryField::MeanRaw { .. } => None,
        }
    }

    /// Below-isovalue probability of every point.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedModel`] for mean/raw fields.
    pub fn corner_probabilities(&self, isovalue: f64, backend: Backend) -> Result<Vec<f64>> {
        match self {
            SummaryField::MinMax { min, max } => {
                Ok(backend.map(min.len(), |p| uniform_below(min[p], max[p], isovalue)))
            }
            SummaryField::MeanStdev { mean, stdev } => {
                Ok(backend.map(mean.len(), |p| gaussian_below(mean[p], stdev[p], isovalue)))
            }
            SummaryField::MeanRaw { .. } => Err(Error::UnsupportedModel(
                "multivariate summaries have no independent corner probability".into(),
            )),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_parse() {
        assert_eq!("uni".parse::<CornerModel>().unwrap(), CornerModel::Uniform);
        assert_eq!("IG".parse::<CornerModel>().unwrap(), CornerModel::IndependentGaussian);
        assert_eq!("mg".parse::<CornerModel>().unwrap(), CornerModel::Multivariate);
        assert!(matches!(
            "cauchy".parse::<CornerModel>(),
            Err(Error::UnsupportedModel(_))
        ));
    }

    #[test]
    fn test_model_display_roundtrip() {
        for m in [
            CornerModel::Uniform,
            CornerModel::IndependentGaussian,
            CornerModel::Multivariate,
        ] {
            assert_eq!(m.to_string().parse::<CornerModel>().unwrap(), m);
        }
    }

    #[test]
    fn test_normal_cdf_tails() {
        assert_eq!(standard_normal_cdf(f64::INFINITY), 1.0);
        assert_eq!(standard_normal_cdf(f64::NEG_INFINITY), 0.0);
        assert!(standard_normal_cdf(-8.0) < 1e-10);
        assert!(standard_normal_cdf(8.0) > 1.0 - 1e-10);
        assert!(standard_normal_cdf(f64::NAN).is_nan());
    }

    #[test]
    fn test_normal_cdf_symmetry() {
        for &x in &[0.1, 0.5, 1.0, 2.0, 3.5] {
            let s = standard_normal_cdf(x) + standard_normal_cdf(-x);
            assert!((s - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_uniform_endpoints() {
        assert_eq!(uniform_below(2.0, 6.0, 2.0), 0.0);
        assert_eq!(uniform_below(2.0, 6.0, 6.0), 1.0);
        assert_eq!(uniform_below(2.0, 6.0, 4.0), 0.5);
        assert_eq!(uniform_below(2.0, 6.0, -10.0), 0.0);
    }

    #[test]
    fn test_uniform_point_mass() {
        assert_eq!(uniform_below(1.0, 1.0, 0.999), 0.0);
        assert_eq!(uniform_below(1.0, 1.0, 1.0), 1.0);
    }

    #[test]
    fn test_gaussian_at_mean() {
        assert!((gaussian_below(-3.0, 2.0, -3.0) - 0.5).abs() < 1e-7);
    }

    #[test]
    fn test_gaussian_limits() {
        assert!(gaussian_below(0.0, 1.0, -50.0) < 1e-12);
        assert!(gaussian_below(0.0, 1.0, 50.0) > 1.0 - 1e-12);
    }

    #[test]
    fn test_gaussian_point_mass() {
        assert_eq!(gaussian_below(5.0, 0.0, 5.0), 1.0);
        assert_eq!(gaussian_below(5.0, 0.0, 4.0), 0.0);
    }

    #[test]
    fn test_summary_constructors_validate() {
        assert!(SummaryField::min_max(vec![0.0], vec![1.0, 2.0]).is_err());
        assert!(SummaryField::min_max(vec![2.0], vec![1.0]).is_err());
        assert!(SummaryField::mean_stdev(vec![0.0], vec![-1.0]).is_err());
        assert!(SummaryField::mean_stdev(vec![0.0], vec![f64::NAN]).is_err());
        assert!(SummaryField::mean_raw(vec![0.0, 1.0], vec![0.0; 5], 3).is_err());
        assert!(SummaryField::mean_raw(vec![0.0], vec![], 0).is_err());
    }

    #[test]
    fn test_summary_raw_access() {
        let f = SummaryField::mean_raw(vec![1.0, 5.0], vec![0.0, 2.0, 4.0, 6.0], 2).unwrap();
        assert_eq!(f.len(), 2);
        assert_eq!(f.model(), CornerModel::Multivariate);
        assert_eq!(f.raw(1), Some(&[4.0, 6.0][..]));
        assert_eq!(f.raw(2), None);
        assert_eq!(f.probability_below(0, 1.0), None);
        assert!(f.corner_probabilities(1.0, Backend::Serial).is_err());
    }

    #[test]
    fn test_corner_probabilities_per_point() {
        let f = SummaryField::min_max(vec![0.0, 1.0, 2.0], vec![1.0, 1.0, 4.0]).unwrap();
        let p = f.corner_probabilities(1.0, Backend::Serial).unwrap();
        assert_eq!(p, vec![1.0, 1.0, 0.0]);
        assert_eq!(f.probability_below(2, 3.0), Some(0.5));
        assert_eq!(f.probability_below(3, 3.0), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]

        #[test]
        fn uniform_monotone_in_isovalue(
            min in -100.0_f64..0.0,
            width in 0.0_f64..100.0,
            a in -200.0_f64..200.0,
            b in -200.0_f64..200.0,
        ) {
            let max = min + width;
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let p_lo = uniform_below(min, max, lo);
            let p_hi = uniform_below(min, max, hi);
            prop_assert!((0.0..=1.0).contains(&p_lo));
            prop_assert!(p_lo <= p_hi);
        }

        #[test]
        fn gaussian_in_unit_interval_and_monotone(
            mean in -100.0_f64..100.0,
            stdev in 0.01_f64..50.0,
            a in -300.0_f64..300.0,
            b in -300.0_f64..300.0,
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let p_lo = gaussian_below(mean, stdev, lo);
            let p_hi = gaussian_below(mean, stdev, hi);
            prop_assert!((0.0..=1.0).contains(&p_lo));
            prop_assert!(p_lo <= p_hi + 1e-12);
        }
    }
}
