//! Summary statistics and small dense linear algebra.
//!
//! Everything in this module works on `f64` slices and is independent of
//! grids or cells. Block reduction builds its summaries from these pieces,
//! and the multivariate cell estimator uses the covariance and Cholesky
//! routines.
//!
//! # Algorithms
//!
//! - **Mean**: Neumaier compensated summation, O(ε) error independent of n.
//! - **Variance**: Welford's online algorithm with Chan's pairwise merge.
//!   Reference: Welford (1962), *Technometrics* 4(3).
//! - **Covariance**: two-pass centered cross products.
//! - **Factorization**: Cholesky–Banachiewicz, with diagonal loading when
//!   the matrix is not numerically positive definite.

/// Neumaier compensated summation.
///
/// Captures the low-order bits lost by each addition in a running
/// compensation term, including the case where the addend is larger in
/// magnitude than the running sum.
///
/// Reference: Neumaier (1974), *ZAMM* 54(1), pp. 39–51.
///
/// # Examples
/// ```
/// use u_uncertain::stats::kahan_sum;
/// let v = [1.0, 1e100, 1.0, -1e100];
/// assert_eq!(kahan_sum(&v), 2.0);
/// ```
pub fn kahan_sum(data: &[f64]) -> f64 {
    let mut sum = 0.0_f64;
    let mut c = 0.0_f64;
    for &x in data {
        let t = sum + x;
        if sum.abs() >= x.abs() {
            c += (sum - t) + x;
        } else {
            c += (x - t) + sum;
        }
        sum = t;
    }
    sum + c
}

/// Arithmetic mean with compensated summation, or `None` for empty input.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(kahan_sum(data) / data.len() as f64)
}

/// Returns `(min, max)` of the slice, or `None` if it is empty.
///
/// NaN values are skipped; a slice of only NaNs yields `None`.
///
/// # Examples
/// ```
/// use u_uncertain::stats::min_max;
/// assert_eq!(min_max(&[3.0, 1.0, 4.0, 1.0, 5.0]), Some((1.0, 5.0)));
/// assert_eq!(min_max(&[]), None);
/// ```
pub fn min_max(data: &[f64]) -> Option<(f64, f64)> {
    let mut iter = data.iter().copied().filter(|x| !x.is_nan());
    let first = iter.next()?;
    Some(iter.fold((first, first), |(lo, hi), x| (lo.min(x), hi.max(x))))
}

// ---------------------------------------------------------------------------
// Welford online accumulator
// ---------------------------------------------------------------------------

/// Streaming accumulator for mean and variance.
///
/// Single pass, O(1) memory. Two accumulators built over disjoint parts of
/// a sample set can be merged; block reduction builds one per point and
/// merges them per block.
///
/// # Examples
/// ```
/// use u_uncertain::stats::WelfordAccumulator;
/// let mut acc = WelfordAccumulator::new();
/// for &x in &[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
///     acc.update(x);
/// }
/// assert!((acc.mean().unwrap() - 5.0).abs() < 1e-15);
/// assert!((acc.population_std_dev().unwrap() - 2.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WelfordAccumulator {
    count: u64,
    mean_acc: f64,
    m2: f64,
}

impl WelfordAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one sample.
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean_acc;
        self.mean_acc += delta / self.count as f64;
        self.m2 += delta * (value - self.mean_acc);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean_acc)
    }

    /// Population variance (denominator `n`).
    pub fn population_variance(&self) -> Option<f64> {
        (self.count > 0).then(|| self.m2 / self.count as f64)
    }

    pub fn population_std_dev(&self) -> Option<f64> {
        self.population_variance().map(f64::sqrt)
    }

    /// Merges another accumulator into this one.
    ///
    /// Reference: Chan, Golub & LeVeque (1979), "Updating Formulae and a
    /// Pairwise Algorithm for Computing Sample Variances".
    pub fn merge(&mut self, other: &WelfordAccumulator) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        let na = self.count as f64;
        let nb = other.count as f64;
        let n = na + nb;
        let delta = other.mean_acc - self.mean_acc;
        self.mean_acc += delta * (nb / n);
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.count += other.count;
    }
}

// ---------------------------------------------------------------------------
// Covariance of joint samples
// ---------------------------------------------------------------------------

/// Mean vector and sample covariance of a `k`-dimensional random vector.
///
/// `components[j]` holds every observation of component `j`; observation
/// `i` of the joint vector is `(components[0][i], ..., components[k-1][i])`,
/// so all components must have the same length `n`.
///
/// The covariance is returned row-major as a `k × k` vector with the
/// `n − 1` denominator. With fewer than two observations the covariance is
/// all zeros.
///
/// # Returns
/// - `None` if `components` is empty, any component is empty, or the
///   lengths differ.
///
/// # Examples
/// ```
/// use u_uncertain::stats::mean_and_covariance;
/// let x = [1.0, 2.0, 3.0, 4.0, 5.0];
/// let y = [2.0, 4.0, 6.0, 8.0, 10.0];
/// let (mean, cov) = mean_and_covariance(&[&x[..], &y[..]]).unwrap();
/// assert_eq!(mean, vec![3.0, 6.0]);
/// assert!((cov[1] - 5.0).abs() < 1e-12);
/// ```
pub fn mean_and_covariance(components: &[&[f64]]) -> Option<(Vec<f64>, Vec<f64>)> {
    let k = components.len();
    let n = components.first()?.len();
    if n == 0 || components.iter().any(|c| c.len() != n) {
        return None;
    }

    let means: Vec<f64> = components
        .iter()
        .map(|c| kahan_sum(c) / n as f64)
        .collect();

    let mut cov = vec![0.0; k * k];
    if n < 2 {
        return Some((means, cov));
    }
    let denom = (n - 1) as f64;
    for a in 0..k {
        for b in 0..=a {
            let (ca, cb) = (components[a], components[b]);
            let (ma, mb) = (means[a], means[b]);
            let s: f64 = ca
                .iter()
                .zip(cb)
                .map(|(&xa, &xb)| (xa - ma) * (xb - mb))
                .sum();
            let v = s / denom;
            cov[a * k + b] = v;
            cov[b * k + a] = v;
        }
    }
    Some((means, cov))
}

// ---------------------------------------------------------------------------
// Cholesky factorization
// ---------------------------------------------------------------------------

/// Number of diagonal-loading attempts before giving up on a full factor.
const MAX_LOADING_ATTEMPTS: usize = 8;

/// Lower-triangular Cholesky factor `L` with `A = L·Lᵀ`.
///
/// `matrix` is a row-major `k × k` symmetric matrix. The factor is returned
/// row-major with zeros above the diagonal.
///
/// # Returns
/// - `None` if a pivot is not strictly positive (the matrix is not
///   numerically positive definite) or `matrix.len() != k * k`.
///
/// # Examples
/// ```
/// use u_uncertain::stats::cholesky;
/// let a = [4.0, 2.0, 2.0, 3.0];
/// let l = cholesky(&a, 2).unwrap();
/// assert!((l[0] - 2.0).abs() < 1e-12);
/// assert!((l[2] - 1.0).abs() < 1e-12);
/// assert!((l[3] - 2.0_f64.sqrt()).abs() < 1e-12);
/// ```
pub fn cholesky(matrix: &[f64], k: usize) -> Option<Vec<f64>> {
    if matrix.len() != k * k {
        return None;
    }
    let mut l = vec![0.0; k * k];
    for i in 0..k {
        for j in 0..=i {
            let mut s = matrix[i * k + j];
            for p in 0..j {
                s -= l[i * k + p] * l[j * k + p];
            }
            if i == j {
                if !(s > 0.0) || !s.is_finite() {
                    return None;
                }
                l[i * k + i] = s.sqrt();
            } else {
                l[i * k + j] = s / l[j * k + j];
            }
        }
    }
    Some(l)
}

/// How a [`CholeskyFactor`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factorization {
    /// The matrix factored as given.
    Exact,
    /// Factored after adding `λ·I` on the given attempt (1-based).
    Loaded { attempt: usize },
    /// Every loading attempt failed; only the diagonal standard deviations
    /// are kept and correlations are dropped.
    Diagonal,
}

/// Factor used to draw correlated samples: `x = μ + L·z` with `z ~ N(0, I)`.
#[derive(Debug, Clone)]
pub struct CholeskyFactor {
    pub lower: Vec<f64>,
    pub dim: usize,
    pub kind: Factorization,
}

impl CholeskyFactor {
    /// Factors a covariance matrix, falling back to diagonal loading.
    ///
    /// On failure, retries with `cov + λ·(1 + mean diag)·I`, starting at
    /// `λ = epsilon` (or `1e-12` when `epsilon` is zero) and growing ×10
    /// per attempt. After the last attempt the diagonal factor
    /// `sqrt(max(σ²ᵢᵢ, 0))` is used.
    pub fn regularized(cov: &[f64], k: usize, epsilon: f64) -> Self {
        if let Some(lower) = cholesky(cov, k) {
            return Self {
                lower,
                dim: k,
                kind: Factorization::Exact,
            };
        }

        let mean_diag = if k == 0 {
            0.0
        } else {
            (0..k).map(|i| cov[i * k + i].max(0.0)).sum::<f64>() / k as f64
        };
        let scale = 1.0 + mean_diag;
        let mut lambda = if epsilon > 0.0 { epsilon } else { 1e-12 };
        let mut loaded = cov.to_vec();
        for attempt in 1..=MAX_LOADING_ATTEMPTS {
            for i in 0..k {
                loaded[i * k + i] = cov[i * k + i] + lambda * scale;
            }
            if let Some(lower) = cholesky(&loaded, k) {
                return Self {
                    lower,
                    dim: k,
                    kind: Factorization::Loaded { attempt },
                };
            }
            lambda *= 10.0;
        }

        let mut lower = vec![0.0; k * k];
        for i in 0..k {
            let v = cov[i * k + i];
            lower[i * k + i] = if v.is_finite() { v.max(0.0).sqrt() } else { 0.0 };
        }
        Self {
            lower,
            dim: k,
            kind: Factorization::Diagonal,
        }
    }

    /// Writes `mean + L·z` into `out`.
    pub fn transform(&self, mean: &[f64], z: &[f64], out: &mut [f64]) {
        let k = self.dim;
        for i in 0..k {
            let row = &self.lower[i * k..i * k + i + 1];
            let s: f64 = row.iter().zip(z).map(|(l, zj)| l * zj).sum();
            out[i] = mean[i] + s;
        }
    }
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
        fn welford_matches_two_pass(
            data in proptest::collection::vec(-1e3_f64..1e3, 1..100),
        ) {
            let mut acc = WelfordAccumulator::new();
            data.iter().for_each(|&x| acc.update(x));
            let m = kahan_sum(&data) / data.len() as f64;
            let var = data.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / data.len() as f64;
            prop_assert!((acc.mean().unwrap() - m).abs() < 1e-9);
            prop_assert!((acc.population_variance().unwrap() - var).abs() < 1e-6 * (1.0 + var));
        }

        #[test]
        fn covariance_diagonal_nonnegative(
            rows in proptest::collection::vec(
                proptest::collection::vec(-100.0_f64..100.0, 4), 2..30),
        ) {
            let components: Vec<Vec<f64>> =
                (0..4).map(|j| rows.iter().map(|r| r[j]).collect()).collect();
            let refs: Vec<&[f64]> = components.iter().map(|c| c.as_slice()).collect();
            let (_, cov) = mean_and_covariance(&refs).unwrap();
            for i in 0..4 {
                prop_assert!(cov[i * 4 + i] >= -1e-9);
                for j in 0..4 {
                    prop_assert!((cov[i * 4 + j] - cov[j * 4 + i]).abs() < 1e-9);
                }
            }
        }

        #[test]
        fn regularized_factor_always_finite(
            rows in proptest::collection::vec(
                proptest::collection::vec(-10.0_f64..10.0, 8), 1..12),
        ) {
            let components: Vec<Vec<f64>> =
                (0..8).map(|j| rows.iter().map(|r| r[j]).collect()).collect();
            let refs: Vec<&[f64]> = components.iter().map(|c| c.as_slice()).collect();
            let (_, cov) = mean_and_covariance(&refs).unwrap();
            let f = CholeskyFactor::regularized(&cov, 8, 1e-6);
            prop_assert!(f.lower.iter().all(|v| v.is_finite()));
        }
    }
}
