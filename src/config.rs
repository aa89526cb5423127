//! Run configuration.
//!
//! Everything here is read-only during a dispatch: the isovalue, block
//! size, sample counts, seeding policy and execution backend are fixed
//! before the first element is visited and shared by all of them.

use rayon::prelude::*;
use std::str::FromStr;

use crate::corner::CornerModel;
use crate::error::{Error, Result};
use crate::fiber::FiberMode;

/// Environment variable consulted by [`Backend::from_env`].
pub const BACKEND_ENV: &str = "UCV_BACKEND";

/// Default number of Monte Carlo samples per cell for the multivariate model.
pub const DEFAULT_MC_SAMPLES: usize = 1000;

/// Default diagonal loading applied when a covariance factorization fails.
pub const DEFAULT_REGULARIZATION: f64 = 1e-6;

/// Default probability above which an outcome class counts as non-zero.
pub const DEFAULT_OUTCOME_EPSILON: f64 = 1e-4;

// ============================================================================
// Execution backend
// ============================================================================

/// How per-element work is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// One element after another on the calling thread.
    Serial,
    /// Elements spread over rayon's global thread pool.
    #[default]
    Parallel,
}

impl Backend {
    /// Reads the backend from `UCV_BACKEND`.
    ///
    /// A missing variable selects [`Backend::Parallel`]. An unrecognized
    /// name is reported and also falls back to [`Backend::Parallel`].
    pub fn from_env() -> Self {
        match std::env::var(BACKEND_ENV) {
            Ok(name) => name.parse().unwrap_or_else(|_| {
                log::warn!("unrecognized backend {name:?}, using parallel");
                Backend::Parallel
            }),
            Err(_) => {
                log::debug!("no {BACKEND_ENV} set, using parallel");
                Backend::Parallel
            }
        }
    }

    /// Evaluates `f` for every index in `0..n` and collects the results in
    /// index order.
    pub fn map<T, F>(self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            Backend::Serial => (0..n).map(f).collect(),
            Backend::Parallel => (0..n).into_par_iter().map(f).collect(),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(Backend::Serial),
            "parallel" | "openmp" | "cuda" => Ok(Backend::Parallel),
            other => Err(Error::Config(format!("unknown backend {other:?}"))),
        }
    }
}

// ============================================================================
// Seeding
// ============================================================================

/// Source of the base seed for Monte Carlo work in one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedPolicy {
    /// Reproducible runs from a fixed base seed.
    Fixed(u64),
    /// A fresh base seed drawn from OS entropy on every dispatch.
    #[default]
    Entropy,
}

impl SeedPolicy {
    /// Resolves the policy to the base seed used for this dispatch.
    pub fn resolve(self) -> u64 {
        match self {
            SeedPolicy::Fixed(seed) => seed,
            SeedPolicy::Entropy => {
                use rand::Rng;
                let seed: u64 = rand::rng().random();
                log::debug!("drew base seed {seed} from entropy");
                seed
            }
        }
    }
}

// ============================================================================
// Level-crossing pipeline
// ============================================================================

/// Configuration of a level-crossing (cross-probability) run.
#[derive(Debug, Clone, PartialEq)]
pub struct IsoConfig {
    pub isovalue: f64,
    pub block_size: usize,
    pub model: CornerModel,
    pub mc_samples: usize,
    pub regularization: f64,
    pub outcome_epsilon: f64,
    pub seed: SeedPolicy,
    pub backend: Backend,
}

impl IsoConfig {
    /// Creates a configuration with default sampling and backend settings.
    pub fn new(isovalue: f64, block_size: usize, model: CornerModel) -> Self {
        Self {
            isovalue,
            block_size,
            model,
            mc_samples: DEFAULT_MC_SAMPLES,
            regularization: DEFAULT_REGULARIZATION,
            outcome_epsilon: DEFAULT_OUTCOME_EPSILON,
            seed: SeedPolicy::Entropy,
            backend: Backend::Parallel,
        }
    }

    pub fn with_mc_samples(mut self, samples: usize) -> Self {
        self.mc_samples = samples;
        self
    }

    pub fn with_regularization(mut self, epsilon: f64) -> Self {
        self.regularization = epsilon;
        self
    }

    pub fn with_outcome_epsilon(mut self, epsilon: f64) -> Self {
        self.outcome_epsilon = epsilon;
        self
    }

    pub fn with_seed(mut self, seed: SeedPolicy) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Checks every scalar before any computation starts.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a non-finite isovalue, a zero block
    /// size, a zero sample count under the multivariate model, or a
    /// negative/non-finite epsilon.
    pub fn validate(&self) -> Result<()> {
        if !self.isovalue.is_finite() {
            return Err(Error::Config(format!(
                "isovalue must be finite, got {}",
                self.isovalue
            )));
        }
        if self.block_size == 0 {
            return Err(Error::Config("block size must be at least 1".into()));
        }
        if self.model == CornerModel::Multivariate && self.mc_samples == 0 {
            return Err(Error::Config(
                "multivariate model needs at least one Monte Carlo sample".into(),
            ));
        }
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(Error::Config(format!(
                "regularization must be finite and non-negative, got {}",
                self.regularization
            )));
        }
        if !self.outcome_epsilon.is_finite() || self.outcome_epsilon < 0.0 {
            return Err(Error::Config(format!(
                "outcome epsilon must be finite and non-negative, got {}",
                self.outcome_epsilon
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Fiber pipeline
// ============================================================================

/// Configuration of a fiber (target box) run over `D` co-located fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FiberConfig<const D: usize> {
    pub bottom_left: [f64; D],
    pub top_right: [f64; D],
    pub mode: FiberMode,
    pub seed: SeedPolicy,
    pub backend: Backend,
}

impl<const D: usize> FiberConfig<D> {
    pub fn new(bottom_left: [f64; D], top_right: [f64; D], mode: FiberMode) -> Self {
        Self {
            bottom_left,
            top_right,
            mode,
            seed: SeedPolicy::Entropy,
            backend: Backend::Parallel,
        }
    }

    pub fn with_seed(mut self, seed: SeedPolicy) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// # Errors
    /// Returns [`Error::Config`] if the target box has non-finite or
    /// inverted corners, or Monte Carlo mode asks for zero samples.
    pub fn validate(&self) -> Result<()> {
        if D == 0 {
            return Err(Error::Config("target box needs at least one axis".into()));
        }
        for axis in 0..D {
            let (lo, hi) = (self.bottom_left[axis], self.top_right[axis]);
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(Error::Config(format!(
                    "target box axis {axis} must satisfy bottom_left <= top_right, got [{lo}, {hi}]"
                )));
            }
        }
        if let FiberMode::MonteCarlo { samples: 0 } = self.mode {
            return Err(Error::Config(
                "Monte Carlo mode needs at least one sample".into(),
            ));
        }
        Ok(())
    }
}
