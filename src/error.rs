//! Error types for uncertainty estimation runs.
//!
//! Only configuration and input problems surface as errors. Numerical
//! degeneracies inside a single point or cell (zero variance, zero-volume
//! boxes, singular covariance) are resolved locally and never reach here.

use thiserror::Error;

/// Crate error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A scalar configuration value is out of range, or a backend name is
    /// not recognized.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A distribution model or evaluation mode name was not recognized.
    #[error("unsupported configuration: {0}")]
    UnsupportedModel(String),

    /// The model requires blocks that tile the grid exactly.
    #[error("grid dimensions {dims:?} are not divisible by block size {block_size}")]
    UnevenTiling { dims: [usize; 3], block_size: usize },

    /// A raw block does not hold exactly one sample per block slot.
    #[error("block {key} holds {actual} raw samples, expected {expected}")]
    RawCountMismatch {
        key: usize,
        expected: usize,
        actual: usize,
    },

    /// Input arrays are inconsistent with each other or with the grid.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
