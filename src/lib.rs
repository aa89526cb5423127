//! # u-uncertain
//!
//! Probabilistic level-crossing and fiber estimation for uncertain scalar
//! fields on structured grids.
//!
//! Instead of extracting one isosurface from one field, this crate treats
//! every grid point as a random variable (summarized from an ensemble or
//! from block statistics) and reports, per cell, how likely the level set
//! is to pass through it and how uncertain its topology is.
//!
//! ## Modules
//!
//! - [`block`]: spatial block reduction of ensemble fields
//! - [`corner`]: per-corner distribution models and below-isovalue probabilities
//! - [`cross`]: per-cell cross probability, non-zero outcome count and entropy
//! - [`fiber`]: probability that multi-variable values fall in a target box
//! - [`pipeline`]: end-to-end runs with stage timing
//! - [`grid`], [`stats`], [`random`], [`config`], [`timing`], [`error`]:
//!   supporting pieces
//!
//! ## Design Philosophy
//!
//! - **Element-local work**: every point and cell is computed independently
//!   and in parallel; only block grouping needs a global pass
//! - **Reproducible sampling**: Monte Carlo streams are derived per element
//!   from one base seed
//! - **Property-based testing**: probability invariants verified via proptest

pub mod block;
pub mod config;
pub mod corner;
pub mod cross;
pub mod error;
pub mod fiber;
pub mod grid;
pub mod pipeline;
pub mod random;
pub mod stats;
pub mod timing;

pub use error::{Error, Result};
