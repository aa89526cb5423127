//! End-to-end level-crossing runs.
//!
//! [`run_isocontour`] takes an ensemble field on a structured grid and
//! produces per-cell crossing statistics on the reduced (block) grid:
//!
//! ```text
//! ensemble field ─► block keys ─► reduce ─► summary per block
//!                                              │
//!                       reduced grid ◄─────────┘
//!                            │
//!                            ▼
//!             cross probability, outcome count, entropy per cell
//! ```
//!
//! [`run_on_summary`] starts from statistics that were reduced elsewhere.
//! Configuration is validated before any element is visited.

use crate::block::{BlockLayout, EnsembleField, reduce_blocks};
use crate::config::IsoConfig;
use crate::corner::{CornerModel, SummaryField};
use crate::cross::{CellResults, estimate_cells};
use crate::error::{Error, Result};
use crate::grid::{CellTopology, StructuredGrid, UniformGeometry};
use crate::timing::Timed;

/// Result of a full run, placed on the reduced grid.
#[derive(Debug, Clone, PartialEq)]
pub struct IsoOutput {
    /// Grid whose points are the blocks.
    pub grid: StructuredGrid,
    /// Placement of `grid` over the input bounds.
    pub geometry: UniformGeometry,
    /// Per-block statistics, one record per point of `grid`.
    pub summary: SummaryField,
    /// Per-cell outputs on `grid`.
    pub cells: CellResults,
    /// Base seed used for Monte Carlo sampling.
    pub seed: u64,
}

/// Reduces `field` into blocks and estimates every cell of the block grid.
///
/// # Errors
/// - [`Error::Config`] for an invalid configuration.
/// - [`Error::UnevenTiling`] when the multivariate model is requested on
///   a grid that is not a whole number of blocks on every active axis.
/// - [`Error::InvalidInput`] when `field` does not match `point_dims`.
pub fn run_isocontour(
    field: &EnsembleField,
    point_dims: [usize; 3],
    geometry: &UniformGeometry,
    config: &IsoConfig,
) -> Result<IsoOutput> {
    config.validate()?;
    let layout = BlockLayout::new(point_dims, config.block_size)?;
    if config.model == CornerModel::Multivariate {
        layout.check_exact_tiling()?;
    }
    log::info!(
        "model {}, isovalue {}, block size {}, backend {:?}",
        config.model,
        config.isovalue,
        config.block_size,
        config.backend
    );

    let summary = reduce_blocks(field, &layout, config.model, config.backend)?;
    let grid = layout.reduced_grid()?;
    let seed = config.seed.resolve();
    let cells = estimate(&grid, &summary, config, seed)?;

    Ok(IsoOutput {
        grid,
        geometry: layout.reduced_geometry(geometry),
        summary,
        cells,
        seed,
    })
}

/// Estimates every cell of `grid` from precomputed point statistics.
///
/// # Errors
/// Returns [`Error::Config`] for an invalid configuration or a summary
/// that does not feed `config.model`, and [`Error::InvalidInput`] when the
/// summary does not cover the grid.
pub fn run_on_summary(
    grid: &StructuredGrid,
    summary: &SummaryField,
    config: &IsoConfig,
) -> Result<CellResults> {
    config.validate()?;
    if summary.model() != config.model {
        return Err(Error::Config(format!(
            "model {} cannot use a summary built for {}",
            config.model,
            summary.model()
        )));
    }
    estimate(grid, summary, config, config.seed.resolve())
}

fn estimate(
    grid: &StructuredGrid,
    summary: &SummaryField,
    config: &IsoConfig,
    seed: u64,
) -> Result<CellResults> {
    let _timer = Timed::info("cross probability");
    log::debug!(
        "{} cells with {} corners",
        grid.num_cells(),
        grid.corners_per_cell()
    );
    estimate_cells(grid, summary, config, seed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Backend, SeedPolicy};

    #[test]
    fn test_per_point_uniform_quad() {
        // Each point's members span [0, 1]; isovalue 0.5 gives p = 0.5.
        let values = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let field = EnsembleField::new(values, 4, 2).unwrap();
        let config = IsoConfig::new(0.5, 1, CornerModel::Uniform).with_backend(Backend::Serial);
        let out = run_isocontour(&field, [2, 2, 1], &UniformGeometry::default(), &config).unwrap();
        assert_eq!(out.grid.point_dims(), [2, 2, 1]);
        assert_eq!(out.cells.len(), 1);
        assert!((out.cells.cross_probability[0] - 0.875).abs() < 1e-12);
        assert_eq!(out.cells.num_nonzero_prob[0], 16);
    }

    #[test]
    fn test_uneven_tiling_rejected_for_multivariate() {
        let field = EnsembleField::single(vec![0.0; 100]);
        let config = IsoConfig::new(0.5, 4, CornerModel::Multivariate);
        let err = run_isocontour(&field, [10, 10, 1], &UniformGeometry::default(), &config);
        assert!(matches!(err, Err(Error::UnevenTiling { .. })));
    }

    #[test]
    fn test_uneven_tiling_allowed_for_independent_models() {
        let values: Vec<f64> = (0..100).map(|i| (i % 10) as f64).collect();
        let field = EnsembleField::single(values);
        let config = IsoConfig::new(4.5, 4, CornerModel::IndependentGaussian);
        let out = run_isocontour(&field, [10, 10, 1], &UniformGeometry::default(), &config).unwrap();
        assert_eq!(out.grid.point_dims(), [3, 3, 1]);
        assert_eq!(out.cells.len(), 4);
        assert!(out.cells.cross_probability.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_fixed_seed_is_reported_and_reproducible() {
        let values: Vec<f64> = (0..16 * 3).map(|i| ((i * 37) % 13) as f64 / 6.0).collect();
        let field = EnsembleField::new(values, 16, 3).unwrap();
        let config = IsoConfig::new(1.0, 2, CornerModel::Multivariate)
            .with_mc_samples(200)
            .with_seed(SeedPolicy::Fixed(5));
        let a = run_isocontour(&field, [4, 4, 1], &UniformGeometry::default(), &config).unwrap();
        let b = run_isocontour(&field, [4, 4, 1], &UniformGeometry::default(), &config).unwrap();
        assert_eq!(a.seed, 5);
        assert_eq!(a.cells, b.cells);
        assert_eq!(a.summary.raw(0).map(|r| r.len()), Some(4 * 3));
    }

    #[test]
    fn test_run_on_summary_checks_model() {
        let grid = StructuredGrid::new([2, 2, 1]).unwrap();
        let summary = SummaryField::min_max(vec![0.0; 4], vec![1.0; 4]).unwrap();
        let config = IsoConfig::new(0.5, 1, CornerModel::IndependentGaussian);
        assert!(matches!(
            run_on_summary(&grid, &summary, &config),
            Err(Error::Config(_))
        ));
        let config = IsoConfig::new(0.5, 1, CornerModel::Uniform);
        let cells = run_on_summary(&grid, &summary, &config).unwrap();
        assert!((cells.entropy[0] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_config_rejected_before_work() {
        let field = EnsembleField::single(vec![0.0; 4]);
        let config = IsoConfig::new(f64::NAN, 1, CornerModel::Uniform);
        assert!(matches!(
            run_isocontour(&field, [2, 2, 1], &UniformGeometry::default(), &config),
            Err(Error::Config(_))
        ));
    }
}
