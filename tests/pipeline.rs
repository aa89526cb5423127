//! Integration tests for the level-crossing and fiber pipelines.
//!
//! These drive the public API the way an application would: build an
//! ensemble or summary field, configure a run, and inspect the per-cell or
//! per-point output arrays.

use u_uncertain::block::{BlockLayout, EnsembleField, reduce_blocks};
use u_uncertain::config::{Backend, FiberConfig, IsoConfig, SeedPolicy};
use u_uncertain::corner::{CornerModel, SummaryField};
use u_uncertain::cross::outcome_probability;
use u_uncertain::fiber::{FiberField, FiberMode, estimate_fiber, min_max_from_mean_dev};
use u_uncertain::grid::{CellTopology, StructuredGrid, UniformGeometry};
use u_uncertain::pipeline::{run_isocontour, run_on_summary};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Deterministic pseudo-ensemble: member `m` at point `p` is a smooth
/// ramp in x plus a member-dependent offset.
fn ramp_ensemble(dims: [usize; 3], members: usize) -> EnsembleField {
    let grid = StructuredGrid::new(dims).unwrap();
    let per_member: Vec<Vec<f64>> = (0..members)
        .map(|m| {
            (0..grid.num_points())
                .map(|p| {
                    let [x, y, z] = grid.point_coords(p);
                    x as f64 + 0.1 * (y + z) as f64 + (m as f64 - members as f64 / 2.0) * 0.3
                })
                .collect()
        })
        .collect();
    EnsembleField::from_members(&per_member).unwrap()
}

#[test]
fn test_block_reduction_partial_blocks() {
    init_logging();
    let values: Vec<f64> = (0..100).map(|i| (i % 10) as f64).collect();
    let field = EnsembleField::single(values);
    let layout = BlockLayout::new([10, 10, 1], 4).unwrap();
    let summary = reduce_blocks(&field, &layout, CornerModel::Uniform, Backend::Serial).unwrap();

    let SummaryField::MinMax { min, max } = summary else {
        panic!("uniform model must reduce to min/max");
    };
    assert_eq!(min.len(), 9);
    assert_eq!((min[0], max[0]), (0.0, 3.0));
    assert_eq!((min[1], max[1]), (4.0, 7.0));
    assert_eq!((min[2], max[2]), (8.0, 9.0));
}

#[test]
fn test_hexahedral_run_all_models_in_range() {
    init_logging();
    let field = ramp_ensemble([8, 8, 8], 5);
    let geometry = UniformGeometry {
        origin: [-1.0, -1.0, -1.0],
        spacing: [0.5, 0.5, 0.5],
    };
    for model in [
        CornerModel::Uniform,
        CornerModel::IndependentGaussian,
        CornerModel::Multivariate,
    ] {
        let config = IsoConfig::new(3.5, 2, model)
            .with_mc_samples(300)
            .with_seed(SeedPolicy::Fixed(2024));
        let out = run_isocontour(&field, [8, 8, 8], &geometry, &config).unwrap();
        assert_eq!(out.grid.point_dims(), [4, 4, 4]);
        assert_eq!(out.grid.corners_per_cell(), 8);
        assert_eq!(out.cells.len(), 27);
        assert_eq!(out.geometry.origin, [-1.0, -1.0, -1.0]);
        for cell in 0..out.cells.len() {
            let r = out.cells.get(cell).unwrap();
            assert!((0.0..=1.0).contains(&r.cross_probability), "{model}: {r:?}");
            assert!(r.entropy >= 0.0 && r.entropy <= 8.0 + 1e-9, "{model}: {r:?}");
            assert!(r.num_nonzero_outcomes <= 256);
        }
    }
}

#[test]
fn test_level_set_far_away_never_crosses() {
    let field = ramp_ensemble([6, 6, 1], 4);
    let config = IsoConfig::new(1000.0, 2, CornerModel::IndependentGaussian);
    let out = run_isocontour(&field, [6, 6, 1], &UniformGeometry::default(), &config).unwrap();
    assert!(out.cells.cross_probability.iter().all(|&p| p == 0.0));
    assert!(out.cells.entropy.iter().all(|&h| h == 0.0));
    assert!(out.cells.num_nonzero_prob.iter().all(|&n| n == 1));
}

#[test]
fn test_per_point_multivariate_2d_ensemble() {
    init_logging();
    // 15 members on a 2D grid, one point per block.
    let field = ramp_ensemble([6, 5, 1], 15);
    let config = IsoConfig::new(2.5, 1, CornerModel::Multivariate)
        .with_mc_samples(500)
        .with_seed(SeedPolicy::Fixed(9));
    let serial = run_isocontour(
        &field,
        [6, 5, 1],
        &UniformGeometry::default(),
        &config.clone().with_backend(Backend::Serial),
    )
    .unwrap();
    let parallel = run_isocontour(
        &field,
        [6, 5, 1],
        &UniformGeometry::default(),
        &config.with_backend(Backend::Parallel),
    )
    .unwrap();

    assert_eq!(serial.grid.point_dims(), [6, 5, 1]);
    assert_eq!(serial.cells.len(), 20);
    assert_eq!(serial.cells, parallel.cells);
    assert_eq!(serial.summary.raw(0).map(|r| r.len()), Some(15));
    // Cells straddling x = 2.5 are the likeliest to cross.
    let grid = serial.grid;
    let [cx, _, _] = grid.cell_dims();
    let crossing_column = serial.cells.cross_probability[2];
    let far_column = serial.cells.cross_probability[cx - 1];
    assert!(crossing_column > far_column);
}

#[test]
fn test_summary_input_matches_closed_form() {
    let grid = StructuredGrid::new([2, 2, 2]).unwrap();
    let summary = SummaryField::mean_stdev(
        vec![0.0, 1.0, -1.0, 0.5, 0.2, -0.3, 2.0, 0.0],
        vec![1.0, 0.5, 2.0, 0.1, 1.0, 1.0, 0.5, 0.0],
    )
    .unwrap();
    let config = IsoConfig::new(0.1, 1, CornerModel::IndependentGaussian);
    let cells = run_on_summary(&grid, &summary, &config).unwrap();

    let corners = grid.cell_corners(0);
    let probs: Vec<f64> = corners
        .as_slice()
        .iter()
        .map(|&p| summary.probability_below(p, 0.1).unwrap())
        .collect();
    let all_above = outcome_probability(&probs, 0);
    let all_below = outcome_probability(&probs, 255);
    assert!((cells.cross_probability[0] + all_above + all_below - 1.0).abs() < 1e-12);
}

#[test]
fn test_fiber_four_variables_monte_carlo_tracks_closed_form() {
    init_logging();
    let n = 40;
    let means: Vec<Vec<f64>> = (0..4)
        .map(|v| (0..n).map(|p| (p as f64 * 0.05) + v as f64 * 0.1).collect())
        .collect();
    let devs = vec![0.5; n];
    let (mut mins, mut maxs) = (Vec::new(), Vec::new());
    for mean in &means {
        let (lo, hi) = min_max_from_mean_dev(mean, &devs).unwrap();
        mins.push(lo);
        maxs.push(hi);
    }
    let field = FiberField::<4>::from_min_max(
        [&mins[0], &mins[1], &mins[2], &mins[3]],
        [&maxs[0], &maxs[1], &maxs[2], &maxs[3]],
    )
    .unwrap();
    let config = FiberConfig::new(
        [0.0, 0.2, 0.3, 0.4],
        [1.5, 1.6, 1.8, 2.0],
        FiberMode::MonteCarlo { samples: 20_000 },
    )
    .with_seed(SeedPolicy::Fixed(77));

    let out = estimate_fiber(&field, &config).unwrap();
    assert_eq!(out.interior_probability.len(), n);
    for (exact, mc) in out
        .interior_probability
        .iter()
        .zip(&out.monte_carlo_probability)
    {
        assert!((exact - mc).abs() < 0.02, "exact {exact} vs mc {mc}");
    }
}

#[test]
fn test_fiber_closed_form_mode_is_deterministic_without_seed() {
    let lo = [0.0, 2.0];
    let hi = [1.0, 3.0];
    let field = FiberField::<3>::from_min_max([&lo, &lo, &lo], [&hi, &hi, &hi]).unwrap();
    let config = FiberConfig::new([0.0; 3], [1.0; 3], FiberMode::ClosedForm);
    let out = estimate_fiber(&field, &config).unwrap();
    assert_eq!(out.interior_probability, vec![1.0, 0.0]);
    assert_eq!(out.monte_carlo_probability, vec![1.0, 0.0]);
}
