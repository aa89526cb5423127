//! Spatial block reduction.
//!
//! Partitions a structured point grid into `block_size`-wide blocks along
//! every active axis and collapses the ensemble samples of each block into
//! one summary record. The reduced records form a coarser structured grid
//! whose points are the blocks.
//!
//! The reduction runs in three steps:
//!
//! 1. [`BlockLayout::create_keys`] labels every point with the flat index
//!    of its block, `bx + by·nbx + bz·nbx·nby`, where `b = ⌊coord / size⌋`.
//! 2. [`KeyGroups::new`] groups point indices by key (a stable counting
//!    sort, so points of a block stay in ascending index order).
//! 3. [`reduce`] aggregates each group into min/max, mean/σ (population
//!    moments) or mean + raw samples.

use crate::config::Backend;
use crate::corner::{CornerModel, SummaryField};
use crate::error::{Error, Result};
use crate::grid::{StructuredGrid, UniformGeometry};
use crate::stats::{self, WelfordAccumulator};
use crate::timing::Timed;

// ============================================================================
// Ensemble field
// ============================================================================

/// Ensemble samples of a scalar field, stored point-major.
///
/// Sample `m` of point `p` lives at `values[p * members + m]`. Member `m`
/// refers to the same realization at every point.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleField {
    values: Vec<f64>,
    num_points: usize,
    members: usize,
}

impl EnsembleField {
    /// Wraps a point-major array.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if `members` is zero or
    /// `values.len() != num_points * members`.
    pub fn new(values: Vec<f64>, num_points: usize, members: usize) -> Result<Self> {
        if members == 0 || values.len() != num_points * members {
            return Err(Error::InvalidInput(format!(
                "{} values cannot hold {members} members for {num_points} points",
                values.len()
            )));
        }
        Ok(Self {
            values,
            num_points,
            members,
        })
    }

    /// A deterministic field: one value per point.
    pub fn single(values: Vec<f64>) -> Self {
        let num_points = values.len();
        Self {
            values,
            num_points,
            members: 1,
        }
    }

    /// Interleaves one array per ensemble member into a point-major field.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if there are no members or the
    /// member arrays differ in length.
    pub fn from_members(members: &[Vec<f64>]) -> Result<Self> {
        let first = members
            .first()
            .ok_or_else(|| Error::InvalidInput("ensemble has no members".into()))?;
        let num_points = first.len();
        if let Some(m) = members.iter().position(|v| v.len() != num_points) {
            return Err(Error::InvalidInput(format!(
                "member {m} has {} values, member 0 has {num_points}",
                members[m].len()
            )));
        }
        let mut values = Vec::with_capacity(num_points * members.len());
        for p in 0..num_points {
            values.extend(members.iter().map(|v| v[p]));
        }
        Ok(Self {
            values,
            num_points,
            members: members.len(),
        })
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn members(&self) -> usize {
        self.members
    }

    /// All ensemble samples of `point`.
    #[inline]
    pub fn point(&self, point: usize) -> &[f64] {
        &self.values[point * self.members..(point + 1) * self.members]
    }
}

// ============================================================================
// Block layout
// ============================================================================

/// Partition of a structured grid into axis-aligned blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    grid: StructuredGrid,
    block_size: usize,
    blocks: [usize; 3],
}

impl BlockLayout {
    /// Lays out blocks of `block_size` points per active axis.
    ///
    /// Blocks per axis is `⌈dim / block_size⌉`; trailing blocks may be
    /// partially filled. Inactive axes (one point) always have one block.
    ///
    /// # Errors
    /// Returns [`Error::Config`] for a zero block size and
    /// [`Error::InvalidInput`] for a zero grid dimension.
    pub fn new(point_dims: [usize; 3], block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::Config("block size must be at least 1".into()));
        }
        let grid = StructuredGrid::new(point_dims)?;
        let blocks = point_dims.map(|d| d.div_ceil(block_size));
        Ok(Self {
            grid,
            block_size,
            blocks,
        })
    }

    pub fn grid(&self) -> &StructuredGrid {
        &self.grid
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn blocks_per_axis(&self) -> [usize; 3] {
        self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.iter().product()
    }

    /// Points in a full block: `block_size^dimension`.
    pub fn block_volume(&self) -> usize {
        self.block_size.pow(self.grid.dimension() as u32)
    }

    /// Ensures every active axis is a whole number of blocks.
    ///
    /// # Errors
    /// Returns [`Error::UnevenTiling`] otherwise.
    pub fn check_exact_tiling(&self) -> Result<()> {
        let dims = self.grid.point_dims();
        let uneven = dims
            .iter()
            .any(|&d| d > 1 && d % self.block_size != 0);
        if uneven {
            return Err(Error::UnevenTiling {
                dims,
                block_size: self.block_size,
            });
        }
        Ok(())
    }

    /// Flat block index of point `point`.
    #[inline]
    pub fn block_key(&self, point: usize) -> usize {
        let [x, y, z] = self.grid.point_coords(point);
        let s = self.block_size;
        let [nbx, nby, _] = self.blocks;
        x / s + (y / s) * nbx + (z / s) * nbx * nby
    }

    /// Block key for every entry of `point_ids`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if an id is outside the grid.
    pub fn create_keys(&self, point_ids: &[usize], backend: Backend) -> Result<Vec<usize>> {
        let n = self.grid.num_points();
        if let Some(&bad) = point_ids.iter().find(|&&p| p >= n) {
            return Err(Error::InvalidInput(format!(
                "point id {bad} outside grid of {n} points"
            )));
        }
        Ok(backend.map(point_ids.len(), |i| self.block_key(point_ids[i])))
    }

    /// The grid whose points are the blocks.
    pub fn reduced_grid(&self) -> Result<StructuredGrid> {
        StructuredGrid::new(self.blocks)
    }

    /// Placement of the reduced grid over the input grid's bounds.
    ///
    /// The reduced grid spans the same bounds: spacing is
    /// `extent / (blocks − 1)` per axis, or `block_size × input spacing`
    /// when an axis has a single block.
    pub fn reduced_geometry(&self, input: &UniformGeometry) -> UniformGeometry {
        let (lo, hi) = input.bounds(self.grid.point_dims());
        let mut spacing = [0.0; 3];
        for axis in 0..3 {
            spacing[axis] = if self.blocks[axis] > 1 {
                (hi[axis] - lo[axis]) / (self.blocks[axis] - 1) as f64
            } else {
                input.spacing[axis] * self.block_size as f64
            };
        }
        UniformGeometry {
            origin: lo,
            spacing,
        }
    }
}

// ============================================================================
// Reduce-by-key grouping
// ============================================================================

/// Indices grouped by key, in ascending index order within each group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGroups {
    offsets: Vec<usize>,
    members: Vec<usize>,
}

impl KeyGroups {
    /// Groups `0..keys.len()` by `keys[i]`, for keys in `0..num_keys`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidInput`] if a key is `>= num_keys`.
    pub fn new(keys: &[usize], num_keys: usize) -> Result<Self> {
        let mut offsets = vec![0usize; num_keys + 1];
        for &k in keys {
            if k >= num_keys {
                return Err(Error::InvalidInput(format!(
                    "key {k} outside 0..{num_keys}"
                )));
            }
            offsets[k + 1] += 1;
        }
        for k in 0..num_keys {
            offsets[k + 1] += offsets[k];
        }
        let mut cursor = offsets.clone();
        let mut members = vec![0usize; keys.len()];
        for (i, &k) in keys.iter().enumerate() {
            members[cursor[k]] = i;
            cursor[k] += 1;
        }
        Ok(Self { offsets, members })
    }

    pub fn num_groups(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Indices carrying key `key`.
    #[inline]
    pub fn group(&self, key: usize) -> &[usize] {
        &self.members[self.offsets[key]..self.offsets[key + 1]]
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// Summary built for each block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    MinMax,
    MeanStdev,
    MeanRaw,
}

impl Reduction {
    /// The summary a corner model consumes.
    pub fn for_model(model: CornerModel) -> Self {
        match model {
            CornerModel::Uniform => Reduction::MinMax,
            CornerModel::IndependentGaussian => Reduction::MeanStdev,
            CornerModel::Multivariate => Reduction::MeanRaw,
        }
    }
}

/// Aggregates the samples of every group of `groups` into one record.
///
/// `MeanRaw` copies a block's samples, point by point and member by member,
/// into a vector of exactly `expected_raw` values; a block holding any
/// other number of samples is a configuration error. Empty groups produce
/// NaN statistics.
///
/// # Errors
/// - [`Error::InvalidInput`] if a group references a point outside `field`.
/// - [`Error::RawCountMismatch`] under `MeanRaw` when a block's sample
///   count differs from `expected_raw`.
pub fn reduce(
    field: &EnsembleField,
    groups: &KeyGroups,
    reduction: Reduction,
    expected_raw: usize,
    backend: Backend,
) -> Result<SummaryField> {
    if let Some(&bad) = groups.members.iter().find(|&&p| p >= field.num_points()) {
        return Err(Error::InvalidInput(format!(
            "group references point {bad} but field has {} points",
            field.num_points()
        )));
    }
    let n = groups.num_groups();
    match reduction {
        Reduction::MinMax => {
            let pairs = backend.map(n, |key| {
                let mut lo = f64::NAN;
                let mut hi = f64::NAN;
                for &p in groups.group(key) {
                    if let Some((a, b)) = stats::min_max(field.point(p)) {
                        lo = lo.min(a);
                        hi = hi.max(b);
                    }
                }
                (lo, hi)
            });
            let (min, max): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            Ok(SummaryField::MinMax { min, max })
        }
        Reduction::MeanStdev => {
            let pairs = backend.map(n, |key| {
                let mut acc = WelfordAccumulator::new();
                for &p in groups.group(key) {
                    let mut point = WelfordAccumulator::new();
                    field.point(p).iter().for_each(|&x| point.update(x));
                    acc.merge(&point);
                }
                (
                    acc.mean().unwrap_or(f64::NAN),
                    acc.population_std_dev().unwrap_or(f64::NAN),
                )
            });
            let (mean, stdev): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            Ok(SummaryField::MeanStdev { mean, stdev })
        }
        Reduction::MeanRaw => {
            let members = field.members();
            if let Some(key) =
                (0..n).find(|&key| groups.group(key).len() * members != expected_raw)
            {
                return Err(Error::RawCountMismatch {
                    key,
                    expected: expected_raw,
                    actual: groups.group(key).len() * members,
                });
            }
            let blocks = backend.map(n, |key| {
                let mut raw = Vec::with_capacity(expected_raw);
                for &p in groups.group(key) {
                    raw.extend_from_slice(field.point(p));
                }
                (stats::mean(&raw).unwrap_or(f64::NAN), raw)
            });
            let mut mean = Vec::with_capacity(n);
            let mut raw = Vec::with_capacity(n * expected_raw);
            for (m, r) in blocks {
                mean.push(m);
                raw.extend(r);
            }
            Ok(SummaryField::MeanRaw {
                mean,
                raw,
                raw_len: expected_raw,
            })
        }
    }
}

/// Runs key creation, grouping and aggregation for `model` in one call.
///
/// # Errors
/// Propagates errors of the individual steps; also fails with
/// [`Error::InvalidInput`] if the field does not cover the layout's grid.
pub fn reduce_blocks(
    field: &EnsembleField,
    layout: &BlockLayout,
    model: CornerModel,
    backend: Backend,
) -> Result<SummaryField> {
    let n = layout.grid().num_points();
    if field.num_points() != n {
        return Err(Error::InvalidInput(format!(
            "field has {} points, grid has {n}",
            field.num_points()
        )));
    }
    let keys = {
        let _timer = Timed::info("extract key");
        let point_ids: Vec<usize> = (0..n).collect();
        layout.create_keys(&point_ids, backend)?
    };

    let _timer = Timed::info("reduce");
    let groups = {
        let _group_timer = Timed::debug("group keys");
        KeyGroups::new(&keys, layout.num_blocks())?
    };
    log::debug!(
        "reducing {n} points into {:?} blocks of size {}",
        layout.blocks_per_axis(),
        layout.block_size()
    );
    reduce(
        field,
        &groups,
        Reduction::for_model(model),
        layout.block_volume() * field.members(),
        backend,
    )
}

// ============================================================================
// Tests
// ============================================================================
