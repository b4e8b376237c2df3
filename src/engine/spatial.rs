// Spatial hash grid: the broad phase for avoidance and overlap queries.
//
// Cells are keyed by an integer hash of floor(position / cell_size). The grid
// is rebuilt from scratch every tick; there is no incremental update path.
// Distinct cells may share a hash, so every query result is a superset and
// callers must distance-filter.

use bevy_ecs::prelude::*;
use glam::{IVec3, Vec3};
use hashbrown::{HashMap, HashSet};
use rayon::prelude::*;

use super::error::{KernelError, KernelResult};

/// One grid record. Agents and obstacles share the layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridEntry {
    pub position: Vec3,
    pub entity: Entity,
    pub radius: f32,
    /// Repulsion strength this entry exerts on its neighbours.
    pub weight: f32,
    pub is_obstacle: bool,
}

/// Integer cell containing `position`.
#[inline]
pub fn cell_of(position: Vec3, cell_size: f32) -> IVec3 {
    (position / cell_size).floor().as_ivec3()
}

/// Spatial hash of a cell coordinate (Teschner et al. primes).
#[inline]
pub fn cell_hash(cell: IVec3) -> u32 {
    (cell.x as u32).wrapping_mul(73_856_093)
        ^ (cell.y as u32).wrapping_mul(19_349_663)
        ^ (cell.z as u32).wrapping_mul(83_492_791)
}

/// Hashes of the 3×3×3 block around `cell`, in a fixed order, with repeated
/// hashes dropped so a colliding pair of cells is not visited twice.
pub fn neighborhood_hashes(cell: IVec3) -> ([u32; 27], usize) {
    let mut hashes = [0u32; 27];
    let mut count = 0;
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let h = cell_hash(cell + IVec3::new(dx, dy, dz));
                if !hashes[..count].contains(&h) {
                    hashes[count] = h;
                    count += 1;
                }
            }
        }
    }
    (hashes, count)
}

// ============================================================================
// GRID
// ============================================================================

#[derive(Resource, Debug, Clone)]
pub struct SpatialHashGrid {
    cells: HashMap<u32, Vec<GridEntry>>,
    cell_size: f32,
    len: usize,
    /// Largest entry radius stored, for widening overlap queries.
    max_radius: f32,
}

impl SpatialHashGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cells: HashMap::new(),
            cell_size,
            len: 0,
            max_radius: 0.0,
        }
    }

    /// Build a grid from `entries` in one pass.
    ///
    /// Cell keys are computed in parallel and the keyed records are sorted by
    /// (hash, entity) before bucketing, so bucket contents do not depend on
    /// input order or thread interleaving.
    pub fn build(cell_size: f32, entries: &[GridEntry], max_entries: usize) -> KernelResult<Self> {
        let requested = entries.len();
        if requested > max_entries {
            return Err(KernelError::GridCapacity {
                requested,
                limit: max_entries,
            });
        }

        let mut keyed: Vec<(u32, GridEntry)> = Vec::new();
        keyed
            .try_reserve_exact(requested)
            .map_err(|_| KernelError::GridAllocation { requested })?;
        entries
            .par_iter()
            .map(|e| (cell_hash(cell_of(e.position, cell_size)), *e))
            .collect_into_vec(&mut keyed);
        keyed.par_sort_unstable_by(|a, b| a.0.cmp(&b.0).then(a.1.entity.cmp(&b.1.entity)));

        let mut cells: HashMap<u32, Vec<GridEntry>> = HashMap::new();
        let buckets = keyed.chunk_by(|a, b| a.0 == b.0);
        cells
            .try_reserve(buckets.clone().count())
            .map_err(|_| KernelError::GridAllocation { requested })?;
        for run in buckets {
            let mut bucket = Vec::new();
            bucket
                .try_reserve_exact(run.len())
                .map_err(|_| KernelError::GridAllocation { requested })?;
            bucket.extend(run.iter().map(|(_, e)| *e));
            cells.insert(run[0].0, bucket);
        }

        let max_radius = entries.iter().fold(0.0f32, |m, e| m.max(e.radius));
        Ok(Self {
            cells,
            cell_size,
            len: requested,
            max_radius,
        })
    }

    /// Remove all entries but keep the allocation.
    pub fn clear(&mut self) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
        self.len = 0;
        self.max_radius = 0.0;
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Every entry stored under the 27 cells around `position`.
    ///
    /// Broad phase only: no distance filtering happens here.
    pub fn query_neighborhood(&self, position: Vec3) -> impl Iterator<Item = &GridEntry> + '_ {
        let (hashes, count) = neighborhood_hashes(cell_of(position, self.cell_size));
        (0..count).flat_map(move |i| self.cells.get(&hashes[i]).into_iter().flatten())
    }

    /// Append to `out` every entry in cells that could hold a point within
    /// `radius` of `position`.
    ///
    /// Returns a superset; callers must distance-filter. Does not clear `out`.
    /// Falls back to a full scan when the cell block is larger than the number
    /// of occupied buckets.
    pub fn query_radius(&self, position: Vec3, radius: f32, out: &mut Vec<GridEntry>) {
        let r_cells = (radius.max(0.0) / self.cell_size).ceil() as i64;
        let side = r_cells.saturating_mul(2).saturating_add(1);
        if side.saturating_mul(side).saturating_mul(side) > self.cells.len() as i64 {
            for bucket in self.cells.values() {
                out.extend_from_slice(bucket);
            }
            return;
        }

        let r = r_cells as i32;
        let center = cell_of(position, self.cell_size);
        let mut seen: HashSet<u32> = HashSet::new();
        for dz in -r..=r {
            for dy in -r..=r {
                for dx in -r..=r {
                    let h = cell_hash(center + IVec3::new(dx, dy, dz));
                    if !seen.insert(h) {
                        continue;
                    }
                    if let Some(bucket) = self.cells.get(&h) {
                        out.extend_from_slice(bucket);
                    }
                }
            }
        }
    }
}

impl Default for SpatialHashGrid {
    fn default() -> Self {
        Self::new(super::config::DEFAULT_CELL_SIZE)
    }
}

// ============================================================================
// OVERLAP QUERIES
// ============================================================================

/// Narrow-phase overlap service: "entries whose sphere touches the sphere of
/// `radius` around `point`".
pub trait OverlapQuery {
    fn overlap_sphere(&self, point: Vec3, radius: f32, out: &mut Vec<GridEntry>);
}

impl OverlapQuery for SpatialHashGrid {
    fn overlap_sphere(&self, point: Vec3, radius: f32, out: &mut Vec<GridEntry>) {
        let start = out.len();
        self.query_radius(point, radius + self.max_radius, out);
        let mut i = start;
        while i < out.len() {
            let e = out[i];
            let reach = radius + e.radius;
            if e.position.distance_squared(point) <= reach * reach {
                i += 1;
            } else {
                out.swap_remove(i);
            }
        }
    }
}
