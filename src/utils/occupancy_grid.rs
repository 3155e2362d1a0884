//! Occupancy grid with a precomputed distance field
//!
//! Dense 3D voxel grid over the planning volume. Obstacle voxels are
//! reference counted so that overlapping collision objects can be added and
//! removed independently, and a brushfire propagation keeps a per-cell
//! distance to the nearest obstacle cell so that sphere checks are a
//! single lookup.

use std::collections::VecDeque;

use nalgebra::Point3;
use tracing::debug;

use crate::common::{PlanningError, PlanningResult};

/// Integer cell coordinate of a 3D grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridCell {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Euclidean distance in cells
    pub fn distance(&self, other: &GridCell) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        let dz = f64::from(self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// The 26 cells sharing a face, edge or corner with this one
    pub fn neighbors(&self) -> impl Iterator<Item = GridCell> + '_ {
        (-1..=1).flat_map(move |dx| {
            (-1..=1).flat_map(move |dy| {
                (-1..=1)
                    .filter(move |&dz| dx != 0 || dy != 0 || dz != 0)
                    .map(move |dz| self.offset(dx, dy, dz))
            })
        })
    }
}

/// Size, resolution and placement of a 3D grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridGeometry {
    pub dims: [usize; 3],
    pub resolution: f64,
    /// World position of the centre of cell (0, 0, 0)
    pub origin: Point3<f64>,
}

impl GridGeometry {
    pub fn new(dims: [usize; 3], resolution: f64, origin: Point3<f64>) -> PlanningResult<Self> {
        if resolution <= 0.0 || !resolution.is_finite() {
            return Err(PlanningError::invalid_config(format!(
                "grid resolution must be positive, got {}",
                resolution
            )));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(PlanningError::invalid_config("grid dimensions must be non-zero"));
        }
        if dims.iter().any(|&d| d > i32::MAX as usize) {
            return Err(PlanningError::invalid_config("grid dimensions overflow cell indices"));
        }
        Ok(Self { dims, resolution, origin })
    }

    pub fn num_cells(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn world_to_grid(&self, p: &Point3<f64>) -> GridCell {
        let rel = (p - self.origin) / self.resolution;
        GridCell::new(rel.x.round() as i32, rel.y.round() as i32, rel.z.round() as i32)
    }

    pub fn grid_to_world(&self, cell: GridCell) -> Point3<f64> {
        Point3::new(
            self.origin.x + f64::from(cell.x) * self.resolution,
            self.origin.y + f64::from(cell.y) * self.resolution,
            self.origin.z + f64::from(cell.z) * self.resolution,
        )
    }

    pub fn in_bounds(&self, cell: GridCell) -> bool {
        cell.x >= 0
            && cell.y >= 0
            && cell.z >= 0
            && (cell.x as usize) < self.dims[0]
            && (cell.y as usize) < self.dims[1]
            && (cell.z as usize) < self.dims[2]
    }

    pub fn index(&self, cell: GridCell) -> Option<usize> {
        if !self.in_bounds(cell) {
            return None;
        }
        Some((cell.z as usize * self.dims[1] + cell.y as usize) * self.dims[0] + cell.x as usize)
    }

    pub fn cells(&self) -> impl Iterator<Item = GridCell> + '_ {
        let [nx, ny, nz] = self.dims;
        (0..nz).flat_map(move |z| {
            (0..ny).flat_map(move |y| {
                (0..nx).map(move |x| GridCell::new(x as i32, y as i32, z as i32))
            })
        })
    }
}

/// Occupancy grid with a distance-to-nearest-obstacle field
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    geometry: GridGeometry,
    reference_frame: String,
    max_distance: f64,
    occupancy: Vec<u32>,
    distances: Vec<f64>,
    /// Bumped on every change of the distance field
    revision: u64,
}

impl OccupancyGrid {
    /// Create an empty grid. Distances are capped at `max_distance` [m].
    pub fn new(
        dims: [usize; 3],
        resolution: f64,
        origin: Point3<f64>,
        max_distance: f64,
    ) -> PlanningResult<Self> {
        let geometry = GridGeometry::new(dims, resolution, origin)?;
        if max_distance <= 0.0 {
            return Err(PlanningError::invalid_config("max_distance must be positive"));
        }
        let n = geometry.num_cells();
        Ok(Self {
            geometry,
            reference_frame: "map".to_string(),
            max_distance,
            occupancy: vec![0; n],
            distances: vec![max_distance; n],
            revision: 0,
        })
    }

    pub fn with_reference_frame(mut self, frame: &str) -> Self {
        self.reference_frame = frame.to_string();
        self
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn dims(&self) -> [usize; 3] {
        self.geometry.dims
    }

    pub fn resolution(&self) -> f64 {
        self.geometry.resolution
    }

    pub fn reference_frame(&self) -> &str {
        &self.reference_frame
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn world_to_grid(&self, p: &Point3<f64>) -> GridCell {
        self.geometry.world_to_grid(p)
    }

    pub fn grid_to_world(&self, cell: GridCell) -> Point3<f64> {
        self.geometry.grid_to_world(cell)
    }

    pub fn in_bounds(&self, cell: GridCell) -> bool {
        self.geometry.in_bounds(cell)
    }

    pub fn is_occupied(&self, cell: GridCell) -> bool {
        self.geometry
            .index(cell)
            .map_or(false, |i| self.occupancy[i] > 0)
    }

    pub fn occupied_count(&self) -> usize {
        self.occupancy.iter().filter(|&&c| c > 0).count()
    }

    /// Distance [m] from the cell centre to the nearest obstacle cell centre.
    /// Cells outside of the grid report zero.
    pub fn distance(&self, cell: GridCell) -> f64 {
        self.geometry.index(cell).map_or(0.0, |i| self.distances[i])
    }

    pub fn distance_at(&self, p: &Point3<f64>) -> f64 {
        self.distance(self.world_to_grid(p))
    }

    /// Mark the cells containing `points` as occupied. Returns the number of
    /// points that fell inside of the grid.
    pub fn add_points(&mut self, points: &[Point3<f64>]) -> usize {
        let mut added = 0;
        for p in points {
            if let Some(i) = self.geometry.index(self.geometry.world_to_grid(p)) {
                self.occupancy[i] += 1;
                added += 1;
            }
        }
        self.update_distance_field();
        added
    }

    /// Release one reference on the cells containing `points`
    pub fn remove_points(&mut self, points: &[Point3<f64>]) -> usize {
        let mut removed = 0;
        for p in points {
            if let Some(i) = self.geometry.index(self.geometry.world_to_grid(p)) {
                if self.occupancy[i] > 0 {
                    self.occupancy[i] -= 1;
                    removed += 1;
                }
            }
        }
        self.update_distance_field();
        removed
    }

    pub fn reset(&mut self) {
        self.occupancy.iter_mut().for_each(|c| *c = 0);
        self.distances.iter_mut().for_each(|d| *d = self.max_distance);
        self.revision += 1;
    }

    /// Overwrite the distance stored for one cell
    #[cfg(test)]
    pub(crate) fn set_distance(&mut self, cell: GridCell, distance: f64) {
        if let Some(i) = self.geometry.index(cell) {
            self.distances[i] = distance;
            self.revision += 1;
        }
    }

    /// Brushfire propagation of the nearest obstacle cell from every
    /// occupied cell outwards.
    fn update_distance_field(&mut self) {
        let n = self.geometry.num_cells();
        let res = self.geometry.resolution;
        let mut nearest: Vec<Option<GridCell>> = vec![None; n];
        let mut queue = VecDeque::new();

        self.distances.iter_mut().for_each(|d| *d = self.max_distance);
        self.revision += 1;
        for cell in self.geometry.cells() {
            if let Some(i) = self.geometry.index(cell) {
                if self.occupancy[i] > 0 {
                    self.distances[i] = 0.0;
                    nearest[i] = Some(cell);
                    queue.push_back(cell);
                }
            }
        }

        while let Some(cell) = queue.pop_front() {
            let Some(source) = self.geometry.index(cell).and_then(|i| nearest[i]) else {
                continue;
            };
            for next in cell.neighbors() {
                let Some(j) = self.geometry.index(next) else {
                    continue;
                };
                let d = next.distance(&source) * res;
                if d < self.distances[j] && d < self.max_distance {
                    self.distances[j] = d;
                    nearest[j] = Some(source);
                    queue.push_back(next);
                }
            }
        }

        debug!(
            "updated distance field: {} occupied cells of {}",
            self.occupied_count(),
            n
        );
    }
}
