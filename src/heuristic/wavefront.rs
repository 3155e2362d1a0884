//! Wavefront
//!
//! Breadth-first distance field over a 3D grid. Each run floods outward
//! from one seed cell through the 26-connected neighbourhood, skipping wall
//! cells, and records the number of steps to every discovered cell.

use std::collections::VecDeque;

use crate::utils::GridCell;

/// Distance of a cell the last run did not reach
pub const UNDISCOVERED: i32 = -1;

#[derive(Debug, Clone)]
pub struct Wavefront {
    dims: [usize; 3],
    walls: Vec<bool>,
    distances: Vec<i32>,
    seed: Option<usize>,
}

impl Wavefront {
    pub fn new(dims: [usize; 3]) -> Self {
        let n = dims[0] * dims[1] * dims[2];
        Self {
            dims,
            walls: vec![false; n],
            distances: vec![UNDISCOVERED; n],
            seed: None,
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn in_bounds(&self, cell: GridCell) -> bool {
        cell.x >= 0
            && cell.y >= 0
            && cell.z >= 0
            && (cell.x as usize) < self.dims[0]
            && (cell.y as usize) < self.dims[1]
            && (cell.z as usize) < self.dims[2]
    }

    fn index(&self, cell: GridCell) -> Option<usize> {
        if !self.in_bounds(cell) {
            return None;
        }
        Some((cell.z as usize * self.dims[1] + cell.y as usize) * self.dims[0] + cell.x as usize)
    }

    /// Mark a cell as impassable. Out-of-bounds cells are ignored.
    pub fn set_wall(&mut self, cell: GridCell) {
        if let Some(i) = self.index(cell) {
            self.walls[i] = true;
        }
    }

    pub fn clear_walls(&mut self) {
        self.walls.iter_mut().for_each(|w| *w = false);
    }

    pub fn is_wall(&self, cell: GridCell) -> bool {
        self.index(cell).map_or(false, |i| self.walls[i])
    }

    pub fn wall_count(&self) -> usize {
        self.walls.iter().filter(|&&w| w).count()
    }

    pub fn is_undiscovered(&self, cell: GridCell) -> bool {
        self.index(cell).map_or(true, |i| self.distances[i] == UNDISCOVERED)
    }

    /// Steps from the last seed, or None for walls, undiscovered and
    /// out-of-bounds cells. The seed reads 0 even when it is a wall.
    pub fn distance(&self, cell: GridCell) -> Option<i32> {
        let i = self.index(cell)?;
        if self.seed == Some(i) {
            return Some(0);
        }
        if self.walls[i] || self.distances[i] == UNDISCOVERED {
            return None;
        }
        Some(self.distances[i])
    }

    /// Flood from `seed`. The seed itself is always discovered and expanded,
    /// even when it is a wall. Returns the number of discovered cells.
    pub fn run(&mut self, seed: GridCell) -> usize {
        self.distances.iter_mut().for_each(|d| *d = UNDISCOVERED);
        self.seed = self.index(seed);
        let Some(start) = self.seed else {
            return 0;
        };

        self.distances[start] = 0;
        let mut discovered = 1;
        let mut open = VecDeque::from([(seed, 0)]);
        while let Some((cell, d)) = open.pop_front() {
            for next in cell.neighbors() {
                let Some(i) = self.index(next) else {
                    continue;
                };
                if self.walls[i] || self.distances[i] != UNDISCOVERED {
                    continue;
                }
                self.distances[i] = d + 1;
                discovered += 1;
                open.push_back((next, d + 1));
            }
        }
        discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn cells(dims: [usize; 3]) -> Vec<GridCell> {
        let mut out = Vec::new();
        for z in 0..dims[2] as i32 {
            for y in 0..dims[1] as i32 {
                for x in 0..dims[0] as i32 {
                    out.push(GridCell::new(x, y, z));
                }
            }
        }
        out
    }

    #[test]
    fn test_empty_grid_distance() {
        let mut wf = Wavefront::new([10, 10, 10]);
        assert_eq!(wf.run(GridCell::new(5, 5, 5)), 1000);
        assert_eq!(wf.distance(GridCell::new(5, 5, 5)), Some(0));
        assert_eq!(wf.distance(GridCell::new(5, 5, 8)), Some(3));
        // diagonal steps count once
        assert_eq!(wf.distance(GridCell::new(8, 8, 8)), Some(3));
        assert_eq!(wf.distance(GridCell::new(0, 0, 0)), Some(5));
        assert_eq!(wf.distance(GridCell::new(10, 0, 0)), None);
    }

    #[test]
    fn test_walls_block_and_detour() {
        let mut wf = Wavefront::new([7, 7, 1]);
        // wall across x = 3 with a gap at y = 6
        for y in 0..6 {
            wf.set_wall(GridCell::new(3, y, 0));
        }
        assert_eq!(wf.wall_count(), 6);
        wf.run(GridCell::new(0, 0, 0));

        assert!(wf.is_wall(GridCell::new(3, 2, 0)));
        assert_eq!(wf.distance(GridCell::new(3, 2, 0)), None);
        // straight line would be 6; the detour through (3, 6) takes 6 steps up
        // then 3 across
        assert_eq!(wf.distance(GridCell::new(6, 0, 0)), Some(12));
        assert_eq!(wf.distance(GridCell::new(3, 6, 0)), Some(6));
    }

    #[test]
    fn test_enclosed_cells_stay_undiscovered() {
        let mut wf = Wavefront::new([5, 5, 5]);
        let inside = GridCell::new(2, 2, 2);
        for n in inside.neighbors().collect::<Vec<_>>() {
            wf.set_wall(n);
        }
        wf.run(GridCell::new(0, 0, 0));
        assert!(wf.is_undiscovered(inside));
        assert_eq!(wf.distance(inside), None);

        wf.clear_walls();
        wf.run(GridCell::new(0, 0, 0));
        assert_eq!(wf.distance(inside), Some(2));
    }

    #[test]
    fn test_seed_on_wall_is_discovered() {
        let mut wf = Wavefront::new([6, 6, 6]);
        let seed = GridCell::new(2, 2, 2);
        wf.set_wall(seed);
        wf.set_wall(GridCell::new(3, 2, 2));
        assert_eq!(wf.run(seed), 215);
        assert!(wf.is_wall(seed));
        assert_eq!(wf.distance(seed), Some(0));
        assert_eq!(wf.distance(GridCell::new(3, 2, 2)), None);
        assert_eq!(wf.distance(GridCell::new(4, 2, 2)), Some(2));

        // the old seed is a wall again once the wavefront moves on
        wf.run(GridCell::new(0, 0, 0));
        assert_eq!(wf.distance(seed), None);
    }

    #[test]
    fn test_out_of_bounds_seed() {
        let mut wf = Wavefront::new([3, 3, 3]);
        assert_eq!(wf.run(GridCell::new(-1, 0, 0)), 0);
        assert!(wf.is_undiscovered(GridCell::new(0, 0, 0)));
    }

    #[test]
    fn test_adjacent_distances_differ_by_at_most_one() {
        let dims = [8, 8, 8];
        let mut rng = StdRng::seed_from_u64(11);
        let mut wf = Wavefront::new(dims);
        let seed = GridCell::new(4, 4, 4);
        for cell in cells(dims) {
            if cell != seed && rng.gen_bool(0.2) {
                wf.set_wall(cell);
            }
        }
        wf.run(seed);
        assert_eq!(wf.distance(seed), Some(0));

        for a in cells(dims) {
            let Some(da) = wf.distance(a) else {
                continue;
            };
            for b in a.neighbors() {
                if let Some(db) = wf.distance(b) {
                    assert!((da - db).abs() <= 1, "{:?}={} {:?}={}", a, da, b, db);
                }
            }
        }
    }
}
