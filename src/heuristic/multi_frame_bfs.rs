//! Multi-frame BFS heuristic
//!
//! Two wavefronts over the occupancy grid: one seeded at the (offset) goal
//! pose and read at the state's projected point, one seeded at the goal
//! position of the planning link and read at the link's FK position. The
//! two cell costs are added.
//!
//! Admissibility holds under the assumption that every primitive moving the
//! planning link across k cells costs at least k times `cost_per_cell`.

use std::cell::Cell;
use std::rc::Rc;

use nalgebra::{Point3, Translation3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::common::{
    ForwardKinematics, GoalConstraint, HeuristicSpace, PlanningError, PlanningResult,
    RobotHeuristic, StateId, INFINITE_COST,
};
use crate::heuristic::wavefront::Wavefront;
use crate::utils::{GridGeometry, OccupancyGrid};

/// Configuration for the multi-frame BFS heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeuristicConfig {
    /// Cells whose obstacle distance is at most this radius are walls [m]
    pub inflation_radius: f64,
    pub cost_per_cell: i32,
    /// Offset of the primary anchor in the goal frame [m]
    pub offset: [f64; 3],
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            inflation_radius: 0.0,
            cost_per_cell: 1,
            offset: [0.0; 3],
        }
    }
}

pub struct MultiFrameBfsHeuristic {
    geometry: GridGeometry,
    fk: Rc<dyn ForwardKinematics>,
    config: HeuristicConfig,
    bfs: Wavefront,
    ee_bfs: Wavefront,
    /// Both wavefronts were run against the current walls
    ready: bool,
    warned_start: Cell<bool>,
    warned_from_to: Cell<bool>,
}

impl MultiFrameBfsHeuristic {
    pub fn new(grid: &OccupancyGrid, fk: Rc<dyn ForwardKinematics>, config: HeuristicConfig) -> Self {
        let mut heuristic = Self {
            geometry: grid.geometry().clone(),
            fk,
            config,
            bfs: Wavefront::new(grid.dims()),
            ee_bfs: Wavefront::new(grid.dims()),
            ready: false,
            warned_start: Cell::new(false),
            warned_from_to: Cell::new(false),
        };
        heuristic.rebuild_walls(grid);
        heuristic
    }

    pub fn config(&self) -> &HeuristicConfig {
        &self.config
    }

    pub fn set_offset(&mut self, x: f64, y: f64, z: f64) {
        self.config.offset = [x, y, z];
    }

    /// Takes effect on the next `sync_grid`
    pub fn set_inflation_radius(&mut self, radius: f64) {
        self.config.inflation_radius = radius;
    }

    pub fn set_cost_per_cell(&mut self, cost: i32) {
        self.config.cost_per_cell = cost;
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn wall_count(&self) -> usize {
        self.bfs.wall_count()
    }

    pub fn wavefront(&self) -> &Wavefront {
        &self.bfs
    }

    pub fn ee_wavefront(&self) -> &Wavefront {
        &self.ee_bfs
    }

    fn rebuild_walls(&mut self, grid: &OccupancyGrid) {
        self.geometry = grid.geometry().clone();
        self.bfs = Wavefront::new(grid.dims());
        self.ee_bfs = Wavefront::new(grid.dims());
        self.ready = false;

        let mut walls = 0;
        for cell in grid.geometry().cells() {
            if grid.distance(cell) <= self.config.inflation_radius {
                self.bfs.set_wall(cell);
                self.ee_bfs.set_wall(cell);
                walls += 1;
            }
        }
        let total = self.geometry.num_cells();
        debug!(
            "{}/{} ({:.3}%) walls in the bfs heuristic",
            walls,
            total,
            100.0 * walls as f64 / total as f64
        );
    }

    fn cell_cost(&self, bfs: &Wavefront, p: &Point3<f64>) -> i32 {
        let cell = self.geometry.world_to_grid(p);
        match bfs.distance(cell) {
            Some(d) => self.config.cost_per_cell.saturating_mul(d),
            None => INFINITE_COST,
        }
    }

    /// Primary wavefront distance to `p` in metres, infinite for walls,
    /// undiscovered and out-of-bounds cells
    pub fn metric_goal_distance(&self, p: &Point3<f64>) -> f64 {
        match self.bfs.distance(self.geometry.world_to_grid(p)) {
            Some(d) if self.ready => f64::from(d) * self.geometry.resolution,
            _ => f64::INFINITY,
        }
    }

    /// Manhattan distance in metres between the cells of `p` and of the
    /// projected start state
    pub fn metric_start_distance(&self, space: &dyn HeuristicSpace, p: &Point3<f64>) -> f64 {
        let Some(start) = space.start_state_id().and_then(|id| space.project_to_point(id)) else {
            return 0.0;
        };
        let s = self.geometry.world_to_grid(&start);
        let g = self.geometry.world_to_grid(p);
        let cells = (s.x - g.x).abs() + (s.y - g.y).abs() + (s.z - g.z).abs();
        f64::from(cells) * self.geometry.resolution
    }
}

impl RobotHeuristic for MultiFrameBfsHeuristic {
    fn update_goal(&mut self, goal: &GoalConstraint) -> PlanningResult<()> {
        let offset = goal.offset + Vector3::from(self.config.offset);
        let anchor = Point3::from((goal.pose * Translation3::from(offset)).translation.vector);
        let link_goal = goal.position();

        for p in [&anchor, &link_goal] {
            if !self.bfs.in_bounds(self.geometry.world_to_grid(p)) {
                error!("heuristic goal ({:.3}, {:.3}, {:.3}) is outside of the grid", p.x, p.y, p.z);
                return Err(PlanningError::OutOfBounds { x: p.x, y: p.y, z: p.z });
            }
        }

        let og = self.geometry.world_to_grid(&anchor);
        let plg = self.geometry.world_to_grid(&link_goal);
        debug!(
            "heuristic goals ({}, {}, {}), ({}, {}, {})",
            og.x, og.y, og.z, plg.x, plg.y, plg.z
        );
        self.bfs.run(og);
        self.ee_bfs.run(plg);
        self.ready = true;
        Ok(())
    }

    fn sync_grid(&mut self, grid: &OccupancyGrid) {
        self.rebuild_walls(grid);
    }

    fn goal_heuristic(&self, space: &dyn HeuristicSpace, state_id: StateId) -> i32 {
        if space.goal_state_id() == Some(state_id) || !self.ready {
            return 0;
        }

        let h_frame = space
            .project_to_point(state_id)
            .map_or(0, |p| self.cell_cost(&self.bfs, &p));

        let h_link = space
            .extract_state(state_id)
            .and_then(|state| self.fk.compute_fk(state))
            .map_or(0, |pose| {
                let p = Point3::from(pose.translation.vector);
                self.cell_cost(&self.ee_bfs, &p)
            });

        h_frame.saturating_add(h_link)
    }

    fn start_heuristic(&self, _space: &dyn HeuristicSpace, _state_id: StateId) -> i32 {
        if !self.warned_start.replace(true) {
            warn!("start heuristic is not supported by the multi-frame bfs heuristic");
        }
        0
    }

    fn from_to_heuristic(&self, space: &dyn HeuristicSpace, from_id: StateId, to_id: StateId) -> i32 {
        if space.goal_state_id() == Some(to_id) {
            return self.goal_heuristic(space, from_id);
        }
        if !self.warned_from_to.replace(true) {
            warn!("from-to heuristic is only supported towards the goal state");
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{pose_from_xyz_rpy, ExtractRobotState, PointProjection, Pose, RobotState};
    use crate::utils::GridCell;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Pose translation taken from the first three joint values
    struct PointRobot;

    impl ForwardKinematics for PointRobot {
        fn compute_fk(&self, state: &[f64]) -> Option<Pose> {
            Some(pose_from_xyz_rpy([state[0], state[1], state[2]], [0.0; 3]))
        }
    }

    /// States projected to fixed points; the FK point can differ from the
    /// projected point
    struct PointSpace {
        points: Vec<Point3<f64>>,
        states: Vec<RobotState>,
        start: Option<StateId>,
        goal: Option<StateId>,
    }

    impl PointSpace {
        fn new(start: Point3<f64>) -> Self {
            Self {
                points: vec![Point3::origin(), start],
                states: vec![vec![], vec![start.x, start.y, start.z]],
                start: Some(1),
                goal: Some(0),
            }
        }

        fn add(&mut self, projected: Point3<f64>, link: Point3<f64>) -> StateId {
            self.points.push(projected);
            self.states.push(vec![link.x, link.y, link.z]);
            self.points.len() - 1
        }
    }

    impl PointProjection for PointSpace {
        fn project_to_point(&self, state_id: StateId) -> Option<Point3<f64>> {
            self.points.get(state_id).copied()
        }
    }

    impl ExtractRobotState for PointSpace {
        fn extract_state(&self, state_id: StateId) -> Option<&RobotState> {
            if Some(state_id) == self.goal {
                return None;
            }
            self.states.get(state_id)
        }
    }

    impl HeuristicSpace for PointSpace {
        fn start_state_id(&self) -> Option<StateId> {
            self.start
        }

        fn goal_state_id(&self) -> Option<StateId> {
            self.goal
        }
    }

    /// 10 x 10 x 10 cells of 1 m
    fn unit_grid() -> OccupancyGrid {
        OccupancyGrid::new([10, 10, 10], 1.0, Point3::origin(), 3.0).unwrap()
    }

    fn goal_at(x: f64, y: f64, z: f64) -> GoalConstraint {
        GoalConstraint::new(pose_from_xyz_rpy([x, y, z], [0.0; 3]), [0.01; 6])
    }

    fn heuristic(grid: &OccupancyGrid, config: HeuristicConfig) -> MultiFrameBfsHeuristic {
        MultiFrameBfsHeuristic::new(grid, Rc::new(PointRobot), config)
    }

    #[test]
    fn test_empty_grid_scenario() {
        let grid = unit_grid();
        let mut h = heuristic(&grid, HeuristicConfig::default());
        assert_eq!(h.wall_count(), 0);
        h.update_goal(&goal_at(5.0, 5.0, 5.0)).unwrap();

        assert_eq!(h.wavefront().distance(GridCell::new(5, 5, 8)), Some(3));
        let mut space = PointSpace::new(Point3::new(0.0, 0.0, 0.0));
        let id = space.add(Point3::new(5.0, 5.0, 8.0), Point3::new(5.0, 5.0, 8.0));
        assert_eq!(h.goal_heuristic(&space, id), 6);
        assert_eq!(h.goal_heuristic(&space, 0), 0);
    }

    #[test]
    fn test_frames_read_different_points() {
        let grid = unit_grid();
        let config = HeuristicConfig {
            cost_per_cell: 10,
            offset: [0.0, 0.0, 1.0],
            ..Default::default()
        };
        let mut h = heuristic(&grid, config);
        h.update_goal(&goal_at(5.0, 5.0, 5.0)).unwrap();

        let mut space = PointSpace::new(Point3::origin());
        // anchor at (5, 5, 6): 2 cells; link goal at (5, 5, 5): 1 cell
        let id = space.add(Point3::new(5.0, 5.0, 8.0), Point3::new(6.0, 5.0, 5.0));
        assert_eq!(h.goal_heuristic(&space, id), 30);

        // goal-frame offsets add to the configured offset
        let goal = goal_at(5.0, 5.0, 5.0).with_offset(Vector3::new(0.0, 0.0, 1.0));
        h.update_goal(&goal).unwrap();
        assert_eq!(h.goal_heuristic(&space, id), 20);
    }

    #[test]
    fn test_not_ready_until_goal() {
        let grid = unit_grid();
        let mut h = heuristic(&grid, HeuristicConfig::default());
        let mut space = PointSpace::new(Point3::origin());
        let id = space.add(Point3::new(1.0, 1.0, 1.0), Point3::new(1.0, 1.0, 1.0));
        assert!(!h.is_ready());
        assert_eq!(h.goal_heuristic(&space, id), 0);
        assert!(h.metric_goal_distance(&Point3::new(1.0, 1.0, 1.0)).is_infinite());

        h.update_goal(&goal_at(1.0, 1.0, 4.0)).unwrap();
        assert_eq!(h.goal_heuristic(&space, id), 6);
        assert_eq!(h.metric_goal_distance(&Point3::new(1.0, 1.0, 1.0)), 3.0);

        h.sync_grid(&grid);
        assert!(!h.is_ready());
    }

    #[test]
    fn test_out_of_bounds_goal_keeps_previous_fields() {
        let grid = unit_grid();
        let mut h = heuristic(&grid, HeuristicConfig::default());
        h.update_goal(&goal_at(2.0, 2.0, 2.0)).unwrap();

        let result = h.update_goal(&goal_at(20.0, 2.0, 2.0));
        assert!(matches!(result, Err(PlanningError::OutOfBounds { .. })));
        assert!(h.is_ready());
        assert_eq!(h.wavefront().distance(GridCell::new(2, 2, 2)), Some(0));

        // anchor pushed outside of the grid by the offset
        h.set_offset(0.0, 0.0, -5.0);
        assert!(h.update_goal(&goal_at(2.0, 2.0, 2.0)).is_err());
    }

    #[test]
    fn test_walls_are_infinite() {
        let mut grid = unit_grid();
        grid.add_points(&[Point3::new(3.0, 3.0, 3.0)]);
        let mut h = heuristic(&grid, HeuristicConfig::default());
        assert_eq!(h.wall_count(), 1);
        h.update_goal(&goal_at(5.0, 5.0, 5.0)).unwrap();

        let mut space = PointSpace::new(Point3::origin());
        let blocked = space.add(Point3::new(3.0, 3.0, 3.0), Point3::new(5.0, 5.0, 5.0));
        assert_eq!(h.goal_heuristic(&space, blocked), INFINITE_COST);
        let outside = space.add(Point3::new(-4.0, 0.0, 0.0), Point3::new(5.0, 5.0, 5.0));
        assert_eq!(h.goal_heuristic(&space, outside), INFINITE_COST);
        assert!(h.metric_goal_distance(&Point3::new(3.0, 3.0, 3.0)).is_infinite());
    }

    #[test]
    fn test_goal_inside_inflated_obstacle() {
        let mut grid = unit_grid();
        grid.add_points(&[Point3::new(5.0, 5.0, 4.0)]);
        let config = HeuristicConfig {
            inflation_radius: 1.0,
            ..Default::default()
        };
        let mut h = heuristic(&grid, config);
        assert!(h.wavefront().is_wall(GridCell::new(5, 5, 5)));
        h.update_goal(&goal_at(5.0, 5.0, 5.0)).unwrap();

        assert_eq!(h.wavefront().distance(GridCell::new(5, 5, 5)), Some(0));
        assert_eq!(h.ee_wavefront().distance(GridCell::new(5, 5, 5)), Some(0));
        assert_eq!(h.wavefront().distance(GridCell::new(5, 5, 7)), Some(2));
        assert_eq!(h.metric_goal_distance(&Point3::new(5.0, 5.0, 5.0)), 0.0);

        let mut space = PointSpace::new(Point3::origin());
        let at_goal = space.add(Point3::new(5.0, 5.0, 5.0), Point3::new(5.0, 5.0, 5.0));
        assert_eq!(h.goal_heuristic(&space, at_goal), 0);
        let above = space.add(Point3::new(5.0, 5.0, 7.0), Point3::new(5.0, 5.0, 7.0));
        assert_eq!(h.goal_heuristic(&space, above), 4);
    }

    #[test]
    fn test_wall_count_grows_with_inflation() {
        let mut grid = unit_grid();
        grid.add_points(&[Point3::new(3.0, 3.0, 3.0), Point3::new(7.0, 6.0, 2.0)]);
        let mut h = heuristic(&grid, HeuristicConfig::default());
        let mut previous = h.wall_count();
        assert_eq!(previous, 2);
        for radius in [0.5, 1.0, 1.5, 2.0, 2.5] {
            h.set_inflation_radius(radius);
            h.sync_grid(&grid);
            assert!(h.wall_count() >= previous);
            previous = h.wall_count();
        }
        assert!(previous > 2);
    }

    #[test]
    fn test_admissible_against_relaxation() {
        let dims = [8, 8, 4];
        let mut grid = OccupancyGrid::new(dims, 1.0, Point3::origin(), 2.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let goal = GridCell::new(6, 6, 2);
        let obstacles: Vec<Point3<f64>> = grid
            .geometry()
            .cells()
            .filter(|&c| c != goal && rng.gen_bool(0.15))
            .map(|c| grid.grid_to_world(c))
            .collect();
        grid.add_points(&obstacles);

        let config = HeuristicConfig {
            cost_per_cell: 7,
            ..Default::default()
        };
        let mut h = heuristic(&grid, config);
        h.update_goal(&goal_at(6.0, 6.0, 2.0)).unwrap();

        // Bellman-Ford over the free cells with unit step cost
        let cells: Vec<GridCell> = grid.geometry().cells().collect();
        let free = |c: GridCell| grid.in_bounds(c) && !grid.is_occupied(c);
        let index = |c: GridCell| grid.geometry().index(c);
        let mut cost = vec![i32::MAX; cells.len()];
        if let Some(i) = index(goal) {
            cost[i] = 0;
        }
        let mut changed = true;
        while changed {
            changed = false;
            for &c in &cells {
                let Some(i) = index(c) else { continue };
                if !free(c) {
                    continue;
                }
                for n in c.neighbors() {
                    let Some(j) = index(n) else { continue };
                    if free(n) && cost[j] != i32::MAX && cost[j] + 1 < cost[i] {
                        cost[i] = cost[j] + 1;
                        changed = true;
                    }
                }
            }
        }

        let mut space = PointSpace::new(Point3::origin());
        for &c in &cells {
            let Some(i) = index(c) else { continue };
            if !free(c) || cost[i] == i32::MAX {
                continue;
            }
            let p = grid.grid_to_world(c);
            let id = space.add(p, p);
            let value = h.goal_heuristic(&space, id);
            // both frames sit on the same cell
            assert!(value <= 2 * 7 * cost[i], "{:?}: {} > {}", c, value, 2 * 7 * cost[i]);
            assert_eq!(h.wavefront().distance(c), Some(cost[i]));
        }
    }

    #[test]
    fn test_metric_start_distance() {
        let grid = unit_grid();
        let h = heuristic(&grid, HeuristicConfig::default());
        let space = PointSpace::new(Point3::new(1.0, 1.0, 1.0));
        assert_eq!(h.metric_start_distance(&space, &Point3::new(3.0, 0.0, 2.0)), 4.0);

        let no_start = PointSpace { start: None, ..PointSpace::new(Point3::origin()) };
        assert_eq!(h.metric_start_distance(&no_start, &Point3::new(3.0, 0.0, 2.0)), 0.0);
    }

    #[test]
    fn test_start_and_from_to() {
        let grid = unit_grid();
        let mut h = heuristic(&grid, HeuristicConfig::default());
        h.update_goal(&goal_at(5.0, 5.0, 5.0)).unwrap();
        let mut space = PointSpace::new(Point3::origin());
        let id = space.add(Point3::new(5.0, 5.0, 7.0), Point3::new(5.0, 5.0, 7.0));

        assert_eq!(h.start_heuristic(&space, id), 0);
        assert_eq!(h.start_heuristic(&space, id), 0);
        assert_eq!(h.from_to_heuristic(&space, id, 0), h.goal_heuristic(&space, id));
        assert_eq!(h.from_to_heuristic(&space, id, 1), 0);
    }

    #[test]
    fn test_deterministic() {
        let mut grid = unit_grid();
        grid.add_points(&[Point3::new(4.0, 5.0, 5.0), Point3::new(4.0, 4.0, 5.0)]);
        let mut a = heuristic(&grid, HeuristicConfig::default());
        let mut b = heuristic(&grid, HeuristicConfig::default());
        a.update_goal(&goal_at(2.0, 5.0, 5.0)).unwrap();
        b.update_goal(&goal_at(2.0, 5.0, 5.0)).unwrap();

        let mut space = PointSpace::new(Point3::origin());
        let id = space.add(Point3::new(8.0, 5.0, 5.0), Point3::new(7.0, 5.0, 5.0));
        assert_eq!(a.goal_heuristic(&space, id), b.goal_heuristic(&space, id));
        assert_eq!(a.goal_heuristic(&space, id), a.goal_heuristic(&space, id));
    }
}
