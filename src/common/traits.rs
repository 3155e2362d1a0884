//! Capability traits connecting the collision space, the lattice and the heuristic

use nalgebra::Point3;

use crate::common::error::PlanningResult;
use crate::common::types::*;
use crate::utils::OccupancyGrid;

/// Result of a single-state validity query
#[derive(Debug, Clone, PartialEq)]
pub struct StateValidity {
    pub valid: bool,
    /// Minimum clearance observed over the checked sphere pairs [m]
    pub dist: f64,
    /// First violation found, if any
    pub contact: Option<Contact>,
}

impl StateValidity {
    pub fn valid(dist: f64) -> Self {
        Self { valid: true, dist, contact: None }
    }

    pub fn invalid(dist: f64, contact: Contact) -> Self {
        Self { valid: false, dist, contact: Some(contact) }
    }
}

/// Description of what made a state invalid
#[derive(Debug, Clone, PartialEq)]
pub enum Contact {
    JointLimit { joint: String, value: f64 },
    Environment { link: String, sphere: String },
    SelfCollision { first: String, second: String },
}

/// Result of a path segment validity query
#[derive(Debug, Clone, PartialEq)]
pub struct PathValidity {
    pub valid: bool,
    /// Number of interpolated waypoints on the segment
    pub path_length: usize,
    /// Number of waypoints actually checked
    pub num_checks: usize,
    pub dist: f64,
}

/// Collision checker consumed by the lattice
pub trait CollisionChecker {
    fn is_state_valid(&mut self, angles: &[f64], verbose: bool) -> PlanningResult<StateValidity>;

    fn is_state_to_state_valid(
        &mut self,
        start: &[f64],
        end: &[f64],
    ) -> PlanningResult<PathValidity>;

    fn interpolate_path(
        &self,
        start: &[f64],
        end: &[f64],
        inc: &[f64],
    ) -> PlanningResult<Vec<RobotState>>;

    /// Obstacle grid the checker tests against, if it keeps one
    fn occupancy_grid(&self) -> Option<&OccupancyGrid> {
        None
    }
}

/// Joint metadata of the planning joints
pub trait RobotModel {
    fn joint_names(&self) -> &[String];

    fn joint_limits(&self, index: usize) -> Option<JointLimits>;

    fn check_joint_limits(&self, state: &[f64]) -> bool {
        state.len() == self.joint_names().len()
            && state
                .iter()
                .enumerate()
                .all(|(i, &v)| self.joint_limits(i).map_or(false, |l| l.contains(v)))
    }
}

/// Pose of the planning link for a joint configuration
pub trait ForwardKinematics {
    fn compute_fk(&self, state: &[f64]) -> Option<Pose>;
}

/// Manipulator whose joint configuration is fixed by a 6-DoF pose plus the
/// values of its redundant joints
pub trait RedundantManipulator: RobotModel + ForwardKinematics {
    /// Indices (into the planning joints) of the redundant joints
    fn redundant_joint_indices(&self) -> &[usize];

    /// Solve for a configuration reaching `pose` with the redundant joints
    /// held at `redundant`. `seed` biases the solution.
    fn compute_ik(&self, pose: &Pose, redundant: &[f64], seed: &[f64]) -> Option<RobotState>;
}

/// Projection of a lattice state to a single representative point
pub trait PointProjection {
    fn project_to_point(&self, state_id: StateId) -> Option<Point3<f64>>;
}

/// Access to the continuous joint configuration of a lattice state
pub trait ExtractRobotState {
    fn extract_state(&self, state_id: StateId) -> Option<&RobotState>;
}

/// View of a planning space that heuristics evaluate against
pub trait HeuristicSpace: PointProjection + ExtractRobotState {
    fn start_state_id(&self) -> Option<StateId>;
    fn goal_state_id(&self) -> Option<StateId>;
}

/// Heuristic over a planning space
pub trait RobotHeuristic {
    /// Must be called whenever the goal or the obstacle field changes
    fn update_goal(&mut self, goal: &GoalConstraint) -> PlanningResult<()>;

    /// Rebuild any obstacle model derived from `grid`. Takes effect on the
    /// next `update_goal`.
    fn sync_grid(&mut self, _grid: &OccupancyGrid) {}

    fn goal_heuristic(&self, space: &dyn HeuristicSpace, state_id: StateId) -> i32;

    fn start_heuristic(&self, space: &dyn HeuristicSpace, state_id: StateId) -> i32;

    fn from_to_heuristic(&self, space: &dyn HeuristicSpace, from_id: StateId, to_id: StateId)
        -> i32;
}

/// Graph interface consumed by a best-first search engine
pub trait PlanningSpace {
    fn start_state_id(&self) -> Option<StateId>;

    fn goal_state_id(&self) -> Option<StateId>;

    fn get_succs(&mut self, state_id: StateId) -> PlanningResult<Vec<Successor>>;

    /// Fails with `Unsupported` when `search_direction` is `Forward`
    fn get_preds(&mut self, state_id: StateId) -> PlanningResult<Vec<Successor>>;

    fn search_direction(&self) -> SearchDirection;

    fn goal_heuristic(&self, state_id: StateId) -> i32;
}
