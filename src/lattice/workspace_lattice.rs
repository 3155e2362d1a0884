//! Workspace lattice
//!
//! States are discretized poses of the planning link plus the redundant
//! joints. Successors are generated by applying motion primitives to the
//! coordinate, converting the resulting waypoints back to joint space with
//! IK and checking the joint-space segments with the collision checker.
//! States live in an arena and are addressed by their index; a separate
//! coordinate index guarantees one state per coordinate.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::rc::Rc;

use nalgebra::Point3;
use tracing::{debug, error, info, warn};

use crate::common::{
    pose_from_xyz_rpy, pose_to_xyz_rpy, CollisionChecker, ExtractRobotState, GoalConstraint,
    HeuristicSpace, PlanningError, PlanningResult, PlanningSpace, PointProjection,
    RedundantManipulator, RobotHeuristic, RobotState, SearchDirection, StateId, Successor,
    INFINITE_COST,
};
use crate::lattice::config::{MotionPrimitive, WorkspaceLatticeConfig};
use crate::lattice::state::{WorkspaceCoord, WorkspaceLatticeState};
use crate::utils::{normalize_angle, normalize_angle_positive, shortest_angle_dist};

/// Continuous workspace state: [x, y, z, roll, pitch, yaw, redundant...]
pub type WorkspaceState = Vec<f64>;

pub struct WorkspaceLattice<C: CollisionChecker> {
    robot: Rc<dyn RedundantManipulator>,
    checker: C,
    heuristic: Option<Box<dyn RobotHeuristic>>,
    config: WorkspaceLatticeConfig,
    primitives: Vec<MotionPrimitive>,
    direction: SearchDirection,
    /// Planning joint index of each redundant joint
    redundant: Vec<usize>,

    states: Vec<WorkspaceLatticeState>,
    coord_to_id: HashMap<WorkspaceCoord, StateId>,
    start_id: Option<StateId>,
    goal_id: StateId,
    goal: Option<GoalConstraint>,
    goal_ws: WorkspaceState,
    /// Bumped whenever heuristic values may change
    goal_epoch: u64,
    /// Revision of the checker's grid the heuristic was last synced with
    grid_revision: Option<u64>,
}

impl<C: CollisionChecker> WorkspaceLattice<C> {
    /// Build a lattice over `robot`. Fails when the robot has no planning
    /// joints or when the configuration does not match its redundant joints.
    pub fn new(
        robot: Rc<dyn RedundantManipulator>,
        checker: C,
        config: WorkspaceLatticeConfig,
    ) -> PlanningResult<Self> {
        let num_joints = robot.joint_names().len();
        if num_joints == 0 {
            return Err(PlanningError::invalid_config("robot has no planning joints"));
        }
        let redundant = robot.redundant_joint_indices().to_vec();
        if let Some(&bad) = redundant.iter().find(|&&i| i >= num_joints) {
            return Err(PlanningError::invalid_config(format!(
                "redundant joint index {} out of range for {} joints",
                bad, num_joints
            )));
        }
        config.validate(redundant.len())?;

        let primitives = config.motion_primitives();
        let direction = if primitives.iter().all(|p| primitives.contains(&p.inverse())) {
            SearchDirection::Bidirectional
        } else {
            SearchDirection::Forward
        };

        // the goal entry is never interned by coordinate
        let goal_entry = WorkspaceLatticeState::new(WorkspaceCoord::default(), RobotState::new());

        info!(
            "workspace lattice: {} joints, {} redundant, {} primitives ({:?})",
            num_joints,
            redundant.len(),
            primitives.len(),
            direction
        );

        let grid_revision = checker.occupancy_grid().map(|g| g.revision());
        Ok(Self {
            robot,
            checker,
            heuristic: None,
            config,
            primitives,
            direction,
            redundant,
            states: vec![goal_entry],
            coord_to_id: HashMap::new(),
            start_id: None,
            goal_id: 0,
            goal: None,
            goal_ws: WorkspaceState::new(),
            goal_epoch: 0,
            grid_revision,
        })
    }

    pub fn with_heuristic(mut self, heuristic: Box<dyn RobotHeuristic>) -> Self {
        self.heuristic = Some(heuristic);
        self
    }

    pub fn set_heuristic(&mut self, heuristic: Box<dyn RobotHeuristic>) -> PlanningResult<()> {
        self.heuristic = Some(heuristic);
        self.refresh_heuristic()
    }

    /// Recompute the heuristic for the current goal, e.g. after the
    /// obstacle field changed
    pub fn refresh_heuristic(&mut self) -> PlanningResult<()> {
        if let (Some(h), Some(goal)) = (self.heuristic.as_mut(), self.goal.as_ref()) {
            h.update_goal(goal)?;
        }
        self.goal_epoch += 1;
        Ok(())
    }

    pub fn checker(&self) -> &C {
        &self.checker
    }

    /// Mutate the collision checker, e.g. to add or move collision objects.
    /// The heuristic is rebuilt and recomputed when the obstacle grid
    /// changed, even when `f` fails part way.
    pub fn update_checker<R>(&mut self, f: impl FnOnce(&mut C) -> PlanningResult<R>) -> PlanningResult<R> {
        let result = f(&mut self.checker);
        let synced = self.sync_heuristic_if_changed();
        let value = result?;
        synced?;
        Ok(value)
    }

    fn sync_heuristic_if_changed(&mut self) -> PlanningResult<()> {
        let revision = self.checker.occupancy_grid().map(|g| g.revision());
        if revision == self.grid_revision {
            return Ok(());
        }
        debug!("obstacle grid changed, rebuilding the heuristic");
        self.sync_heuristic_grid()
    }

    /// Rebuild the heuristic's obstacle model from the checker's grid and
    /// recompute it for the current goal
    pub fn sync_heuristic_grid(&mut self) -> PlanningResult<()> {
        if let (Some(h), Some(grid)) = (self.heuristic.as_mut(), self.checker.occupancy_grid()) {
            h.sync_grid(grid);
        }
        self.grid_revision = self.checker.occupancy_grid().map(|g| g.revision());
        self.refresh_heuristic()
    }

    pub fn config(&self) -> &WorkspaceLatticeConfig {
        &self.config
    }

    pub fn primitives(&self) -> &[MotionPrimitive] {
        &self.primitives
    }

    pub fn goal(&self) -> Option<&GoalConstraint> {
        self.goal.as_ref()
    }

    /// Number of states created so far, including the goal entry
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, id: StateId) -> PlanningResult<&WorkspaceLatticeState> {
        self.states.get(id).ok_or(PlanningError::UnknownStateId(id))
    }

    /// Id of the state with `coord`, if it was discovered
    pub fn state_id(&self, coord: &WorkspaceCoord) -> Option<StateId> {
        self.coord_to_id.get(coord).copied()
    }

    pub fn print_state(&self, id: StateId) -> PlanningResult<()> {
        let state = self.state(id)?;
        if id == self.goal_id {
            debug!("state {} (goal): {}", id, state.coord);
        } else {
            debug!("state {}: {}", id, state);
        }
        Ok(())
    }

    // Discretization

    fn orientation_step(&self, axis: usize) -> f64 {
        TAU / self.config.orientation_bins[axis] as f64
    }

    fn redundant_is_continuous(&self, j: usize) -> bool {
        self.robot
            .joint_limits(self.redundant[j])
            .map_or(false, |l| l.continuous)
    }

    pub fn workspace_to_coord(&self, ws: &[f64]) -> WorkspaceCoord {
        let mut coord = Vec::with_capacity(ws.len());
        for i in 0..3 {
            coord.push((ws[i] / self.config.position_resolution[i]).round() as i32);
        }
        for i in 0..3 {
            let bins = self.config.orientation_bins[i];
            let bin = (normalize_angle_positive(ws[3 + i]) / self.orientation_step(i)).round() as usize % bins;
            coord.push(bin as i32);
        }
        for (j, v) in ws[6..].iter().enumerate() {
            let v = if self.redundant_is_continuous(j) { normalize_angle(*v) } else { *v };
            coord.push((v / self.config.redundant_resolution[j]).round() as i32);
        }
        WorkspaceCoord::new(coord)
    }

    /// Continuous workspace state at (possibly fractional) coordinates
    fn cells_to_workspace(&self, cells: &[f64]) -> WorkspaceState {
        let mut ws = Vec::with_capacity(cells.len());
        for i in 0..3 {
            ws.push(cells[i] * self.config.position_resolution[i]);
        }
        for i in 0..3 {
            ws.push(normalize_angle(cells[3 + i] * self.orientation_step(i)));
        }
        for (j, c) in cells[6..].iter().enumerate() {
            let v = c * self.config.redundant_resolution[j];
            ws.push(if self.redundant_is_continuous(j) { normalize_angle(v) } else { v });
        }
        ws
    }

    pub fn coord_to_workspace(&self, coord: &WorkspaceCoord) -> WorkspaceState {
        let cells: Vec<f64> = coord.values().iter().map(|&c| f64::from(c)).collect();
        self.cells_to_workspace(&cells)
    }

    pub fn state_to_workspace(&self, state: &[f64]) -> Option<WorkspaceState> {
        let pose = self.robot.compute_fk(state)?;
        let mut ws = pose_to_xyz_rpy(&pose).to_vec();
        ws.extend(self.redundant.iter().map(|&i| state[i]));
        Some(ws)
    }

    pub fn workspace_to_state(&self, ws: &[f64], seed: &[f64]) -> Option<RobotState> {
        let pose = pose_from_xyz_rpy([ws[0], ws[1], ws[2]], [ws[3], ws[4], ws[5]]);
        self.robot.compute_ik(&pose, &ws[6..], seed)
    }

    fn create_state(&mut self, coord: WorkspaceCoord, state: RobotState) -> StateId {
        if let Some(&id) = self.coord_to_id.get(&coord) {
            return id;
        }
        let id = self.states.len();
        self.coord_to_id.insert(coord.clone(), id);
        self.states.push(WorkspaceLatticeState::new(coord, state));
        id
    }

    // Start and goal

    pub fn set_start(&mut self, state: &[f64]) -> PlanningResult<StateId> {
        PlanningError::check_dimension(self.robot.joint_names().len(), state.len())?;
        if !self.robot.check_joint_limits(state) {
            warn!("start state violates joint limits: {:?}", state);
            return Err(PlanningError::InvalidStart("joint limits violated".to_string()));
        }
        let validity = self.checker.is_state_valid(state, true)?;
        if !validity.valid {
            warn!("start state is in collision: {:?}", validity.contact);
            return Err(PlanningError::InvalidStart(format!(
                "in collision ({:?})",
                validity.contact
            )));
        }
        let ws = self
            .state_to_workspace(state)
            .ok_or_else(|| PlanningError::InvalidStart("forward kinematics failed".to_string()))?;
        let coord = self.workspace_to_coord(&ws);
        let id = self.create_state(coord, state.to_vec());
        self.start_id = Some(id);
        debug!("start state {}: {}", id, self.states[id]);
        Ok(id)
    }

    pub fn set_goal(&mut self, goal: GoalConstraint) -> PlanningResult<()> {
        let num_joints = self.robot.joint_names().len();
        if let Some(joint_goal) = &goal.joint_goal {
            PlanningError::check_dimension(num_joints, joint_goal.angles.len())?;
            PlanningError::check_dimension(num_joints, joint_goal.tolerance.len())?;
        }

        let mut goal_ws = pose_to_xyz_rpy(&goal.pose).to_vec();
        match &goal.joint_goal {
            Some(joint_goal) => goal_ws.extend(self.redundant.iter().map(|&i| joint_goal.angles[i])),
            None => goal_ws.extend(std::iter::repeat(0.0).take(self.redundant.len())),
        }

        if let Some(h) = self.heuristic.as_mut() {
            h.update_goal(&goal)?;
        }

        let coord = self.workspace_to_coord(&goal_ws);
        info!("goal {} at {:?}", coord, &goal_ws[..6]);
        self.states[self.goal_id].coord = coord;
        self.goal_ws = goal_ws;
        self.goal = Some(goal);
        self.goal_epoch += 1;
        Ok(())
    }

    /// Whether a continuous state lies within the goal tolerances
    pub fn is_goal(&self, ws: &[f64], state: &[f64]) -> bool {
        let Some(goal) = &self.goal else {
            return false;
        };
        for i in 0..3 {
            if (ws[i] - self.goal_ws[i]).abs() > goal.tolerance[i] {
                return false;
            }
        }
        for i in 3..6 {
            if shortest_angle_dist(ws[i], self.goal_ws[i]) > goal.tolerance[i] {
                return false;
            }
        }
        if let Some(joint_goal) = &goal.joint_goal {
            for (i, (&value, (&target, &tol))) in state
                .iter()
                .zip(joint_goal.angles.iter().zip(&joint_goal.tolerance))
                .enumerate()
            {
                let d = self
                    .robot
                    .joint_limits(i)
                    .map_or((value - target).abs(), |l| l.distance(value, target));
                if d > tol {
                    return false;
                }
            }
        }
        true
    }

    // Actions

    /// Workspace waypoints of `prim` applied at `coord`, one per unit step
    fn action(&self, coord: &WorkspaceCoord, prim: &MotionPrimitive) -> Vec<WorkspaceState> {
        let steps = prim.steps().max(1);
        (1..=steps)
            .map(|k| {
                let t = k as f64 / steps as f64;
                let cells: Vec<f64> = coord
                    .values()
                    .iter()
                    .zip(prim.deltas())
                    .map(|(&c, d)| f64::from(c) + f64::from(d) * t)
                    .collect();
                self.cells_to_workspace(&cells)
            })
            .collect()
    }

    /// Convert each waypoint to joint space seeded by the previous one and
    /// check every joint-space segment. Returns the final configuration when
    /// the whole action is feasible.
    fn check_action(&mut self, state: &[f64], action: &[WorkspaceState]) -> PlanningResult<Option<RobotState>> {
        let mut prev = state.to_vec();
        for ws in action {
            let Some(next) = self.workspace_to_state(ws, &prev) else {
                return Ok(None);
            };
            if !self.robot.check_joint_limits(&next) {
                return Ok(None);
            }
            if !self.checker.is_state_to_state_valid(&prev, &next)?.valid {
                return Ok(None);
            }
            prev = next;
        }
        Ok(Some(prev))
    }

    /// Feasible outcomes of `prims` applied at `id`: (primitive index, final
    /// configuration, final workspace state)
    fn expand(
        &mut self,
        id: StateId,
        prims: &[MotionPrimitive],
    ) -> PlanningResult<Vec<(usize, RobotState, WorkspaceState)>> {
        let parent = self.state(id)?.clone();
        let mut outcomes = Vec::new();
        for (i, prim) in prims.iter().enumerate() {
            let action = self.action(&parent.coord, prim);
            let Some(last) = self.check_action(&parent.state, &action)? else {
                continue;
            };
            let Some(ws) = self.state_to_workspace(&last) else {
                continue;
            };
            outcomes.push((i, last, ws));
        }
        Ok(outcomes)
    }

    /// Outcomes of `prims` at `id` as edges. With `to_goal`, outcomes inside
    /// the goal region are reported as the goal state.
    fn successors_of(
        &mut self,
        id: StateId,
        prims: &[MotionPrimitive],
        to_goal: bool,
    ) -> PlanningResult<Vec<Successor>> {
        // the goal region is terminal
        if id == self.goal_id {
            return Ok(Vec::new());
        }
        let outcomes = self.expand(id, prims)?;
        let mut succs = Vec::with_capacity(outcomes.len());
        for (i, state, ws) in outcomes {
            let succ_id = if to_goal && self.is_goal(&ws, &state) {
                self.goal_id
            } else {
                let coord = self.workspace_to_coord(&ws);
                self.create_state(coord, state)
            };
            succs.push(Successor::new(succ_id, prims[i].cost));
        }
        Ok(succs)
    }

    /// Continuous configurations along a sequence of state ids. The goal id
    /// is resolved to the cheapest goal-reaching action of its predecessor.
    pub fn extract_path(&mut self, ids: &[StateId]) -> PlanningResult<Vec<RobotState>> {
        let mut path = Vec::with_capacity(ids.len());
        for (i, &id) in ids.iter().enumerate() {
            if id != self.goal_id {
                path.push(self.state(id)?.state.clone());
                continue;
            }
            let Some(&prev) = i.checked_sub(1).and_then(|p| ids.get(p)) else {
                return Err(PlanningError::PathExtraction("path starts at the goal".to_string()));
            };
            let prims = self.primitives.clone();
            let best = self
                .expand(prev, &prims)?
                .into_iter()
                .filter(|(_, state, ws)| self.is_goal(ws, state))
                .min_by_key(|(p, _, _)| prims[*p].cost);
            match best {
                Some((_, state, _)) => path.push(state),
                None => {
                    return Err(PlanningError::PathExtraction(format!(
                        "no action of state {} reaches the goal",
                        prev
                    )))
                }
            }
        }
        Ok(path)
    }
}

impl<C: CollisionChecker> PointProjection for WorkspaceLattice<C> {
    fn project_to_point(&self, state_id: StateId) -> Option<Point3<f64>> {
        if state_id == self.goal_id {
            return self.goal.as_ref().map(|g| g.position());
        }
        let ws = self.coord_to_workspace(&self.states.get(state_id)?.coord);
        Some(Point3::new(ws[0], ws[1], ws[2]))
    }
}

impl<C: CollisionChecker> ExtractRobotState for WorkspaceLattice<C> {
    fn extract_state(&self, state_id: StateId) -> Option<&RobotState> {
        if state_id == self.goal_id {
            return None;
        }
        self.states.get(state_id).map(|s| &s.state)
    }
}

impl<C: CollisionChecker> HeuristicSpace for WorkspaceLattice<C> {
    fn start_state_id(&self) -> Option<StateId> {
        self.start_id
    }

    fn goal_state_id(&self) -> Option<StateId> {
        self.goal.as_ref().map(|_| self.goal_id)
    }
}

impl<C: CollisionChecker> PlanningSpace for WorkspaceLattice<C> {
    fn start_state_id(&self) -> Option<StateId> {
        self.start_id
    }

    fn goal_state_id(&self) -> Option<StateId> {
        self.goal.as_ref().map(|_| self.goal_id)
    }

    fn get_succs(&mut self, state_id: StateId) -> PlanningResult<Vec<Successor>> {
        let prims = self.primitives.clone();
        let succs = self.successors_of(state_id, &prims, true)?;
        debug!("state {}: {} successors", state_id, succs.len());
        Ok(succs)
    }

    /// Predecessors are the outcomes of the inverse primitives. The primitive
    /// set is closed under inversion, so each reported edge is a primitive
    /// of the same cost leading back into `state_id`. The goal has no
    /// outgoing edges and is never a predecessor.
    fn get_preds(&mut self, state_id: StateId) -> PlanningResult<Vec<Successor>> {
        if self.direction == SearchDirection::Forward {
            return Err(PlanningError::unsupported(
                "predecessors need a primitive set closed under inversion",
            ));
        }
        if state_id == self.goal_id {
            return Err(PlanningError::unsupported("predecessors of the goal region"));
        }
        let inverses: Vec<MotionPrimitive> = self.primitives.iter().map(|p| p.inverse()).collect();
        self.successors_of(state_id, &inverses, false)
    }

    fn search_direction(&self) -> SearchDirection {
        self.direction
    }

    fn goal_heuristic(&self, state_id: StateId) -> i32 {
        if state_id == self.goal_id {
            return 0;
        }
        let Some(state) = self.states.get(state_id) else {
            error!("heuristic requested for unknown state {}", state_id);
            return INFINITE_COST;
        };
        let Some(h) = self.heuristic.as_ref() else {
            return 0;
        };
        if let Some(value) = state.cached_heuristic(self.goal_epoch) {
            return value;
        }
        let value = h.goal_heuristic(self, state_id);
        state.cache_heuristic(self.goal_epoch, value);
        value
    }
}
