//! Robot model over a serial chain with redundant joints
//!
//! Forward kinematics composes the chain transforms; inverse kinematics is a
//! damped least squares solve over the non-redundant joints with the
//! redundant joints held fixed, followed by seeded random restarts.

use nalgebra::{DMatrix, DVector, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::common::{
    ForwardKinematics, JointLimits, PlanningError, PlanningResult, Pose, RedundantManipulator,
    RobotModel, RobotState,
};
use crate::robot::chain::KinematicChain;
use crate::robot::description::RobotDescription;
use crate::utils::normalize_angle;

/// Parameters of the numerical IK solver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IkConfig {
    pub max_iterations: usize,
    /// Convergence threshold on position error [m]
    pub position_tolerance: f64,
    /// Convergence threshold on orientation error [rad]
    pub orientation_tolerance: f64,
    /// Damping factor of the least squares step
    pub damping: f64,
    /// Random restarts after the seeded attempt fails
    pub restarts: usize,
    pub rng_seed: u64,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            position_tolerance: 1e-6,
            orientation_tolerance: 1e-6,
            damping: 1e-3,
            restarts: 5,
            rng_seed: 42,
        }
    }
}

/// Planning model of a serial chain whose tip link is the planning link
#[derive(Debug, Clone)]
pub struct ChainRobotModel {
    chain: KinematicChain,
    joint_names: Vec<String>,
    limits: Vec<JointLimits>,
    /// Segment index of each planning joint
    segment_of_joint: Vec<usize>,
    redundant: Vec<usize>,
    ik: IkConfig,
}

impl ChainRobotModel {
    /// Model of the chain `root` → `tip`; `redundant_joints` name the
    /// planning joints treated as free parameters by IK.
    pub fn new(
        description: &RobotDescription,
        root: &str,
        tip: &str,
        redundant_joints: &[&str],
    ) -> PlanningResult<Self> {
        let chain = description.chain(root, tip)?;
        let joint_names = chain.movable_joint_names();
        if joint_names.is_empty() {
            return Err(PlanningError::invalid_config(format!(
                "chain '{}' -> '{}' has no movable joints",
                root, tip
            )));
        }

        let mut limits = Vec::with_capacity(joint_names.len());
        let mut segment_of_joint = Vec::with_capacity(joint_names.len());
        for name in &joint_names {
            let index = chain
                .segment_index(name)
                .ok_or_else(|| PlanningError::UnknownJoint(name.clone()))?;
            let segment_limits = chain.segments()[index]
                .limits()
                .ok_or_else(|| PlanningError::UnknownJoint(name.clone()))?;
            limits.push(segment_limits);
            segment_of_joint.push(index);
        }

        let redundant = redundant_joints
            .iter()
            .map(|r| {
                joint_names
                    .iter()
                    .position(|n| n == r)
                    .ok_or_else(|| PlanningError::UnknownJoint(r.to_string()))
            })
            .collect::<PlanningResult<Vec<usize>>>()?;

        Ok(Self {
            chain,
            joint_names,
            limits,
            segment_of_joint,
            redundant,
            ik: IkConfig::default(),
        })
    }

    pub fn with_ik_config(mut self, ik: IkConfig) -> Self {
        self.ik = ik;
        self
    }

    pub fn chain(&self) -> &KinematicChain {
        &self.chain
    }

    pub fn planning_link(&self) -> &str {
        self.chain.tip()
    }

    fn segment_values(&self, state: &[f64]) -> Vec<f64> {
        let mut values = vec![0.0; self.chain.segments().len()];
        for (i, &segment) in self.segment_of_joint.iter().enumerate() {
            values[segment] = state[i];
        }
        values
    }

    fn tip_pose(&self, state: &[f64]) -> Pose {
        self.chain.tip_transform(&self.segment_values(state))
    }

    /// 6-vector of [position error; orientation error] from `current` to `target`
    fn pose_error(current: &Pose, target: &Pose) -> (Vector3<f64>, Vector3<f64>) {
        let dp = target.translation.vector - current.translation.vector;
        let dr = (target.rotation * current.rotation.inverse()).scaled_axis();
        (dp, dr)
    }

    fn clamp_to_limits(&self, q: &mut [f64]) {
        for (value, limits) in q.iter_mut().zip(&self.limits) {
            if limits.continuous {
                *value = normalize_angle(*value);
            } else {
                *value = value.clamp(limits.min, limits.max);
            }
        }
    }

    fn solve_from(&self, target: &Pose, start: RobotState, free: &[usize]) -> Option<RobotState> {
        let mut q = start;
        let h = 1e-7;
        let lambda2 = self.ik.damping * self.ik.damping;

        for _ in 0..self.ik.max_iterations {
            let current = self.tip_pose(&q);
            let (dp, dr) = Self::pose_error(&current, target);
            if dp.norm() < self.ik.position_tolerance && dr.norm() < self.ik.orientation_tolerance {
                return Some(q);
            }

            let error = DVector::from_iterator(6, dp.iter().chain(dr.iter()).copied());
            let mut jacobian = DMatrix::zeros(6, free.len());
            for (col, &j) in free.iter().enumerate() {
                let mut perturbed = q.clone();
                perturbed[j] += h;
                let pose = self.tip_pose(&perturbed);
                let (pp, pr) = Self::pose_error(&current, &pose);
                for row in 0..3 {
                    jacobian[(row, col)] = pp[row] / h;
                    jacobian[(row + 3, col)] = pr[row] / h;
                }
            }

            let jjt = &jacobian * jacobian.transpose() + DMatrix::identity(6, 6) * lambda2;
            let step = jjt.lu().solve(&error).map(|y| jacobian.transpose() * y)?;
            for (col, &j) in free.iter().enumerate() {
                q[j] += step[col];
            }
            self.clamp_to_limits(&mut q);
        }
        None
    }
}

impl RobotModel for ChainRobotModel {
    fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    fn joint_limits(&self, index: usize) -> Option<JointLimits> {
        self.limits.get(index).copied()
    }
}

impl ForwardKinematics for ChainRobotModel {
    fn compute_fk(&self, state: &[f64]) -> Option<Pose> {
        if state.len() != self.joint_names.len() {
            return None;
        }
        Some(self.tip_pose(state))
    }
}

impl RedundantManipulator for ChainRobotModel {
    fn redundant_joint_indices(&self) -> &[usize] {
        &self.redundant
    }

    fn compute_ik(&self, pose: &Pose, redundant: &[f64], seed: &[f64]) -> Option<RobotState> {
        if seed.len() != self.joint_names.len() || redundant.len() != self.redundant.len() {
            return None;
        }
        let free: Vec<usize> = (0..self.joint_names.len())
            .filter(|i| !self.redundant.contains(i))
            .collect();

        let mut start = seed.to_vec();
        for (&index, &value) in self.redundant.iter().zip(redundant) {
            start[index] = value;
        }
        if !self.check_joint_limits(&start) {
            return None;
        }

        if let Some(q) = self.solve_from(pose, start.clone(), &free) {
            return Some(q);
        }

        let mut rng = StdRng::seed_from_u64(self.ik.rng_seed);
        for _ in 0..self.ik.restarts {
            let mut q = start.clone();
            for &j in &free {
                let limits = self.limits[j];
                q[j] = rng.gen_range(limits.min..=limits.max);
            }
            if let Some(solution) = self.solve_from(pose, q, &free) {
                return Some(solution);
            }
        }
        None
    }
}
