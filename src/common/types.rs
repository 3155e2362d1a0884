//! Common types used throughout rust_arm_planning

use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::utils::angles::{normalize_angle, shortest_angle_dist};

/// Rigid transform of a frame, always expressed relative to a parent frame
pub type Pose = Isometry3<f64>;

/// Continuous joint configuration, ordered like the planning joints
pub type RobotState = Vec<f64>;

/// Integer id of a lattice state; stable for the lifetime of the lattice
pub type StateId = usize;

/// Sentinel cost for unreachable states. Sums saturate at this value.
pub const INFINITE_COST: i32 = i32::MAX;

/// Build a pose from a translation and roll/pitch/yaw angles
pub fn pose_from_xyz_rpy(xyz: [f64; 3], rpy: [f64; 3]) -> Pose {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

/// Decompose a pose into [x, y, z, roll, pitch, yaw]
pub fn pose_to_xyz_rpy(pose: &Pose) -> [f64; 6] {
    let t = pose.translation.vector;
    let (roll, pitch, yaw) = pose.rotation.euler_angles();
    [t.x, t.y, t.z, roll, pitch, yaw]
}

/// Position limits of a single joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub min: f64,
    pub max: f64,
    /// Continuous joints wrap and have no effective limits
    pub continuous: bool,
}

impl JointLimits {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max, continuous: false }
    }

    pub fn continuous() -> Self {
        Self {
            min: -std::f64::consts::PI,
            max: std::f64::consts::PI,
            continuous: true,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.continuous || (value >= self.min && value <= self.max)
    }

    /// Signed difference `to - from`, through the shorter arc for continuous joints
    pub fn difference(&self, from: f64, to: f64) -> f64 {
        if self.continuous {
            normalize_angle(to - from)
        } else {
            to - from
        }
    }

    /// Absolute distance between two joint values
    pub fn distance(&self, a: f64, b: f64) -> f64 {
        if self.continuous {
            shortest_angle_dist(a, b)
        } else {
            (a - b).abs()
        }
    }
}

/// A successor (or predecessor) of a lattice state together with its edge cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Successor {
    pub id: StateId,
    pub cost: i32,
}

impl Successor {
    pub fn new(id: StateId, cost: i32) -> Self {
        Self { id, cost }
    }
}

/// Full joint configuration goal with per-joint tolerance
#[derive(Debug, Clone, PartialEq)]
pub struct JointGoal {
    pub angles: RobotState,
    pub tolerance: Vec<f64>,
}

/// Goal for the planning link
#[derive(Debug, Clone, PartialEq)]
pub struct GoalConstraint {
    /// Goal pose of the planning link in the world frame
    pub pose: Pose,
    /// Offset of the heuristic anchor, expressed in the goal frame
    pub offset: Vector3<f64>,
    /// Tolerance per axis: [x, y, z, roll, pitch, yaw]
    pub tolerance: [f64; 6],
    pub joint_goal: Option<JointGoal>,
}

impl GoalConstraint {
    pub fn new(pose: Pose, tolerance: [f64; 6]) -> Self {
        Self {
            pose,
            offset: Vector3::zeros(),
            tolerance,
            joint_goal: None,
        }
    }

    pub fn with_offset(mut self, offset: Vector3<f64>) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_joint_goal(mut self, angles: RobotState, tolerance: Vec<f64>) -> Self {
        self.joint_goal = Some(JointGoal { angles, tolerance });
        self
    }

    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.pose.translation.vector)
    }

    /// Goal position shifted by the configured offset
    pub fn offset_position(&self) -> Point3<f64> {
        let shifted = self.pose * Translation3::from(self.offset);
        Point3::from(shifted.translation.vector)
    }
}

/// Which search directions a planning space supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    /// Only successors are available
    Forward,
    /// Successors and predecessors are available
    Bidirectional,
}
