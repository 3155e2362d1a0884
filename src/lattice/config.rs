//! Workspace lattice configuration and motion primitives

use serde::{Deserialize, Serialize};

use crate::common::{PlanningError, PlanningResult};

/// Discrete perturbation of a workspace coordinate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MotionPrimitive {
    /// Cells along x, y, z, then bins along roll, pitch, yaw
    pub pose_delta: [i32; 6],
    /// Cells per redundant joint
    #[serde(default)]
    pub redundant_delta: Vec<i32>,
    pub cost: i32,
}

impl MotionPrimitive {
    pub fn new(pose_delta: [i32; 6], redundant_delta: Vec<i32>, cost: i32) -> Self {
        Self {
            pose_delta,
            redundant_delta,
            cost,
        }
    }

    /// All deltas, pose first
    pub fn deltas(&self) -> impl Iterator<Item = i32> + '_ {
        self.pose_delta.iter().chain(&self.redundant_delta).copied()
    }

    /// Number of unit steps the primitive is split into when checked
    pub fn steps(&self) -> usize {
        self.deltas().map(|d| d.unsigned_abs() as usize).max().unwrap_or(0)
    }

    /// Same motion in the opposite direction, at the same cost
    pub fn inverse(&self) -> Self {
        Self {
            pose_delta: self.pose_delta.map(|d| -d),
            redundant_delta: self.redundant_delta.iter().map(|d| -d).collect(),
            cost: self.cost,
        }
    }

    /// One step forwards and backwards along every workspace dimension
    pub fn unit_set(num_redundant: usize, cost: i32) -> Vec<MotionPrimitive> {
        let dims = 6 + num_redundant;
        let mut prims = Vec::with_capacity(2 * dims);
        for dim in 0..dims {
            for sign in [1, -1] {
                let mut pose_delta = [0; 6];
                let mut redundant_delta = vec![0; num_redundant];
                if dim < 6 {
                    pose_delta[dim] = sign;
                } else {
                    redundant_delta[dim - 6] = sign;
                }
                prims.push(MotionPrimitive::new(pose_delta, redundant_delta, cost));
            }
        }
        prims
    }
}

/// Configuration for the workspace lattice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceLatticeConfig {
    /// Cell size along x, y, z [m]
    pub position_resolution: [f64; 3],
    /// Number of bins over a full turn of roll, pitch and yaw
    pub orientation_bins: [usize; 3],
    /// Cell size of each redundant joint [rad or m]
    #[serde(default)]
    pub redundant_resolution: Vec<f64>,
    /// Motion primitives; an empty list selects the unit set
    #[serde(default)]
    pub primitives: Vec<MotionPrimitive>,
    /// Cost of each unit primitive
    pub unit_cost: i32,
}

impl Default for WorkspaceLatticeConfig {
    fn default() -> Self {
        Self {
            position_resolution: [0.02; 3],
            orientation_bins: [36; 3],
            redundant_resolution: Vec::new(),
            primitives: Vec::new(),
            unit_cost: 1,
        }
    }
}

impl WorkspaceLatticeConfig {
    pub fn from_json(text: &str) -> PlanningResult<Self> {
        let config: WorkspaceLatticeConfig = serde_json::from_str(text)?;
        Ok(config)
    }

    /// Check the configuration against the number of redundant joints
    pub fn validate(&self, num_redundant: usize) -> PlanningResult<()> {
        if self.position_resolution.iter().any(|&r| !(r > 0.0)) {
            return Err(PlanningError::invalid_config("position resolution must be positive"));
        }
        if self.orientation_bins.iter().any(|&b| b == 0 || b > i32::MAX as usize) {
            return Err(PlanningError::invalid_config("orientation bin counts must be positive"));
        }
        if self.redundant_resolution.len() != num_redundant {
            return Err(PlanningError::invalid_config(format!(
                "expected {} redundant joint resolutions, got {}",
                num_redundant,
                self.redundant_resolution.len()
            )));
        }
        if self.redundant_resolution.iter().any(|&r| !(r > 0.0)) {
            return Err(PlanningError::invalid_config("redundant joint resolution must be positive"));
        }
        if self.unit_cost <= 0 {
            return Err(PlanningError::invalid_config("unit cost must be positive"));
        }
        for (i, prim) in self.primitives.iter().enumerate() {
            if prim.redundant_delta.len() != num_redundant {
                return Err(PlanningError::invalid_config(format!(
                    "primitive {} has {} redundant deltas, expected {}",
                    i,
                    prim.redundant_delta.len(),
                    num_redundant
                )));
            }
            if prim.steps() == 0 {
                return Err(PlanningError::invalid_config(format!("primitive {} does not move", i)));
            }
            if prim.cost <= 0 {
                return Err(PlanningError::invalid_config(format!(
                    "primitive {} has non-positive cost {}",
                    i, prim.cost
                )));
            }
        }
        Ok(())
    }

    /// Primitives used for expansion
    pub fn motion_primitives(&self) -> Vec<MotionPrimitive> {
        if self.primitives.is_empty() {
            MotionPrimitive::unit_set(self.redundant_resolution.len(), self.unit_cost)
        } else {
            self.primitives.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_set() {
        let prims = MotionPrimitive::unit_set(1, 3);
        assert_eq!(prims.len(), 14);
        assert!(prims.iter().all(|p| p.steps() == 1 && p.cost == 3));
        assert!(prims.iter().all(|p| prims.contains(&p.inverse())));
    }

    #[test]
    fn test_steps_and_inverse() {
        let p = MotionPrimitive::new([2, 0, -3, 0, 1, 0], vec![1], 5);
        assert_eq!(p.steps(), 3);
        assert_eq!(p.inverse().pose_delta, [-2, 0, 3, 0, -1, 0]);
        assert_eq!(p.inverse().redundant_delta, vec![-1]);
    }

    #[test]
    fn test_validate() {
        let mut config = WorkspaceLatticeConfig {
            redundant_resolution: vec![0.1],
            ..Default::default()
        };
        assert!(config.validate(1).is_ok());
        assert!(config.validate(0).is_err());

        config.primitives = vec![MotionPrimitive::new([0; 6], vec![0], 1)];
        assert!(config.validate(1).is_err());

        config.primitives = vec![MotionPrimitive::new([1, 0, 0, 0, 0, 0], vec![], 1)];
        assert!(config.validate(1).is_err());
    }

    #[test]
    fn test_from_json_defaults_primitives() {
        let text = r#"{
            "position_resolution": [0.1, 0.1, 0.1],
            "orientation_bins": [36, 36, 36],
            "redundant_resolution": [0.1745],
            "unit_cost": 10
        }"#;
        let config = WorkspaceLatticeConfig::from_json(text).unwrap();
        assert!(config.validate(1).is_ok());
        assert_eq!(config.motion_primitives().len(), 14);
    }
}
