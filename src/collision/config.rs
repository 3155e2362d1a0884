//! Collision model configuration
//!
//! Sphere definitions are shared by name across groups; each group lists
//! the links of one kinematic chain and the spheres attached to them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::common::{PlanningError, PlanningResult};

/// Named sphere in the frame of whichever link references it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionSphereConfig {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub radius: f64,
    #[serde(default)]
    pub priority: i32,
}

impl CollisionSphereConfig {
    pub fn new(name: &str, xyz: [f64; 3], radius: f64, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            x: xyz[0],
            y: xyz[1],
            z: xyz[2],
            radius,
            priority,
        }
    }
}

/// A link of a group and the names of its spheres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionLinkConfig {
    pub name: String,
    pub spheres: Vec<String>,
}

/// How a group takes part in collision checking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Checked sphere by sphere when it is the active group
    #[default]
    Spheres,
    /// Voxelized into the grid at the current joint positions, so other
    /// groups are checked against it as an obstacle
    Voxels,
}

/// One kinematic subchain approximated by spheres
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionGroupConfig {
    pub name: String,
    pub root_name: String,
    pub tip_name: String,
    #[serde(default)]
    pub kind: GroupKind,
    pub links: Vec<CollisionLinkConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollisionModelConfig {
    pub collision_spheres: Vec<CollisionSphereConfig>,
    pub collision_groups: Vec<CollisionGroupConfig>,
    /// Link pairs never checked against each other for self collision
    #[serde(default)]
    pub allowed_collisions: Vec<(String, String)>,
}

impl CollisionModelConfig {
    pub fn from_json(text: &str) -> PlanningResult<Self> {
        let config: CollisionModelConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Sphere names must be unique and radii positive
    pub fn validate(&self) -> PlanningResult<()> {
        let mut names = HashSet::new();
        for sphere in &self.collision_spheres {
            if !names.insert(sphere.name.as_str()) {
                return Err(PlanningError::invalid_config(format!(
                    "duplicate sphere name '{}'",
                    sphere.name
                )));
            }
            if !(sphere.radius > 0.0) {
                return Err(PlanningError::invalid_config(format!(
                    "sphere '{}' has non-positive radius {}",
                    sphere.name, sphere.radius
                )));
            }
        }
        Ok(())
    }

    pub fn sphere(&self, name: &str) -> Option<&CollisionSphereConfig> {
        self.collision_spheres.iter().find(|s| s.name == name)
    }
}

/// Unordered set of link pairs allowed to touch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowedCollisions {
    pairs: HashSet<(String, String)>,
}

impl AllowedCollisions {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub fn allow(&mut self, a: &str, b: &str) {
        self.pairs.insert(Self::key(a, b));
    }

    pub fn is_allowed(&self, a: &str, b: &str) -> bool {
        self.pairs.contains(&Self::key(a, b))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<'a> FromIterator<&'a (String, String)> for AllowedCollisions {
    fn from_iter<I: IntoIterator<Item = &'a (String, String)>>(iter: I) -> Self {
        let mut allowed = AllowedCollisions::new();
        for (a, b) in iter {
            allowed.allow(a, b);
        }
        allowed
    }
}
