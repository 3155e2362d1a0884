//! Kinematic description of a robot: links and the joints connecting them
//!
//! This is the in-memory form of a robot description. Parsing URDF/SRDF is
//! left to the caller; descriptions can be built in code or read from JSON.

use std::collections::HashMap;

use nalgebra::{Translation3, Unit, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::common::{pose_from_xyz_rpy, JointLimits, PlanningError, PlanningResult, Pose};
use crate::robot::chain::KinematicChain;

/// Joint type together with its limits
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JointKind {
    Fixed,
    Revolute { lower: f64, upper: f64 },
    Continuous,
    Prismatic { lower: f64, upper: f64 },
}

fn default_axis() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

/// A single joint connecting a parent link to a child link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointSpec {
    pub name: String,
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub origin_xyz: [f64; 3],
    #[serde(default)]
    pub origin_rpy: [f64; 3],
    #[serde(default = "default_axis")]
    pub axis: [f64; 3],
    pub kind: JointKind,
}

impl JointSpec {
    pub fn new(name: &str, parent: &str, child: &str, kind: JointKind) -> Self {
        Self {
            name: name.to_string(),
            parent: parent.to_string(),
            child: child.to_string(),
            origin_xyz: [0.0; 3],
            origin_rpy: [0.0; 3],
            axis: default_axis(),
            kind,
        }
    }

    pub fn with_origin(mut self, xyz: [f64; 3], rpy: [f64; 3]) -> Self {
        self.origin_xyz = xyz;
        self.origin_rpy = rpy;
        self
    }

    pub fn with_axis(mut self, axis: [f64; 3]) -> Self {
        self.axis = axis;
        self
    }

    pub fn is_movable(&self) -> bool {
        !matches!(self.kind, JointKind::Fixed)
    }

    pub fn limits(&self) -> Option<JointLimits> {
        match self.kind {
            JointKind::Fixed => None,
            JointKind::Continuous => Some(JointLimits::continuous()),
            JointKind::Revolute { lower, upper } | JointKind::Prismatic { lower, upper } => {
                Some(JointLimits::new(lower, upper))
            }
        }
    }

    pub fn origin(&self) -> Pose {
        pose_from_xyz_rpy(self.origin_xyz, self.origin_rpy)
    }

    /// Transform from the parent link frame to the child link frame at
    /// joint position `q`
    pub fn transform(&self, q: f64) -> Pose {
        let axis = Vector3::new(self.axis[0], self.axis[1], self.axis[2]);
        let motion = match self.kind {
            JointKind::Fixed => Pose::identity(),
            JointKind::Revolute { .. } | JointKind::Continuous => {
                let rotation = UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), q);
                Pose::from_parts(Translation3::identity(), rotation)
            }
            JointKind::Prismatic { .. } => Pose::from_parts(
                Translation3::from(axis.normalize() * q),
                UnitQuaternion::identity(),
            ),
        };
        self.origin() * motion
    }
}

/// Tree of links connected by joints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotDescription {
    pub name: String,
    pub root_link: String,
    pub links: Vec<String>,
    pub joints: Vec<JointSpec>,
}

impl RobotDescription {
    pub fn new(name: &str, root_link: &str) -> Self {
        Self {
            name: name.to_string(),
            root_link: root_link.to_string(),
            links: vec![root_link.to_string()],
            joints: Vec::new(),
        }
    }

    /// Append a joint and its child link
    pub fn add_joint(&mut self, joint: JointSpec) -> &mut Self {
        if !self.links.contains(&joint.child) {
            self.links.push(joint.child.clone());
        }
        self.joints.push(joint);
        self
    }

    pub fn from_json(text: &str) -> PlanningResult<Self> {
        let description: RobotDescription = serde_json::from_str(text)?;
        description.validate()?;
        Ok(description)
    }

    /// Every joint must connect known links, every link may have at most one
    /// parent joint, parent joints must not form a cycle, and axes of
    /// movable joints must be non-zero.
    pub fn validate(&self) -> PlanningResult<()> {
        if !self.has_link(&self.root_link) {
            return Err(PlanningError::UnknownLink(self.root_link.clone()));
        }
        let mut parent_of: HashMap<&str, &str> = HashMap::new();
        for joint in &self.joints {
            for link in [&joint.parent, &joint.child] {
                if !self.has_link(link) {
                    return Err(PlanningError::UnknownLink(link.clone()));
                }
            }
            if parent_of.insert(&joint.child, &joint.name).is_some() {
                return Err(PlanningError::invalid_config(format!(
                    "link '{}' has more than one parent joint",
                    joint.child
                )));
            }
            if joint.is_movable() && joint.axis.iter().all(|a| *a == 0.0) {
                return Err(PlanningError::invalid_config(format!(
                    "joint '{}' has a zero axis",
                    joint.name
                )));
            }
        }
        let parent_link: HashMap<&str, &str> = self
            .joints
            .iter()
            .map(|j| (j.child.as_str(), j.parent.as_str()))
            .collect();
        for joint in &self.joints {
            let mut link = joint.child.as_str();
            let mut depth = 0;
            while let Some(&parent) = parent_link.get(link) {
                depth += 1;
                if depth > self.joints.len() {
                    return Err(PlanningError::invalid_config(format!(
                        "joint '{}' is part of a kinematic cycle",
                        joint.name
                    )));
                }
                link = parent;
            }
        }
        Ok(())
    }

    pub fn has_link(&self, name: &str) -> bool {
        self.links.iter().any(|l| l == name)
    }

    pub fn joint(&self, name: &str) -> Option<&JointSpec> {
        self.joints.iter().find(|j| j.name == name)
    }

    pub fn parent_joint(&self, link: &str) -> Option<&JointSpec> {
        self.joints.iter().find(|j| j.child == link)
    }

    /// Serial chain of joints from `root` down to `tip`
    pub fn chain(&self, root: &str, tip: &str) -> PlanningResult<KinematicChain> {
        for link in [root, tip] {
            if !self.has_link(link) {
                return Err(PlanningError::UnknownLink(link.to_string()));
            }
        }
        let not_descendant = || {
            PlanningError::invalid_config(format!("link '{}' is not a descendant of '{}'", tip, root))
        };
        let mut segments = Vec::new();
        let mut link = tip;
        while link != root {
            // a walk longer than the joint list has entered a cycle
            if segments.len() == self.joints.len() {
                return Err(not_descendant());
            }
            let joint = self.parent_joint(link).ok_or_else(not_descendant)?;
            segments.push(joint.clone());
            link = &joint.parent;
        }
        segments.reverse();
        Ok(KinematicChain::new(root, tip, segments))
    }

    /// Limits of `joint`, which must lie on the chain from `root` to `tip`
    pub fn joint_limits(&self, root: &str, tip: &str, joint: &str) -> PlanningResult<JointLimits> {
        let chain = self.chain(root, tip)?;
        chain
            .segments()
            .iter()
            .find(|s| s.name == joint)
            .and_then(|s| s.limits())
            .ok_or_else(|| PlanningError::UnknownJoint(joint.to_string()))
    }

    /// Transform from the root link to `link`. Joints missing from
    /// `positions` are taken at zero.
    pub fn link_transform(&self, link: &str, positions: &HashMap<String, f64>) -> PlanningResult<Pose> {
        let chain = self.chain(&self.root_link, link)?;
        let values: Vec<f64> = chain
            .segments()
            .iter()
            .map(|s| positions.get(&s.name).copied().unwrap_or(0.0))
            .collect();
        Ok(chain.tip_transform(&values))
    }
}
