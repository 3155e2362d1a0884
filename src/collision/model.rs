//! Collision model: every configured group, keyed by name
//!
//! The model exclusively owns its groups. The default group is stored by
//! name and always refers to an owned group.

use std::collections::{BTreeMap, HashMap};

use tracing::{error, info, warn};

use crate::collision::config::{AllowedCollisions, CollisionModelConfig, GroupKind};
use crate::collision::group::{Group, LinkFrames};
use crate::collision::sphere::WorldSphere;
use crate::common::{JointLimits, PlanningError, PlanningResult, Pose};
use crate::robot::RobotDescription;

#[derive(Debug, Clone)]
pub struct CollisionModel {
    description: RobotDescription,
    groups: BTreeMap<String, Group>,
    default_group: Option<String>,
    /// Positions of every joint set through `set_joint_position`
    joint_positions: HashMap<String, f64>,
    allowed: AllowedCollisions,
}

impl CollisionModel {
    /// Build every group of `config`. Fails on the first group that
    /// references unknown links, joints or spheres; duplicate group names
    /// keep the first definition.
    pub fn init(description: RobotDescription, config: &CollisionModelConfig) -> PlanningResult<Self> {
        description.validate()?;
        config.validate()?;

        let mut groups = BTreeMap::new();
        for group_config in &config.collision_groups {
            if groups.contains_key(&group_config.name) {
                warn!("Already have group name '{}'", group_config.name);
                continue;
            }
            let group = Group::init(&description, group_config, &config.collision_spheres)
                .map_err(|e| {
                    error!("Failed to initialize group '{}': {}", group_config.name, e);
                    e
                })?;
            groups.insert(group_config.name.clone(), group);
        }

        for (a, b) in &config.allowed_collisions {
            for link in [a, b] {
                if !description.has_link(link) {
                    return Err(PlanningError::UnknownLink(link.clone()));
                }
            }
        }

        info!("Successfully initialized {} collision groups", groups.len());
        Ok(Self {
            description,
            groups,
            default_group: None,
            joint_positions: HashMap::new(),
            allowed: config.allowed_collisions.iter().collect(),
        })
    }

    pub fn description(&self) -> &RobotDescription {
        &self.description
    }

    pub fn allowed_collisions(&self) -> &AllowedCollisions {
        &self.allowed
    }

    /// Group names in sorted order
    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Names of the groups voxelized into the grid, sorted
    pub fn voxel_group_names(&self) -> Vec<String> {
        self.groups
            .values()
            .filter(|g| g.kind() == GroupKind::Voxels)
            .map(|g| g.name().to_string())
            .collect()
    }

    fn group_or_err(&self, name: &str) -> PlanningResult<&Group> {
        self.groups.get(name).ok_or_else(|| self.unknown_group(name))
    }

    fn group_mut_or_err(&mut self, name: &str) -> PlanningResult<&mut Group> {
        // collected up front; the mutable lookup below holds the map
        let available = if self.groups.contains_key(name) {
            Vec::new()
        } else {
            self.group_names()
        };
        self.groups.get_mut(name).ok_or_else(|| PlanningError::UnknownGroup {
            name: name.to_string(),
            available,
        })
    }

    fn unknown_group(&self, name: &str) -> PlanningError {
        PlanningError::UnknownGroup {
            name: name.to_string(),
            available: self.group_names(),
        }
    }

    pub fn set_default_group(&mut self, name: &str) -> PlanningResult<()> {
        if !self.groups.contains_key(name) {
            error!("Failed to find group '{}' in the collision model", name);
            error!("Expecting one of the following group names:");
            for available in self.groups.keys() {
                error!("{}", available);
            }
            return Err(self.unknown_group(name));
        }
        self.default_group = Some(name.to_string());
        Ok(())
    }

    pub fn default_group_name(&self) -> Option<&str> {
        self.default_group.as_deref()
    }

    pub fn default_group(&self) -> PlanningResult<&Group> {
        let name = self.default_group.as_deref().ok_or(PlanningError::NoDefaultGroup)?;
        self.group_or_err(name)
    }

    pub fn print_groups(&self) {
        if self.groups.is_empty() {
            error!("No groups found.");
            return;
        }
        for group in self.groups.values() {
            group.print();
        }
    }

    pub fn frame_info(&self, link: &str, group: &str) -> Option<(usize, usize)> {
        self.groups.get(group).and_then(|g| g.frame_info(link))
    }

    pub fn does_link_exist(&self, link: &str, group: &str) -> bool {
        self.frame_info(link, group).is_some()
    }

    pub fn set_order_of_joint_positions(&mut self, joint_names: &[String], group: &str) -> PlanningResult<()> {
        self.group_mut_or_err(group)?
            .set_order_of_joint_positions(joint_names)
    }

    /// Update a joint in every group that contains it
    pub fn set_joint_position(&mut self, name: &str, position: f64) {
        self.joint_positions.insert(name.to_string(), position);
        for group in self.groups.values_mut() {
            group.set_joint_position(name, position);
        }
    }

    pub fn compute_group_fk(&mut self, angles: &[f64], group: &str) -> PlanningResult<&LinkFrames> {
        self.group_mut_or_err(group)?.compute_fk(angles)
    }

    /// Recompute a group's link transforms at the stored joint positions
    pub fn update_group_fk(&mut self, group: &str) -> PlanningResult<&LinkFrames> {
        Ok(self.group_mut_or_err(group)?.update_fk())
    }

    pub fn compute_default_group_fk(&mut self, angles: &[f64]) -> PlanningResult<&LinkFrames> {
        let name = self.default_group.clone().ok_or(PlanningError::NoDefaultGroup)?;
        self.compute_group_fk(angles, &name)
    }

    pub fn group_spheres(&self, group: &str) -> PlanningResult<Vec<WorldSphere>> {
        self.group_or_err(group)?.spheres()
    }

    pub fn default_group_spheres(&self) -> PlanningResult<Vec<WorldSphere>> {
        self.default_group()?.spheres()
    }

    pub fn joint_limits(&self, group: &str, joint: &str) -> PlanningResult<JointLimits> {
        let g = self.group_or_err(group)?;
        self.description
            .joint_limits(g.reference_frame(), g.tip_frame(), joint)
            .map_err(|e| {
                error!(
                    "Failed to find joint limits for joint '{}' between links '{}' and '{}'",
                    joint,
                    g.reference_frame(),
                    g.tip_frame()
                );
                e
            })
    }

    pub fn reference_frame(&self, group: &str) -> Option<&str> {
        self.groups.get(group).map(|g| g.reference_frame())
    }

    pub fn set_group_to_world_transform(&mut self, group: &str, world_from_group: Pose) -> PlanningResult<()> {
        self.group_mut_or_err(group)?
            .set_group_to_world_transform(world_from_group);
        Ok(())
    }

    /// Place every group in the world given the pose of the robot's root
    /// link. Each group's reference frame is located through the current
    /// joint positions.
    pub fn set_world_to_model_transform(&mut self, world_from_robot: &Pose) -> PlanningResult<()> {
        let mut placements = Vec::with_capacity(self.groups.len());
        for (name, group) in &self.groups {
            let robot_from_group = self
                .description
                .link_transform(group.reference_frame(), &self.joint_positions)
                .map_err(|e| {
                    error!(
                        "Robot model does not contain transform from '{}' to group frame '{}'",
                        self.description.root_link,
                        group.reference_frame()
                    );
                    e
                })?;
            placements.push((name.clone(), world_from_robot * robot_from_group));
        }
        for (name, pose) in placements {
            self.group_mut_or_err(&name)?.set_group_to_world_transform(pose);
        }
        Ok(())
    }
}
