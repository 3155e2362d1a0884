//! Collision space: the sphere model of the active group checked against a
//! voxelized world and against itself
//!
//! Environment checks are single distance-field lookups per sphere. Self
//! collision checks every pair of spheres on different links that are not in
//! the allowed-collision list. Collision objects are voxelized when they are
//! added or moved and the voxels are cached, so validity queries never
//! voxelize.

use std::collections::BTreeMap;

use itertools::Itertools;
use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::collision::attached::AttachedObject;
use crate::collision::model::CollisionModel;
use crate::collision::object::{voxelize_shape, CollisionObject, ObjectOperation, Shape};
use crate::collision::sphere::WorldSphere;
use crate::common::{
    pose_from_xyz_rpy, CollisionChecker, Contact, JointLimits, PathValidity, PlanningError,
    PlanningResult, Pose, RobotState, StateValidity,
};
use crate::utils::{normalize_angle, OccupancyGrid};

/// Default interpolation increment for every joint [rad]
pub const DEFAULT_INCREMENT: f64 = 2.0 * std::f64::consts::PI / 180.0;

/// Default radius of the spheres covering attached boxes and meshes [m]
pub const DEFAULT_OBJECT_SPHERE_RADIUS: f64 = 0.025;

/// Sphere-to-obstacle distances over a subset of spheres
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clearance {
    pub average: f64,
    pub minimum: f64,
}

#[derive(Debug)]
pub struct CollisionSpace {
    grid: OccupancyGrid,
    model: CollisionModel,
    group_name: String,
    planning_joints: Vec<String>,
    limits: Vec<JointLimits>,
    inc: Vec<f64>,
    padding: f64,
    object_sphere_radius: f64,
    objects: BTreeMap<String, CollisionObject>,
    object_voxels: BTreeMap<String, Vec<Point3<f64>>>,
    /// Cells currently occupied by each voxel group
    group_voxels: BTreeMap<String, Vec<Point3<f64>>>,
    attached: Option<AttachedObject>,
}

impl CollisionSpace {
    /// Collision space over `grid` checking `group_name`. The planning joints
    /// must be a permutation of the group's movable joints and fix the order
    /// of every joint vector passed in.
    pub fn new(
        grid: OccupancyGrid,
        mut model: CollisionModel,
        group_name: &str,
        planning_joints: &[String],
    ) -> PlanningResult<Self> {
        model.set_default_group(group_name)?;
        let mut space = Self {
            grid,
            model,
            group_name: group_name.to_string(),
            planning_joints: Vec::new(),
            limits: Vec::new(),
            inc: Vec::new(),
            padding: 0.0,
            object_sphere_radius: DEFAULT_OBJECT_SPHERE_RADIUS,
            objects: BTreeMap::new(),
            object_voxels: BTreeMap::new(),
            group_voxels: BTreeMap::new(),
            attached: None,
        };
        space.set_planning_joints(planning_joints)?;
        space.update_voxel_groups()?;
        info!(
            "collision space for group '{}' with {} planning joints",
            group_name,
            planning_joints.len()
        );
        Ok(space)
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn model(&self) -> &CollisionModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut CollisionModel {
        &mut self.model
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn reference_frame(&self) -> &str {
        self.grid.reference_frame()
    }

    pub fn planning_joints(&self) -> &[String] {
        &self.planning_joints
    }

    pub fn joint_limits(&self) -> &[JointLimits] {
        &self.limits
    }

    pub fn increments(&self) -> &[f64] {
        &self.inc
    }

    pub fn padding(&self) -> f64 {
        self.padding
    }

    /// Extra distance every sphere must keep from obstacles [m]
    pub fn set_padding(&mut self, padding: f64) {
        self.padding = padding;
    }

    pub fn set_object_sphere_radius(&mut self, radius: f64) -> PlanningResult<()> {
        if !(radius > 0.0) {
            return Err(PlanningError::invalid_config("object sphere radius must be positive"));
        }
        self.object_sphere_radius = radius;
        Ok(())
    }

    /// Set the planning joints and cache their limits. Resets the
    /// interpolation increments to the default.
    pub fn set_planning_joints(&mut self, names: &[String]) -> PlanningResult<()> {
        if names.is_empty() {
            return Err(PlanningError::invalid_config("no planning joints given"));
        }
        let limits = names
            .iter()
            .map(|name| self.model.joint_limits(&self.group_name, name))
            .collect::<PlanningResult<Vec<_>>>()?;
        self.model
            .set_order_of_joint_positions(names, &self.group_name)?;
        self.planning_joints = names.to_vec();
        self.limits = limits;
        self.inc = vec![DEFAULT_INCREMENT; names.len()];
        Ok(())
    }

    pub fn set_increments(&mut self, inc: &[f64]) -> PlanningResult<()> {
        PlanningError::check_dimension(self.planning_joints.len(), inc.len())?;
        if inc.iter().any(|&i| !(i > 0.0)) {
            return Err(PlanningError::invalid_config("interpolation increments must be positive"));
        }
        self.inc = inc.to_vec();
        Ok(())
    }

    /// Set a joint outside of the planning joints, e.g. a torso joint shared
    /// with another group. Voxel groups are re-voxelized.
    pub fn set_joint_position(&mut self, name: &str, position: f64) -> PlanningResult<()> {
        self.model.set_joint_position(name, position);
        self.update_voxel_groups()
    }

    pub fn set_world_to_model_transform(&mut self, world_from_robot: &Pose) -> PlanningResult<()> {
        self.model.set_world_to_model_transform(world_from_robot)?;
        self.update_voxel_groups()
    }

    // Voxel groups

    /// Re-voxelize every voxel group other than the active group at the
    /// current joint positions
    pub fn update_voxel_groups(&mut self) -> PlanningResult<()> {
        for name in self.model.voxel_group_names() {
            if name == self.group_name {
                debug!("Skipping voxels of the active group '{}'", name);
                continue;
            }
            self.update_voxel_group(&name)?;
        }
        Ok(())
    }

    fn update_voxel_group(&mut self, name: &str) -> PlanningResult<()> {
        self.model.update_group_fk(name)?;
        let mut voxels = Vec::new();
        for sphere in self.model.group_spheres(name)? {
            let pose = pose_from_xyz_rpy([sphere.center.x, sphere.center.y, sphere.center.z], [0.0; 3]);
            voxels.extend(voxelize_shape(
                &Shape::Sphere { radius: sphere.radius },
                &pose,
                self.grid.geometry(),
            )?);
        }
        if let Some(old) = self.group_voxels.remove(name) {
            if old == voxels {
                self.group_voxels.insert(name.to_string(), old);
                return Ok(());
            }
            self.grid.remove_points(&old);
        }
        self.grid.add_points(&voxels);
        debug!("Voxelized group '{}' into {} cells", name, voxels.len());
        self.group_voxels.insert(name.to_string(), voxels);
        Ok(())
    }

    /// Cells occupied by a voxel group, None for other groups
    pub fn voxel_group_voxels(&self, name: &str) -> Option<&[Point3<f64>]> {
        self.group_voxels.get(name).map(Vec::as_slice)
    }

    // Collision objects

    pub fn process_collision_object(&mut self, object: &CollisionObject) -> PlanningResult<()> {
        match object.operation {
            ObjectOperation::Add => self.add_collision_object(object),
            ObjectOperation::Remove => self.remove_collision_object(&object.id),
            ObjectOperation::Append => self.append_collision_object(object),
            ObjectOperation::Move => self.move_collision_object(object),
        }
    }

    fn check_frame(&self, object: &CollisionObject) -> PlanningResult<()> {
        if object.frame_id != self.grid.reference_frame() {
            warn!(
                "Collision object '{}' is in frame '{}' but the grid is in '{}'",
                object.id,
                object.frame_id,
                self.grid.reference_frame()
            );
            return Err(PlanningError::invalid_config(format!(
                "collision object '{}' is not in the grid frame",
                object.id
            )));
        }
        Ok(())
    }

    fn voxelize(&self, shapes: &[(Shape, Pose)]) -> PlanningResult<Vec<Point3<f64>>> {
        let mut voxels = Vec::new();
        for (shape, pose) in shapes {
            voxels.extend(voxelize_shape(shape, pose, self.grid.geometry())?);
        }
        Ok(voxels)
    }

    pub fn add_collision_object(&mut self, object: &CollisionObject) -> PlanningResult<()> {
        if self.objects.contains_key(&object.id) {
            warn!("Rejecting ADD of collision object '{}': already exists", object.id);
            return Err(PlanningError::DuplicateObject(object.id.clone()));
        }
        self.check_frame(object)?;
        let voxels = self.voxelize(&object.shapes)?;
        self.grid.add_points(&voxels);
        debug!("Added collision object '{}' ({} voxels)", object.id, voxels.len());
        self.object_voxels.insert(object.id.clone(), voxels);
        self.objects.insert(object.id.clone(), object.clone());
        Ok(())
    }

    pub fn remove_collision_object(&mut self, id: &str) -> PlanningResult<()> {
        if !self.objects.contains_key(id) {
            warn!("Rejecting REMOVE of collision object '{}': not found", id);
            return Err(PlanningError::UnknownObject(id.to_string()));
        }
        self.objects.remove(id);
        if let Some(voxels) = self.object_voxels.remove(id) {
            self.grid.remove_points(&voxels);
            debug!("Removed collision object '{}' ({} voxels)", id, voxels.len());
        }
        Ok(())
    }

    pub fn append_collision_object(&mut self, object: &CollisionObject) -> PlanningResult<()> {
        if !self.objects.contains_key(&object.id) {
            warn!("Rejecting APPEND to collision object '{}': not found", object.id);
            return Err(PlanningError::UnknownObject(object.id.clone()));
        }
        self.check_frame(object)?;
        let voxels = self.voxelize(&object.shapes)?;
        self.grid.add_points(&voxels);
        debug!("Appended {} shapes to collision object '{}'", object.shapes.len(), object.id);
        if let Some(existing) = self.objects.get_mut(&object.id) {
            existing.shapes.extend(object.shapes.iter().cloned());
        }
        self.object_voxels
            .entry(object.id.clone())
            .or_default()
            .extend(voxels);
        Ok(())
    }

    /// Re-pose every shape of an existing object. The poses of `object` are
    /// applied to the stored shapes in order.
    pub fn move_collision_object(&mut self, object: &CollisionObject) -> PlanningResult<()> {
        let Some(existing) = self.objects.get(&object.id) else {
            warn!("Rejecting MOVE of collision object '{}': not found", object.id);
            return Err(PlanningError::UnknownObject(object.id.clone()));
        };
        self.check_frame(object)?;
        if existing.shapes.len() != object.shapes.len() {
            warn!(
                "Rejecting MOVE of collision object '{}': {} poses for {} shapes",
                object.id,
                object.shapes.len(),
                existing.shapes.len()
            );
            return Err(PlanningError::invalid_config(format!(
                "MOVE of '{}' must give one pose per shape",
                object.id
            )));
        }
        let moved: Vec<(Shape, Pose)> = existing
            .shapes
            .iter()
            .zip(&object.shapes)
            .map(|((shape, _), (_, pose))| (shape.clone(), *pose))
            .collect();
        let voxels = self.voxelize(&moved)?;

        if let Some(old) = self.object_voxels.remove(&object.id) {
            self.grid.remove_points(&old);
        }
        self.grid.add_points(&voxels);
        debug!("Moved collision object '{}'", object.id);
        self.object_voxels.insert(object.id.clone(), voxels);
        if let Some(existing) = self.objects.get_mut(&object.id) {
            existing.shapes = moved;
        }
        Ok(())
    }

    pub fn remove_all_collision_objects(&mut self) {
        let ids: Vec<String> = self.objects.keys().cloned().collect();
        for id in ids {
            if let Some(voxels) = self.object_voxels.remove(&id) {
                self.grid.remove_points(&voxels);
            }
            self.objects.remove(&id);
        }
        debug!("Removed all collision objects");
    }

    pub fn collision_object_names(&self) -> Vec<String> {
        self.objects.keys().cloned().collect()
    }

    pub fn collision_object(&self, id: &str) -> Option<&CollisionObject> {
        self.objects.get(id)
    }

    /// Cached voxel centres of every collision object
    pub fn collision_object_voxels(&self) -> Vec<Point3<f64>> {
        self.object_voxels.values().flatten().copied().collect()
    }

    // Attached object

    /// Attach `shapes` (posed in the frame of `link_name`) to a link of the
    /// active group, replacing any previously attached object
    pub fn attach_object(&mut self, name: &str, shapes: &[(Shape, Pose)], link_name: &str) -> PlanningResult<()> {
        let link_index = self
            .model
            .group(&self.group_name)
            .and_then(|g| g.link_index(link_name))
            .ok_or_else(|| {
                warn!(
                    "Cannot attach '{}': link '{}' is not in group '{}'",
                    name, link_name, self.group_name
                );
                PlanningError::UnknownLink(link_name.to_string())
            })?;
        let object = AttachedObject::new(name, link_name, link_index, shapes, self.object_sphere_radius)?;
        if let Some(previous) = &self.attached {
            debug!("Replacing attached object '{}'", previous.name);
        }
        info!(
            "Attached '{}' to '{}' with {} spheres",
            name,
            link_name,
            object.spheres.len()
        );
        self.attached = Some(object);
        Ok(())
    }

    pub fn remove_attached_object(&mut self) {
        if let Some(object) = self.attached.take() {
            debug!("Removed attached object '{}'", object.name);
        }
    }

    pub fn has_attached_object(&self) -> bool {
        self.attached.is_some()
    }

    pub fn attached_object(&self) -> Option<&AttachedObject> {
        self.attached.as_ref()
    }

    // Geometry queries

    fn compute_fk(&mut self, angles: &[f64]) -> PlanningResult<()> {
        PlanningError::check_dimension(self.planning_joints.len(), angles.len())?;
        self.model.compute_default_group_fk(angles)?;
        Ok(())
    }

    fn attached_world_spheres(&self) -> PlanningResult<Vec<WorldSphere>> {
        let Some(object) = &self.attached else {
            return Ok(Vec::new());
        };
        let pose = self.model.default_group()?.link_pose(object.link_index)?;
        Ok(object
            .spheres
            .iter()
            .enumerate()
            .map(|(index, s)| WorldSphere {
                center: s.world_center(&pose),
                radius: s.radius,
                link: object.link_index,
                index,
                priority: s.priority,
                attached: true,
            })
            .collect())
    }

    /// World-frame [x, y, z, radius] of every group sphere at `angles`
    pub fn collision_spheres(&mut self, angles: &[f64]) -> PlanningResult<Vec<[f64; 4]>> {
        self.compute_fk(angles)?;
        Ok(self
            .model
            .default_group_spheres()?
            .iter()
            .map(|s| [s.center.x, s.center.y, s.center.z, s.radius])
            .collect())
    }

    /// World-frame [x, y, z, radius] of the attached object's spheres
    pub fn attached_object_spheres(&mut self, angles: &[f64]) -> PlanningResult<Vec<[f64; 4]>> {
        self.compute_fk(angles)?;
        Ok(self
            .attached_world_spheres()?
            .iter()
            .map(|s| [s.center.x, s.center.y, s.center.z, s.radius])
            .collect())
    }

    /// Environment clearance of the `n` highest priority spheres (lowest
    /// priority value first)
    pub fn clearance(&mut self, angles: &[f64], n: usize) -> PlanningResult<Clearance> {
        self.compute_fk(angles)?;
        let mut spheres = self.model.default_group_spheres()?;
        spheres.sort_by_key(|s| s.priority);
        let distances: Vec<f64> = spheres
            .iter()
            .take(n)
            .map(|s| self.grid.distance_at(&s.center) - s.radius)
            .collect();
        if distances.is_empty() {
            let d = self.grid.max_distance();
            return Ok(Clearance { average: d, minimum: d });
        }
        Ok(Clearance {
            average: distances.iter().sum::<f64>() / distances.len() as f64,
            minimum: distances.iter().copied().fold(f64::INFINITY, f64::min),
        })
    }

    fn sphere_name(&self, sphere: &WorldSphere) -> String {
        if sphere.attached {
            return self
                .attached
                .as_ref()
                .and_then(|o| o.spheres.get(sphere.index))
                .map_or_else(String::new, |s| s.name.clone());
        }
        self.model
            .group(&self.group_name)
            .and_then(|g| g.links().get(sphere.link))
            .and_then(|l| l.spheres.get(sphere.index))
            .map_or_else(String::new, |s| s.name.clone())
    }

    fn link_name(&self, sphere: &WorldSphere) -> String {
        if sphere.attached {
            if let Some(object) = &self.attached {
                return object.name.clone();
            }
        }
        self.model
            .group(&self.group_name)
            .and_then(|g| g.links().get(sphere.link))
            .map_or_else(String::new, |l| l.name.clone())
    }

    fn group_link_name(&self, link: usize) -> &str {
        self.model
            .group(&self.group_name)
            .and_then(|g| g.links().get(link))
            .map_or("", |l| l.name.as_str())
    }

    /// Spheres on the same link (attached spheres count as part of their
    /// parent link) and allowed link pairs are never checked
    fn skip_pair(&self, a: &WorldSphere, b: &WorldSphere) -> bool {
        if a.link == b.link {
            return true;
        }
        if a.attached || b.attached {
            return false;
        }
        self.model
            .allowed_collisions()
            .is_allowed(self.group_link_name(a.link), self.group_link_name(b.link))
    }

    fn check_state(&mut self, angles: &[f64], verbose: bool) -> PlanningResult<StateValidity> {
        PlanningError::check_dimension(self.planning_joints.len(), angles.len())?;

        for (i, (&value, limits)) in angles.iter().zip(&self.limits).enumerate() {
            if !limits.contains(value) {
                if verbose {
                    debug!(
                        "joint '{}' at {:.4} violates limits [{:.4}, {:.4}]",
                        self.planning_joints[i], value, limits.min, limits.max
                    );
                }
                return Ok(StateValidity::invalid(
                    0.0,
                    Contact::JointLimit {
                        joint: self.planning_joints[i].clone(),
                        value,
                    },
                ));
            }
        }

        self.compute_fk(angles)?;
        let mut spheres = self.model.default_group_spheres()?;
        spheres.extend(self.attached_world_spheres()?);

        let mut dist = self.grid.max_distance();
        let mut contact = None;

        for sphere in &spheres {
            let clearance = self.grid.distance_at(&sphere.center) - (sphere.radius + self.padding);
            dist = dist.min(clearance);
            if clearance < 0.0 {
                let hit = Contact::Environment {
                    link: self.link_name(sphere),
                    sphere: self.sphere_name(sphere),
                };
                if !verbose {
                    return Ok(StateValidity::invalid(dist, hit));
                }
                debug!("environment collision: {:?} (clearance {:.4})", hit, clearance);
                contact.get_or_insert(hit);
            }
        }

        for (a, b) in spheres.iter().tuple_combinations() {
            if self.skip_pair(a, b) {
                continue;
            }
            let clearance = a.clearance(b);
            dist = dist.min(clearance);
            if clearance < 0.0 {
                let hit = Contact::SelfCollision {
                    first: format!("{}/{}", self.link_name(a), self.sphere_name(a)),
                    second: format!("{}/{}", self.link_name(b), self.sphere_name(b)),
                };
                if !verbose {
                    return Ok(StateValidity::invalid(dist, hit));
                }
                debug!("self collision: {:?} (clearance {:.4})", hit, clearance);
                contact.get_or_insert(hit);
            }
        }

        Ok(match contact {
            Some(hit) => StateValidity::invalid(dist, hit),
            None => StateValidity::valid(dist),
        })
    }

    fn interpolate(&self, start: &[f64], end: &[f64], inc: &[f64]) -> PlanningResult<Vec<RobotState>> {
        let n = self.planning_joints.len();
        PlanningError::check_dimension(n, start.len())?;
        PlanningError::check_dimension(n, end.len())?;
        PlanningError::check_dimension(n, inc.len())?;
        if inc.iter().any(|&i| !(i > 0.0)) {
            return Err(PlanningError::invalid_config("interpolation increments must be positive"));
        }

        let diffs: Vec<f64> = self
            .limits
            .iter()
            .zip(start.iter().zip(end))
            .map(|(limits, (&a, &b))| limits.difference(a, b))
            .collect();
        let steps = diffs
            .iter()
            .zip(inc)
            .map(|(d, i)| (d.abs() / i).ceil() as usize)
            .max()
            .unwrap_or(0)
            .max(1);

        Ok((0..=steps)
            .map(|k| {
                let t = k as f64 / steps as f64;
                start
                    .iter()
                    .zip(&diffs)
                    .zip(&self.limits)
                    .map(|((&a, &d), limits)| {
                        let v = a + d * t;
                        if limits.continuous {
                            normalize_angle(v)
                        } else {
                            v
                        }
                    })
                    .collect()
            })
            .collect())
    }
}

impl CollisionChecker for CollisionSpace {
    fn is_state_valid(&mut self, angles: &[f64], verbose: bool) -> PlanningResult<StateValidity> {
        self.check_state(angles, verbose)
    }

    fn is_state_to_state_valid(&mut self, start: &[f64], end: &[f64]) -> PlanningResult<PathValidity> {
        let inc = self.inc.clone();
        let path = self.interpolate(start, end, &inc)?;
        let mut result = PathValidity {
            valid: true,
            path_length: path.len(),
            num_checks: 0,
            dist: self.grid.max_distance(),
        };
        for waypoint in &path {
            let validity = self.check_state(waypoint, false)?;
            result.num_checks += 1;
            result.dist = result.dist.min(validity.dist);
            if !validity.valid {
                result.valid = false;
                break;
            }
        }
        Ok(result)
    }

    fn interpolate_path(&self, start: &[f64], end: &[f64], inc: &[f64]) -> PlanningResult<Vec<RobotState>> {
        self.interpolate(start, end, inc)
    }

    fn occupancy_grid(&self) -> Option<&OccupancyGrid> {
        Some(&self.grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::config::{
        CollisionGroupConfig, CollisionLinkConfig, CollisionModelConfig, CollisionSphereConfig, GroupKind,
    };
    use crate::test_fixtures::{
        arm_grid, arm_joints, floating_gripper, gripper_collision_config, gripper_grid, gripper_joints,
        two_link_arm, two_link_collision_config,
    };
    use crate::utils::GridCell;
    use approx::assert_relative_eq;

    fn arm_space() -> CollisionSpace {
        let model = CollisionModel::init(two_link_arm(), &two_link_collision_config()).unwrap();
        CollisionSpace::new(arm_grid(), model, "arm", &arm_joints()).unwrap()
    }

    /// One link holding a single sphere of radius 0.05 at its origin
    fn single_sphere_space() -> CollisionSpace {
        let config = CollisionModelConfig {
            collision_spheres: vec![CollisionSphereConfig::new("p0", [0.0; 3], 0.05, 0)],
            collision_groups: vec![CollisionGroupConfig {
                name: "single".to_string(),
                root_name: "base_link".to_string(),
                tip_name: "upper_arm".to_string(),
                kind: GroupKind::Spheres,
                links: vec![CollisionLinkConfig {
                    name: "upper_arm".to_string(),
                    spheres: vec!["p0".to_string()],
                }],
            }],
            allowed_collisions: vec![],
        };
        let model = CollisionModel::init(two_link_arm(), &config).unwrap();
        CollisionSpace::new(arm_grid(), model, "single", &["shoulder".to_string()]).unwrap()
    }

    /// Planning the forearm with the upper arm voxelized as group `body`
    fn body_space() -> CollisionSpace {
        let mut config = two_link_collision_config();
        config.collision_groups.push(CollisionGroupConfig {
            name: "body".to_string(),
            root_name: "base_link".to_string(),
            tip_name: "upper_arm".to_string(),
            kind: GroupKind::Voxels,
            links: vec![CollisionLinkConfig {
                name: "upper_arm".to_string(),
                spheres: vec!["ua0".to_string(), "ua1".to_string()],
            }],
        });
        let model = CollisionModel::init(two_link_arm(), &config).unwrap();
        CollisionSpace::new(arm_grid(), model, "forearm_only", &["elbow".to_string()]).unwrap()
    }

    fn gripper_space() -> CollisionSpace {
        let model = CollisionModel::init(floating_gripper(), &gripper_collision_config()).unwrap();
        CollisionSpace::new(gripper_grid(), model, "gripper", &gripper_joints()).unwrap()
    }

    #[test]
    fn test_environment_check_uses_distance_field() {
        let mut space = single_sphere_space();
        let cell = space.grid().world_to_grid(&Point3::origin());

        space.grid.set_distance(cell, 0.10);
        assert!(space.is_state_valid(&[0.0], false).unwrap().valid);

        space.grid.set_distance(cell, 0.03);
        let result = space.is_state_valid(&[0.0], false).unwrap();
        assert!(!result.valid);
        assert!(matches!(result.contact, Some(Contact::Environment { .. })));
    }

    #[test]
    fn test_padding_inflates_spheres() {
        let mut space = single_sphere_space();
        let cell = space.grid().world_to_grid(&Point3::origin());
        space.grid.set_distance(cell, 0.10);
        space.set_padding(0.06);
        assert!(!space.is_state_valid(&[0.0], false).unwrap().valid);
    }

    #[test]
    fn test_joint_limit_violation() {
        let mut space = arm_space();
        let result = space.is_state_valid(&[0.0, 3.0], false).unwrap();
        assert!(!result.valid);
        assert_eq!(
            result.contact,
            Some(Contact::JointLimit { joint: "elbow".to_string(), value: 3.0 })
        );
    }

    #[test]
    fn test_self_collision_and_allowed_pairs() {
        let mut space = arm_space();
        assert!(space.is_state_valid(&[0.0, 0.0], false).unwrap().valid);

        // folded elbow brings the forearm onto the upper arm
        let folded = [0.0, 2.5];
        let result = space.is_state_valid(&folded, false).unwrap();
        assert!(!result.valid);
        assert!(matches!(result.contact, Some(Contact::SelfCollision { .. })));

        let mut config = two_link_collision_config();
        config.allowed_collisions.push(("upper_arm".to_string(), "forearm".to_string()));
        let model = CollisionModel::init(two_link_arm(), &config).unwrap();
        let mut allowed = CollisionSpace::new(arm_grid(), model, "arm", &arm_joints()).unwrap();
        assert!(allowed.is_state_valid(&folded, false).unwrap().valid);
    }

    #[test]
    fn test_collision_object_lifecycle() {
        let mut space = arm_space();
        let table = CollisionObject::new("table", "map", ObjectOperation::Add).with_shape(
            Shape::Box { size: [0.2, 0.2, 0.2] },
            pose_from_xyz_rpy([0.75, 0.0, 0.0], [0.0; 3]),
        );
        space.process_collision_object(&table).unwrap();
        assert!(!space.is_state_valid(&[0.0, 0.0], false).unwrap().valid);
        assert!(matches!(
            space.process_collision_object(&table),
            Err(PlanningError::DuplicateObject(_))
        ));

        let mut moved = table.clone();
        moved.operation = ObjectOperation::Move;
        moved.shapes[0].1 = pose_from_xyz_rpy([0.75, 0.8, 0.0], [0.0; 3]);
        space.process_collision_object(&moved).unwrap();
        assert!(space.is_state_valid(&[0.0, 0.0], false).unwrap().valid);

        space.remove_collision_object("table").unwrap();
        assert!(space.collision_object_voxels().is_empty());
        assert_eq!(space.grid().occupied_count(), 0);
        assert!(matches!(
            space.remove_collision_object("table"),
            Err(PlanningError::UnknownObject(_))
        ));
    }

    #[test]
    fn test_append_and_remove_all() {
        let mut space = arm_space();
        let wall = CollisionObject::new("wall", "map", ObjectOperation::Add)
            .with_shape(Shape::Sphere { radius: 0.12 }, pose_from_xyz_rpy([-0.5, -0.5, 0.0], [0.0; 3]));
        space.process_collision_object(&wall).unwrap();
        let before = space.collision_object_voxels().len();

        let extra = CollisionObject::new("wall", "map", ObjectOperation::Append)
            .with_shape(Shape::Sphere { radius: 0.12 }, pose_from_xyz_rpy([-0.5, 0.5, 0.0], [0.0; 3]));
        space.process_collision_object(&extra).unwrap();
        assert_eq!(space.collision_object_voxels().len(), 2 * before);
        assert_eq!(space.collision_object("wall").unwrap().shapes.len(), 2);

        let missing = CollisionObject::new("shelf", "map", ObjectOperation::Append);
        assert!(space.process_collision_object(&missing).is_err());

        space.remove_all_collision_objects();
        assert!(space.collision_object_names().is_empty());
        assert_eq!(space.grid().occupied_count(), 0);
    }

    #[test]
    fn test_object_in_wrong_frame_rejected() {
        let mut space = arm_space();
        let object = CollisionObject::new("cup", "base_link", ObjectOperation::Add)
            .with_shape(Shape::Sphere { radius: 0.05 }, Pose::identity());
        assert!(space.process_collision_object(&object).is_err());
        assert!(space.collision_object_names().is_empty());
    }

    #[test]
    fn test_attach_then_remove_excludes_object() {
        let mut space = arm_space();
        let cell = space.grid().world_to_grid(&Point3::new(1.2, 0.0, 0.0));
        space.grid.set_distance(cell, 0.05);
        assert!(space.is_state_valid(&[0.0, 0.0], false).unwrap().valid);

        // sphere of radius 0.1 held 0.2 beyond the forearm frame at (0.5, 0, 0)
        space
            .attach_object(
                "ball",
                &[(Shape::Sphere { radius: 0.1 }, pose_from_xyz_rpy([0.7, 0.0, 0.0], [0.0; 3]))],
                "forearm",
            )
            .unwrap();
        assert_eq!(space.attached_object_spheres(&[0.0, 0.0]).unwrap().len(), 1);
        assert!(!space.is_state_valid(&[0.0, 0.0], false).unwrap().valid);

        space.remove_attached_object();
        assert!(!space.has_attached_object());
        assert!(space.attached_object_spheres(&[0.0, 0.0]).unwrap().is_empty());
        assert!(space.is_state_valid(&[0.0, 0.0], false).unwrap().valid);
    }

    #[test]
    fn test_attach_to_unknown_link_fails() {
        let mut space = arm_space();
        let result = space.attach_object("ball", &[(Shape::Sphere { radius: 0.1 }, Pose::identity())], "gripper");
        assert!(matches!(result, Err(PlanningError::UnknownLink(_))));
    }

    #[test]
    fn test_interpolate_path_steps() {
        let space = arm_space();
        let path = space
            .interpolate_path(&[0.0, 0.0], &[0.1, -0.05], &[0.02, 0.02])
            .unwrap();
        assert_eq!(path.len(), 6);
        assert_relative_eq!(path[5][0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(path[5][1], -0.05, epsilon = 1e-12);
        assert!(space.interpolate_path(&[0.0], &[0.1, 0.0], &[0.02, 0.02]).is_err());
    }

    #[test]
    fn test_continuous_joint_takes_shorter_arc() {
        let mut space = gripper_space();
        space.set_increments(&[0.02; 7]).unwrap();
        let start = [1.0, 1.0, 1.0, 3.1, 0.0, 0.0, 0.0];
        let end = [1.0, 1.0, 1.0, -3.1, 0.0, 0.0, 0.0];

        let path = space.interpolate_path(&start, &end, space.increments()).unwrap();
        // 0.083 rad through +pi rather than 6.2 rad through zero
        assert_eq!(path.len(), 6);
        assert!(path.iter().all(|q| q[3].abs() >= 3.1 - 1e-9));
        assert!(path[2][3] > 0.0 && path[3][3] < 0.0);
        assert_relative_eq!(path[5][3], -3.1, epsilon = 1e-9);

        let result = space.is_state_to_state_valid(&start, &end).unwrap();
        assert!(result.valid);
        assert_eq!(result.path_length, 6);
    }

    #[test]
    fn test_per_joint_increments() {
        let mut space = gripper_space();
        let start = [1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        let end = [1.15, 1.0, 1.0, 0.09, 0.0, 0.0, 0.0];

        // the fine yaw increment sets the step count
        space.set_increments(&[0.1, 0.1, 0.1, 0.02, 0.1, 0.1, 0.1]).unwrap();
        assert_eq!(space.is_state_to_state_valid(&start, &end).unwrap().path_length, 6);

        space.set_increments(&[0.1, 0.1, 0.1, 0.05, 0.1, 0.1, 0.1]).unwrap();
        let result = space.is_state_to_state_valid(&start, &end).unwrap();
        assert_eq!(result.path_length, 3);
        assert_eq!(result.num_checks, 3);

        assert!(space.set_increments(&[0.1; 3]).is_err());
        assert!(space.set_increments(&[0.1, 0.1, 0.1, 0.0, 0.1, 0.1, 0.1]).is_err());
        assert_relative_eq!(space.increments()[3], 0.05);
    }

    #[test]
    fn test_voxel_group_is_an_obstacle() {
        let mut space = body_space();
        let voxels = space.voxel_group_voxels("body").unwrap();
        assert!(!voxels.is_empty());
        assert!(space.voxel_group_voxels("forearm_only").is_none());
        let ua0 = space.grid().world_to_grid(&Point3::new(0.25, 0.0, 0.0));
        assert!(space.grid().is_occupied(ua0));

        // forearm stretched out keeps clear of the upper arm
        assert!(space.is_state_valid(&[0.0], false).unwrap().valid);

        // forearm pulled back onto the upper arm
        space
            .model_mut()
            .set_group_to_world_transform("forearm_only", pose_from_xyz_rpy([-0.55, 0.0, 0.0], [0.0; 3]))
            .unwrap();
        let result = space.is_state_valid(&[0.0], false).unwrap();
        assert!(!result.valid);
        assert!(matches!(result.contact, Some(Contact::Environment { .. })));
    }

    #[test]
    fn test_voxel_group_follows_joint_positions() {
        let mut space = body_space();
        let ua0 = space.grid().world_to_grid(&Point3::new(0.25, 0.0, 0.0));

        // joints outside of the voxel group leave the grid untouched
        let revision = space.grid().revision();
        space.set_joint_position("elbow", 0.3).unwrap();
        assert_eq!(space.grid().revision(), revision);

        space.set_joint_position("shoulder", std::f64::consts::FRAC_PI_2).unwrap();
        assert!(!space.grid().is_occupied(ua0));
        let rotated = space.grid().world_to_grid(&Point3::new(0.0, 0.25, 0.0));
        assert!(space.grid().is_occupied(rotated));

        space
            .set_world_to_model_transform(&pose_from_xyz_rpy([0.0, 0.0, 0.1], [0.0; 3]))
            .unwrap();
        assert!(!space.grid().is_occupied(rotated));
        let lifted = space.grid().world_to_grid(&Point3::new(0.0, 0.25, 0.1));
        assert!(space.grid().is_occupied(lifted));
    }

    #[test]
    fn test_state_to_state_stops_at_first_invalid() {
        let mut space = arm_space();
        let ok = space.is_state_to_state_valid(&[0.0, 0.0], &[0.5, 0.5]).unwrap();
        assert!(ok.valid);
        assert_eq!(ok.num_checks, ok.path_length);

        let bad = space.is_state_to_state_valid(&[0.0, 0.0], &[0.0, 2.5]).unwrap();
        assert!(!bad.valid);
        assert!(bad.num_checks < bad.path_length);
    }

    #[test]
    fn test_validity_is_deterministic() {
        let mut space = arm_space();
        let a = space.is_state_valid(&[0.3, 2.4], true).unwrap();
        let b = space.is_state_valid(&[0.3, 2.4], true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_verbose_tracks_minimum_clearance() {
        let mut space = arm_space();
        let quick = space.is_state_valid(&[0.0, 2.5], false).unwrap();
        let full = space.is_state_valid(&[0.0, 2.5], true).unwrap();
        assert!(!full.valid);
        assert!(full.dist <= quick.dist);
    }

    #[test]
    fn test_clearance_query() {
        let mut space = arm_space();
        let obstacle = Point3::new(0.25, 0.3, 0.0);
        space.grid.add_points(&[obstacle]);
        let c = space.clearance(&[0.0, 0.0], 1).unwrap();
        // ua0 at (0.25, 0, 0) with radius 0.05
        assert_relative_eq!(c.minimum, 0.25, epsilon = 1e-9);
        assert_relative_eq!(c.average, 0.25, epsilon = 1e-9);
        let all = space.clearance(&[0.0, 0.0], 10).unwrap();
        assert!(all.minimum <= c.minimum);
    }

    #[test]
    fn test_collision_spheres_world_frame() {
        let mut space = arm_space();
        let spheres = space.collision_spheres(&[std::f64::consts::FRAC_PI_2, 0.0]).unwrap();
        assert_eq!(spheres.len(), 4);
        assert_relative_eq!(spheres[0][1], 0.25, epsilon = 1e-12);
        assert_relative_eq!(spheres[0][3], 0.05);
    }

    #[test]
    fn test_unknown_group_rejected() {
        let model = CollisionModel::init(two_link_arm(), &two_link_collision_config()).unwrap();
        assert!(matches!(
            CollisionSpace::new(arm_grid(), model, "left_arm", &arm_joints()),
            Err(PlanningError::UnknownGroup { .. })
        ));
    }

    #[test]
    fn test_out_of_grid_sphere_is_invalid() {
        let mut space = arm_space();
        space
            .set_world_to_model_transform(&pose_from_xyz_rpy([50.0, 0.0, 0.0], [0.0; 3]))
            .unwrap();
        assert!(!space.is_state_valid(&[0.0, 0.0], false).unwrap().valid);
        let cell = GridCell::new(-1, 0, 0);
        assert_relative_eq!(space.grid().distance(cell), 0.0);
    }
}
