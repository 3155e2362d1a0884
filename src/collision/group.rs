//! Sphere approximation of one kinematic subchain
//!
//! A `Group` owns its spheres and a cache of link transforms. The cache is
//! tagged with the generation of the joint configuration it was computed
//! from; every mutation of joint positions or of the world transform bumps
//! the generation, so reading spheres from a stale cache fails instead of
//! silently returning old geometry.

use tracing::debug;

use crate::collision::config::{CollisionGroupConfig, CollisionSphereConfig, GroupKind};
use crate::collision::sphere::{Sphere, WorldSphere};
use crate::common::{PlanningError, PlanningResult, Pose};
use crate::robot::{KinematicChain, RobotDescription};

/// A link of the group with its spheres
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLink {
    pub name: String,
    /// Frame index within the group's chain
    pub frame: usize,
    pub spheres: Vec<Sphere>,
}

/// World-frame link transforms computed for one joint configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFrames {
    generation: u64,
    frames: Vec<Pose>,
}

impl LinkFrames {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// One transform per chain frame, root first
    pub fn frames(&self) -> &[Pose] {
        &self.frames
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    kind: GroupKind,
    chain: KinematicChain,
    links: Vec<GroupLink>,
    /// Expected order of joint values passed to `compute_fk`
    joint_order: Vec<String>,
    /// Chain segment driven by each entry of `joint_order`
    input_segments: Vec<usize>,
    segment_values: Vec<f64>,
    world_from_group: Pose,
    generation: u64,
    cache: Option<LinkFrames>,
}

impl Group {
    pub fn init(
        description: &RobotDescription,
        config: &CollisionGroupConfig,
        spheres: &[CollisionSphereConfig],
    ) -> PlanningResult<Self> {
        let chain = description.chain(&config.root_name, &config.tip_name)?;

        let mut links = Vec::with_capacity(config.links.len());
        for link in &config.links {
            let frame = chain
                .frame_index(&link.name)
                .ok_or_else(|| PlanningError::UnknownLink(link.name.clone()))?;
            let link_spheres = link
                .spheres
                .iter()
                .map(|name| {
                    spheres
                        .iter()
                        .find(|s| &s.name == name)
                        .map(Sphere::from)
                        .ok_or_else(|| {
                            PlanningError::invalid_config(format!(
                                "group '{}' references unknown sphere '{}'",
                                config.name, name
                            ))
                        })
                })
                .collect::<PlanningResult<Vec<Sphere>>>()?;
            links.push(GroupLink {
                name: link.name.clone(),
                frame,
                spheres: link_spheres,
            });
        }

        let joint_order = chain.movable_joint_names();
        let input_segments = joint_order
            .iter()
            .filter_map(|j| chain.segment_index(j))
            .collect();
        let segment_values = vec![0.0; chain.segments().len()];

        Ok(Self {
            name: config.name.clone(),
            kind: config.kind,
            chain,
            links,
            joint_order,
            input_segments,
            segment_values,
            world_from_group: Pose::identity(),
            generation: 0,
            cache: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn reference_frame(&self) -> &str {
        self.chain.root()
    }

    pub fn tip_frame(&self) -> &str {
        self.chain.tip()
    }

    pub fn chain(&self) -> &KinematicChain {
        &self.chain
    }

    pub fn links(&self) -> &[GroupLink] {
        &self.links
    }

    pub fn link_index(&self, name: &str) -> Option<usize> {
        self.links.iter().position(|l| l.name == name)
    }

    pub fn joint_names(&self) -> &[String] {
        &self.joint_order
    }

    pub fn dof(&self) -> usize {
        self.joint_order.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn sphere_count(&self) -> usize {
        self.links.iter().map(|l| l.spheres.len()).sum()
    }

    /// (chain, segment) of a link in this group. Groups hold a single chain.
    pub fn frame_info(&self, link: &str) -> Option<(usize, usize)> {
        self.chain.frame_index(link).map(|frame| (0, frame))
    }

    fn invalidate(&mut self) {
        self.generation += 1;
    }

    /// Change the expected order of joint values. `names` must be a
    /// permutation of the group's movable joints.
    pub fn set_order_of_joint_positions(&mut self, names: &[String]) -> PlanningResult<()> {
        PlanningError::check_dimension(self.joint_order.len(), names.len())?;
        let mut segments = Vec::with_capacity(names.len());
        for name in names {
            if !self.joint_order.contains(name) {
                return Err(PlanningError::UnknownJoint(name.clone()));
            }
            let segment = self
                .chain
                .segment_index(name)
                .ok_or_else(|| PlanningError::UnknownJoint(name.clone()))?;
            if segments.contains(&segment) {
                return Err(PlanningError::invalid_config(format!(
                    "joint '{}' listed twice",
                    name
                )));
            }
            segments.push(segment);
        }
        self.joint_order = names.to_vec();
        self.input_segments = segments;
        self.invalidate();
        Ok(())
    }

    /// Set the position of one chain joint. Returns false when the joint is
    /// not part of this group.
    pub fn set_joint_position(&mut self, name: &str, position: f64) -> bool {
        match self.chain.segment_index(name) {
            Some(segment) => {
                self.segment_values[segment] = position;
                self.invalidate();
                true
            }
            None => false,
        }
    }

    pub fn group_to_world_transform(&self) -> &Pose {
        &self.world_from_group
    }

    pub fn set_group_to_world_transform(&mut self, world_from_group: Pose) {
        self.world_from_group = world_from_group;
        self.invalidate();
        debug!("group '{}' placed at {:?}", self.name, world_from_group.translation.vector);
    }

    /// Set the group's joint values and recompute every link transform in
    /// the world frame.
    pub fn compute_fk(&mut self, angles: &[f64]) -> PlanningResult<&LinkFrames> {
        PlanningError::check_dimension(self.joint_order.len(), angles.len())?;
        for (&segment, &value) in self.input_segments.iter().zip(angles) {
            self.segment_values[segment] = value;
        }
        Ok(self.update_fk())
    }

    /// Recompute every link transform from the joint positions already set
    pub fn update_fk(&mut self) -> &LinkFrames {
        self.invalidate();
        let frames = self
            .chain
            .frames(&self.segment_values)
            .into_iter()
            .map(|f| self.world_from_group * f)
            .collect();
        self.cache.insert(LinkFrames {
            generation: self.generation,
            frames,
        })
    }

    /// Link transforms of the current joint configuration
    pub fn frames(&self) -> PlanningResult<&LinkFrames> {
        match &self.cache {
            Some(cache) if cache.generation == self.generation => Ok(cache),
            _ => Err(PlanningError::StaleKinematics(self.name.clone())),
        }
    }

    pub fn link_pose(&self, link: usize) -> PlanningResult<Pose> {
        let frames = self.frames()?;
        let group_link = self.links.get(link).ok_or_else(|| {
            PlanningError::UnknownLink(format!("{}#{}", self.name, link))
        })?;
        Ok(frames.frames[group_link.frame])
    }

    /// World-frame spheres of the current joint configuration, link order
    pub fn spheres(&self) -> PlanningResult<Vec<WorldSphere>> {
        let frames = self.frames()?;
        let mut spheres = Vec::with_capacity(self.sphere_count());
        for (link_index, link) in self.links.iter().enumerate() {
            let pose = &frames.frames[link.frame];
            for (index, sphere) in link.spheres.iter().enumerate() {
                spheres.push(WorldSphere {
                    center: sphere.world_center(pose),
                    radius: sphere.radius,
                    link: link_index,
                    index,
                    priority: sphere.priority,
                    attached: false,
                });
            }
        }
        Ok(spheres)
    }

    pub fn print(&self) {
        debug!(
            "group '{}': {} -> {}, joints {:?}",
            self.name,
            self.reference_frame(),
            self.tip_frame(),
            self.joint_order
        );
        for link in &self.links {
            debug!("  link '{}' (frame {}): {} spheres", link.name, link.frame, link.spheres.len());
        }
    }
}
