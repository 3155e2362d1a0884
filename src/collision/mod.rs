//! Sphere-based collision checking
//!
//! - `config`: sphere, group and allowed-collision configuration
//! - `sphere`: link-frame and world-frame spheres
//! - `group`: spheres of one kinematic subchain and their forward kinematics
//! - `model`: every group of a robot, with a default group
//! - `object`: collision objects and voxelization
//! - `attached`: objects attached to a link, approximated by spheres
//! - `space`: validity queries against the grid and the robot itself

pub mod config;
pub mod sphere;
pub mod group;
pub mod model;
pub mod object;
pub mod attached;
pub mod space;

pub use config::{
    AllowedCollisions, CollisionGroupConfig, CollisionLinkConfig, CollisionModelConfig,
    CollisionSphereConfig, GroupKind,
};
pub use sphere::{Sphere, WorldSphere};
pub use group::{Group, GroupLink, LinkFrames};
pub use model::CollisionModel;
pub use object::{voxelize_shape, CollisionObject, ObjectOperation, Shape};
pub use attached::AttachedObject;
pub use space::{Clearance, CollisionSpace, DEFAULT_INCREMENT};
