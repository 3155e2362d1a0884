//! Collision spheres

use nalgebra::{Point3, Vector3};

use crate::collision::config::CollisionSphereConfig;
use crate::common::Pose;

/// Sphere rigidly attached to a link, expressed in the link frame
#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    pub name: String,
    pub center: Vector3<f64>,
    pub radius: f64,
    /// Lower values are more representative of the link; used to pick
    /// spheres for clearance queries
    pub priority: i32,
}

impl Sphere {
    pub fn new(name: &str, center: Vector3<f64>, radius: f64, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            center,
            radius,
            priority,
        }
    }

    pub fn world_center(&self, link_pose: &Pose) -> Point3<f64> {
        link_pose * Point3::from(self.center)
    }
}

impl From<&CollisionSphereConfig> for Sphere {
    fn from(config: &CollisionSphereConfig) -> Self {
        Sphere::new(
            &config.name,
            Vector3::new(config.x, config.y, config.z),
            config.radius,
            config.priority,
        )
    }
}

/// A sphere placed in the world frame by forward kinematics
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSphere {
    pub center: Point3<f64>,
    pub radius: f64,
    /// Index of the owning link within its group
    pub link: usize,
    /// Index of the sphere within its link (or within the attached object)
    pub index: usize,
    pub priority: i32,
    pub attached: bool,
}

impl WorldSphere {
    /// Signed distance between the surfaces of two spheres
    pub fn clearance(&self, other: &WorldSphere) -> f64 {
        (self.center - other.center).norm() - (self.radius + other.radius)
    }
}
