//! Robots, collision models and grids shared by the unit tests

use nalgebra::Point3;

use crate::collision::{
    CollisionGroupConfig, CollisionLinkConfig, CollisionModelConfig, CollisionSphereConfig,
    GroupKind,
};
use crate::robot::{JointKind, JointSpec, RobotDescription};
use crate::utils::OccupancyGrid;

/// Planar arm in the xy plane: two 0.5 m links driven by `shoulder` and
/// `elbow` about z, with a fixed `tool` frame at the end of the forearm.
pub fn two_link_arm() -> RobotDescription {
    let mut robot = RobotDescription::new("two_link_arm", "base_link");
    robot
        .add_joint(JointSpec::new(
            "shoulder",
            "base_link",
            "upper_arm",
            JointKind::Revolute { lower: -3.1, upper: 3.1 },
        ))
        .add_joint(
            JointSpec::new(
                "elbow",
                "upper_arm",
                "forearm",
                JointKind::Revolute { lower: -2.5, upper: 2.5 },
            )
            .with_origin([0.5, 0.0, 0.0], [0.0; 3]),
        )
        .add_joint(
            JointSpec::new("tool_joint", "forearm", "tool", JointKind::Fixed)
                .with_origin([0.5, 0.0, 0.0], [0.0; 3]),
        );
    robot
}

pub fn arm_joints() -> Vec<String> {
    vec!["shoulder".to_string(), "elbow".to_string()]
}

/// Group `arm` covering both links, and group `forearm_only` rooted at the
/// upper arm
pub fn two_link_collision_config() -> CollisionModelConfig {
    CollisionModelConfig {
        collision_spheres: vec![
            CollisionSphereConfig::new("ua0", [0.25, 0.0, 0.0], 0.05, 0),
            CollisionSphereConfig::new("ua1", [0.45, 0.0, 0.0], 0.05, 1),
            CollisionSphereConfig::new("fa0", [0.1, 0.0, 0.0], 0.05, 1),
            CollisionSphereConfig::new("fa1", [0.3, 0.0, 0.0], 0.05, 2),
        ],
        collision_groups: vec![
            CollisionGroupConfig {
                name: "arm".to_string(),
                root_name: "base_link".to_string(),
                tip_name: "tool".to_string(),
                kind: GroupKind::Spheres,
                links: vec![
                    CollisionLinkConfig {
                        name: "upper_arm".to_string(),
                        spheres: vec!["ua0".to_string(), "ua1".to_string()],
                    },
                    CollisionLinkConfig {
                        name: "forearm".to_string(),
                        spheres: vec!["fa0".to_string(), "fa1".to_string()],
                    },
                ],
            },
            CollisionGroupConfig {
                name: "forearm_only".to_string(),
                root_name: "upper_arm".to_string(),
                tip_name: "tool".to_string(),
                kind: GroupKind::Spheres,
                links: vec![CollisionLinkConfig {
                    name: "forearm".to_string(),
                    spheres: vec!["fa0".to_string(), "fa1".to_string()],
                }],
            },
        ],
        allowed_collisions: vec![],
    }
}

/// 2.5 m square around the arm base, 5 cm cells
pub fn arm_grid() -> OccupancyGrid {
    OccupancyGrid::new([50, 50, 10], 0.05, Point3::new(-1.25, -1.25, -0.25), 0.5).unwrap()
}

/// Free-flying body: prismatic x, y, z, then yaw, pitch and roll, and a
/// redundant `wrist` roll in front of the `gripper` link.
pub fn floating_gripper() -> RobotDescription {
    let mut robot = RobotDescription::new("floating_gripper", "world");
    let prismatic = JointKind::Prismatic { lower: -1.0, upper: 2.0 };
    robot
        .add_joint(JointSpec::new("x", "world", "x_link", prismatic).with_axis([1.0, 0.0, 0.0]))
        .add_joint(JointSpec::new("y", "x_link", "y_link", prismatic).with_axis([0.0, 1.0, 0.0]))
        .add_joint(JointSpec::new("z", "y_link", "z_link", prismatic).with_axis([0.0, 0.0, 1.0]))
        .add_joint(JointSpec::new("yaw", "z_link", "yaw_link", JointKind::Continuous))
        .add_joint(
            JointSpec::new(
                "pitch",
                "yaw_link",
                "pitch_link",
                JointKind::Revolute { lower: -1.5, upper: 1.5 },
            )
            .with_axis([0.0, 1.0, 0.0]),
        )
        .add_joint(
            JointSpec::new("roll", "pitch_link", "roll_link", JointKind::Continuous)
                .with_axis([1.0, 0.0, 0.0]),
        )
        .add_joint(
            JointSpec::new(
                "wrist",
                "roll_link",
                "gripper",
                JointKind::Revolute {
                    lower: -std::f64::consts::PI,
                    upper: std::f64::consts::PI,
                },
            )
            .with_axis([1.0, 0.0, 0.0]),
        );
    robot
}

pub fn gripper_joints() -> Vec<String> {
    ["x", "y", "z", "yaw", "pitch", "roll", "wrist"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Group `gripper` with two spheres on the gripper link
pub fn gripper_collision_config() -> CollisionModelConfig {
    CollisionModelConfig {
        collision_spheres: vec![
            CollisionSphereConfig::new("palm", [0.0; 3], 0.05, 0),
            CollisionSphereConfig::new("fingers", [0.08, 0.0, 0.0], 0.03, 1),
        ],
        collision_groups: vec![CollisionGroupConfig {
            name: "gripper".to_string(),
            root_name: "world".to_string(),
            tip_name: "gripper".to_string(),
            kind: GroupKind::Spheres,
            links: vec![CollisionLinkConfig {
                name: "gripper".to_string(),
                spheres: vec!["palm".to_string(), "fingers".to_string()],
            }],
        }],
        allowed_collisions: vec![],
    }
}

/// 2 m cube with 10 cm cells starting at the world origin
pub fn gripper_grid() -> OccupancyGrid {
    OccupancyGrid::new([20, 20, 20], 0.1, Point3::origin(), 0.5).unwrap()
}
