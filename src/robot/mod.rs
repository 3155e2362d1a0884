//! Robot kinematics
//!
//! - `description`: links and joints of a robot
//! - `chain`: serial chains and their forward kinematics
//! - `model`: planning model with redundant-joint inverse kinematics

pub mod description;
pub mod chain;
pub mod model;

pub use description::{JointKind, JointSpec, RobotDescription};
pub use chain::KinematicChain;
pub use model::{ChainRobotModel, IkConfig};
