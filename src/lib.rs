//! rust_arm_planning - search-based motion planning core for manipulators
//!
//! This crate provides a sphere-based collision space, a discretized
//! workspace lattice and a multi-frame wavefront heuristic that together
//! feed a best-first graph search.

// Core modules
pub mod common;
pub mod utils;

// Robot model
pub mod robot;

// Planning modules
pub mod collision;
pub mod lattice;
pub mod heuristic;

#[cfg(test)]
mod test_fixtures;

// Re-export common types for convenience
pub use common::{GoalConstraint, JointLimits, Pose, RobotState, StateId, Successor, INFINITE_COST};
pub use common::{CollisionChecker, PlanningSpace, RobotHeuristic};
pub use common::{PlanningError, PlanningResult};
