//! Utility modules for rust_arm_planning

pub mod angles;
pub mod occupancy_grid;

pub use angles::*;
pub use occupancy_grid::*;
