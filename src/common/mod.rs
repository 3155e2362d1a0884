//! Common types, traits, and error definitions for rust_arm_planning
//!
//! This module provides the foundational building blocks shared by the
//! collision space, the workspace lattice and the heuristics.

pub mod types;
pub mod traits;
pub mod error;

pub use types::*;
pub use traits::*;
pub use error::*;
