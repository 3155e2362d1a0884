//! Workspace lattice planning space
//!
//! - `state`: discrete coordinates and lattice states
//! - `config`: resolutions and motion primitives
//! - `workspace_lattice`: state expansion over the collision checker

pub mod state;
pub mod config;
pub mod workspace_lattice;

pub use state::{WorkspaceCoord, WorkspaceLatticeState};
pub use config::{MotionPrimitive, WorkspaceLatticeConfig};
pub use workspace_lattice::{WorkspaceLattice, WorkspaceState};
