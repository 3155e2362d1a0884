//! Error types for rust_arm_planning

use thiserror::Error;

/// Main error type for collision checking and lattice planning.
///
/// Geometric invalidity (collisions, joint limits) is never reported
/// through this type; validity queries return it as plain data.
#[derive(Debug, Error)]
pub enum PlanningError {
    /// Malformed configuration (sphere, group, primitive or grid parameters)
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Collision group lookup failed
    #[error("unknown group '{name}' (available: {})", available.join(", "))]
    UnknownGroup { name: String, available: Vec<String> },

    /// Joint lookup failed
    #[error("unknown joint '{0}'")]
    UnknownJoint(String),

    /// Link lookup failed
    #[error("unknown link '{0}'")]
    UnknownLink(String),

    /// A query needed the default group before one was selected
    #[error("no default collision group has been selected")]
    NoDefaultGroup,

    /// Collision object named in REMOVE/APPEND/MOVE is not present
    #[error("unknown collision object '{0}'")]
    UnknownObject(String),

    /// Collision object named in ADD is already present
    #[error("collision object '{0}' already exists")]
    DuplicateObject(String),

    /// World point falls outside of a grid
    #[error("point ({x:.3}, {y:.3}, {z:.3}) is outside of the grid")]
    OutOfBounds { x: f64, y: f64, z: f64 },

    /// Sphere positions were requested from kinematics computed for an
    /// older joint configuration
    #[error("kinematics of group '{0}' are stale; compute FK before querying spheres")]
    StaleKinematics(String),

    /// Joint vector length does not match the expected degrees of freedom
    #[error("expected {expected} joint values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// State id that was never handed out by the lattice
    #[error("unknown state id {0}")]
    UnknownStateId(usize),

    /// Start state violates joint limits or is in collision
    #[error("invalid start state: {0}")]
    InvalidStart(String),

    /// Operation not supported by this configuration
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Path extraction could not reconstruct a transition
    #[error("path extraction failed: {0}")]
    PathExtraction(String),

    /// Configuration text could not be parsed
    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl PlanningError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported(reason.into())
    }

    /// Checks a joint vector length against the expected count.
    pub fn check_dimension(expected: usize, actual: usize) -> PlanningResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch { expected, actual })
        }
    }
}

/// Result type alias for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;
