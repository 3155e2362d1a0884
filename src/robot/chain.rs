//! Serial kinematic chain and its forward kinematics

use crate::common::Pose;
use crate::robot::description::JointSpec;

/// Ordered joints from a root link to a tip link.
///
/// Link frames are indexed with 0 for the root link and `i + 1` for the
/// child link of segment `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicChain {
    root: String,
    tip: String,
    segments: Vec<JointSpec>,
}

impl KinematicChain {
    pub fn new(root: &str, tip: &str, segments: Vec<JointSpec>) -> Self {
        Self {
            root: root.to_string(),
            tip: tip.to_string(),
            segments,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn tip(&self) -> &str {
        &self.tip
    }

    pub fn segments(&self) -> &[JointSpec] {
        &self.segments
    }

    pub fn num_frames(&self) -> usize {
        self.segments.len() + 1
    }

    /// Names of the movable joints, root to tip
    pub fn movable_joint_names(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter(|s| s.is_movable())
            .map(|s| s.name.clone())
            .collect()
    }

    pub fn segment_index(&self, joint: &str) -> Option<usize> {
        self.segments.iter().position(|s| s.name == joint)
    }

    pub fn frame_index(&self, link: &str) -> Option<usize> {
        if link == self.root {
            return Some(0);
        }
        self.segments.iter().position(|s| s.child == link).map(|i| i + 1)
    }

    pub fn frame_name(&self, index: usize) -> Option<&str> {
        match index {
            0 => Some(&self.root),
            i => self.segments.get(i - 1).map(|s| s.child.as_str()),
        }
    }

    /// Transforms of every link frame relative to the root link.
    /// `values` holds one position per segment; fixed segments ignore theirs.
    pub fn frames(&self, values: &[f64]) -> Vec<Pose> {
        let mut frames = Vec::with_capacity(self.num_frames());
        let mut current = Pose::identity();
        frames.push(current);
        for (i, segment) in self.segments.iter().enumerate() {
            let q = values.get(i).copied().unwrap_or(0.0);
            current *= segment.transform(q);
            frames.push(current);
        }
        frames
    }

    pub fn tip_transform(&self, values: &[f64]) -> Pose {
        self.segments
            .iter()
            .enumerate()
            .fold(Pose::identity(), |acc, (i, s)| {
                acc * s.transform(values.get(i).copied().unwrap_or(0.0))
            })
    }
}
