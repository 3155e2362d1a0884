//! Lattice states and their discrete coordinates

use std::cell::Cell;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::common::RobotState;

/// Discretized workspace pose: position cells (x, y, z), orientation bins
/// (roll, pitch, yaw), then one cell per redundant joint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WorkspaceCoord(pub Vec<i32>);

impl WorkspaceCoord {
    pub fn new(values: Vec<i32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[i32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WorkspaceCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

/// A node of the workspace lattice.
///
/// Equality and hashing only look at the coordinate. The heuristic value is
/// cached together with the goal epoch it was computed for.
#[derive(Debug, Clone)]
pub struct WorkspaceLatticeState {
    pub coord: WorkspaceCoord,
    pub state: RobotState,
    h: Cell<Option<(u64, i32)>>,
}

impl WorkspaceLatticeState {
    pub fn new(coord: WorkspaceCoord, state: RobotState) -> Self {
        Self {
            coord,
            state,
            h: Cell::new(None),
        }
    }

    /// Cached heuristic value if it was computed for `epoch`
    pub fn cached_heuristic(&self, epoch: u64) -> Option<i32> {
        match self.h.get() {
            Some((e, h)) if e == epoch => Some(h),
            _ => None,
        }
    }

    pub fn cache_heuristic(&self, epoch: u64, h: i32) {
        self.h.set(Some((epoch, h)));
    }
}

impl PartialEq for WorkspaceLatticeState {
    fn eq(&self, other: &Self) -> bool {
        self.coord == other.coord
    }
}

impl Eq for WorkspaceLatticeState {}

impl Hash for WorkspaceLatticeState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coord.hash(state);
    }
}

impl fmt::Display for WorkspaceLatticeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ coord: {}, state: [", self.coord)?;
        for (i, v) in self.state.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.3}", v)?;
        }
        write!(f, "] }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_equality_ignores_continuous_state() {
        let a = WorkspaceLatticeState::new(WorkspaceCoord::new(vec![1, 2, 3]), vec![0.1]);
        let b = WorkspaceLatticeState::new(WorkspaceCoord::new(vec![1, 2, 3]), vec![0.2]);
        let c = WorkspaceLatticeState::new(WorkspaceCoord::new(vec![1, 2, 4]), vec![0.1]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_heuristic_cache_epoch() {
        let s = WorkspaceLatticeState::new(WorkspaceCoord::default(), vec![]);
        assert_eq!(s.cached_heuristic(0), None);
        s.cache_heuristic(3, 42);
        assert_eq!(s.cached_heuristic(3), Some(42));
        assert_eq!(s.cached_heuristic(4), None);
    }

    #[test]
    fn test_display() {
        let s = WorkspaceLatticeState::new(WorkspaceCoord::new(vec![1, -2]), vec![0.5, 1.25]);
        assert_eq!(s.to_string(), "{ coord: (1, -2), state: [0.500, 1.250] }");
    }
}
