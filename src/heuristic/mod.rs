//! Search heuristics over the occupancy grid
//!
//! - `wavefront`: BFS distance field from a seed cell
//! - `multi_frame_bfs`: two-wavefront goal heuristic

pub mod wavefront;
pub mod multi_frame_bfs;

pub use wavefront::{Wavefront, UNDISCOVERED};
pub use multi_frame_bfs::{HeuristicConfig, MultiFrameBfsHeuristic};
