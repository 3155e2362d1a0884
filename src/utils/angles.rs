//! Angle helpers

use std::f64::consts::PI;

/// Normalize angle to [-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let a = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if a == -PI {
        PI
    } else {
        a
    }
}

/// Normalize angle to [0, 2pi)
pub fn normalize_angle_positive(angle: f64) -> f64 {
    angle.rem_euclid(2.0 * PI)
}

/// Signed difference `a - b` through the shorter arc
pub fn shortest_angle_diff(a: f64, b: f64) -> f64 {
    normalize_angle(a - b)
}

pub fn shortest_angle_dist(a: f64, b: f64) -> f64 {
    shortest_angle_diff(a, b).abs()
}
