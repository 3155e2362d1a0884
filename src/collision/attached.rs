//! Objects rigidly attached to a robot link
//!
//! Attached geometry is approximated by spheres in the frame of its parent
//! link. Boxes and meshes are covered by spheres of a fixed radius, cylinders
//! and cones by one sphere per slab, spheres map to themselves.

use std::collections::HashSet;

use nalgebra::{Point3, Vector3};

use crate::collision::object::{sample_triangle, Shape};
use crate::collision::sphere::Sphere;
use crate::common::{PlanningResult, Pose};

/// Object carried by a link, expressed as spheres in the link frame
#[derive(Debug, Clone, PartialEq)]
pub struct AttachedObject {
    pub name: String,
    pub link_name: String,
    /// Index of the parent link within the active group
    pub link_index: usize,
    pub spheres: Vec<Sphere>,
}

impl AttachedObject {
    /// Approximate `shapes` (posed in the link frame) with spheres.
    /// `sphere_radius` sets the size of the spheres covering boxes and meshes.
    pub fn new(
        name: &str,
        link_name: &str,
        link_index: usize,
        shapes: &[(Shape, Pose)],
        sphere_radius: f64,
    ) -> PlanningResult<Self> {
        let mut spheres = Vec::new();
        for (shape, pose) in shapes {
            shape.validate()?;
            for (center, radius) in enclose_shape(shape, sphere_radius) {
                let center = pose * Point3::from(center);
                spheres.push(Sphere::new(
                    &format!("{}_{}", name, spheres.len()),
                    center.coords,
                    radius,
                    0,
                ));
            }
        }
        Ok(Self {
            name: name.to_string(),
            link_name: link_name.to_string(),
            link_index,
            spheres,
        })
    }
}

/// (centre, radius) of spheres enclosing `shape` in its own frame
pub fn enclose_shape(shape: &Shape, sphere_radius: f64) -> Vec<(Vector3<f64>, f64)> {
    match shape {
        Shape::Sphere { radius } => vec![(Vector3::zeros(), *radius)],
        Shape::Box { size } => enclose_box(*size, sphere_radius),
        Shape::Cylinder { radius, height } | Shape::Cone { radius, height } => {
            enclose_cylinder(*radius, *height)
        }
        Shape::Mesh { vertices, triangles } => enclose_mesh(vertices, triangles, sphere_radius),
    }
}

/// Spheres of radius `r` on a regular lattice; each covers a cell of side at
/// most `2r / sqrt(3)`
pub fn enclose_box(size: [f64; 3], r: f64) -> Vec<(Vector3<f64>, f64)> {
    let spacing = 2.0 * r / 3f64.sqrt();
    let counts = size.map(|s| ((s / spacing).ceil() as usize).max(1));
    let step = [0, 1, 2].map(|i| size[i] / counts[i] as f64);

    let mut spheres = Vec::with_capacity(counts.iter().product());
    for i in 0..counts[0] {
        for j in 0..counts[1] {
            for k in 0..counts[2] {
                let center = Vector3::new(
                    -0.5 * size[0] + (i as f64 + 0.5) * step[0],
                    -0.5 * size[1] + (j as f64 + 0.5) * step[1],
                    -0.5 * size[2] + (k as f64 + 0.5) * step[2],
                );
                spheres.push((center, r));
            }
        }
    }
    spheres
}

/// One sphere per slab along z, each enclosing its disc-shaped slab
pub fn enclose_cylinder(radius: f64, height: f64) -> Vec<(Vector3<f64>, f64)> {
    let slabs = ((height / (2.0 * radius)).ceil() as usize).max(1);
    let slab_height = height / slabs as f64;
    let r = radius.hypot(0.5 * slab_height);
    (0..slabs)
        .map(|i| {
            let z = -0.5 * height + (i as f64 + 0.5) * slab_height;
            (Vector3::new(0.0, 0.0, z), r)
        })
        .collect()
}

/// Spheres of radius `r` centred on every lattice cell touched by the
/// mesh surface
pub fn enclose_mesh(vertices: &[Point3<f64>], triangles: &[[usize; 3]], r: f64) -> Vec<(Vector3<f64>, f64)> {
    let spacing = 2.0 * r / 3f64.sqrt();
    let mut cells = HashSet::new();
    let mut order = Vec::new();
    for tri in triangles {
        let [a, b, c] = tri.map(|i| vertices[i]);
        for p in sample_triangle(&a, &b, &c, 0.5 * spacing) {
            let key = (
                (p.x / spacing).floor() as i64,
                (p.y / spacing).floor() as i64,
                (p.z / spacing).floor() as i64,
            );
            if cells.insert(key) {
                order.push(key);
            }
        }
    }
    order
        .into_iter()
        .map(|(x, y, z)| {
            let center = Vector3::new(x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5) * spacing;
            (center, r)
        })
        .collect()
}
