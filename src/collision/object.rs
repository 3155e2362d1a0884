//! Collision objects and their voxelization into grid cells

use std::collections::HashSet;

use nalgebra::{Point3, Vector3};

use crate::common::{PlanningError, PlanningResult, Pose};
use crate::utils::{GridCell, GridGeometry};

/// Geometric primitive in its own frame. Solids are centred on the frame
/// origin; cylinders and cones extend along z.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Box { size: [f64; 3] },
    Sphere { radius: f64 },
    Cylinder { radius: f64, height: f64 },
    /// Apex at `+height / 2`, base of `radius` at `-height / 2`
    Cone { radius: f64, height: f64 },
    Mesh {
        vertices: Vec<Point3<f64>>,
        triangles: Vec<[usize; 3]>,
    },
}

impl Shape {
    pub fn validate(&self) -> PlanningResult<()> {
        let positive = |name: &str, v: f64| {
            if v > 0.0 && v.is_finite() {
                Ok(())
            } else {
                Err(PlanningError::invalid_config(format!(
                    "{} must be positive, got {}",
                    name, v
                )))
            }
        };
        match self {
            Shape::Box { size } => size.iter().try_for_each(|&s| positive("box size", s)),
            Shape::Sphere { radius } => positive("sphere radius", *radius),
            Shape::Cylinder { radius, height } | Shape::Cone { radius, height } => {
                positive("radius", *radius)?;
                positive("height", *height)
            }
            Shape::Mesh { vertices, triangles } => {
                if triangles.is_empty() {
                    return Err(PlanningError::invalid_config("mesh has no triangles"));
                }
                match triangles.iter().flatten().find(|&&i| i >= vertices.len()) {
                    Some(i) => Err(PlanningError::invalid_config(format!(
                        "mesh triangle references vertex {} of {}",
                        i,
                        vertices.len()
                    ))),
                    None => Ok(()),
                }
            }
        }
    }

    /// Half extents of the axis aligned bounding box in the shape frame,
    /// around the frame origin
    fn half_extents(&self) -> Vector3<f64> {
        match self {
            Shape::Box { size } => Vector3::new(size[0], size[1], size[2]) * 0.5,
            Shape::Sphere { radius } => Vector3::repeat(*radius),
            Shape::Cylinder { radius, height } | Shape::Cone { radius, height } => {
                Vector3::new(*radius, *radius, height * 0.5)
            }
            Shape::Mesh { vertices, .. } => vertices
                .iter()
                .fold(Vector3::zeros(), |acc, v| acc.sup(&v.coords.abs())),
        }
    }

    /// Whether a point in the shape frame lies inside the solid
    fn contains(&self, p: &Point3<f64>) -> bool {
        match self {
            Shape::Box { size } => {
                p.x.abs() <= size[0] * 0.5 && p.y.abs() <= size[1] * 0.5 && p.z.abs() <= size[2] * 0.5
            }
            Shape::Sphere { radius } => p.coords.norm() <= *radius,
            Shape::Cylinder { radius, height } => {
                p.z.abs() <= height * 0.5 && p.x.hypot(p.y) <= *radius
            }
            Shape::Cone { radius, height } => {
                if p.z.abs() > height * 0.5 {
                    return false;
                }
                let r = radius * (height * 0.5 - p.z) / height;
                p.x.hypot(p.y) <= r
            }
            Shape::Mesh { .. } => false,
        }
    }
}

/// Requested change to the set of collision objects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectOperation {
    Add,
    Remove,
    /// Merge the shapes into an existing object
    Append,
    /// Re-pose the shapes of an existing object
    Move,
}

/// Named obstacle made of posed shapes, expressed in the grid frame
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionObject {
    pub id: String,
    pub frame_id: String,
    pub shapes: Vec<(Shape, Pose)>,
    pub operation: ObjectOperation,
}

impl CollisionObject {
    pub fn new(id: &str, frame_id: &str, operation: ObjectOperation) -> Self {
        Self {
            id: id.to_string(),
            frame_id: frame_id.to_string(),
            shapes: Vec::new(),
            operation,
        }
    }

    pub fn with_shape(mut self, shape: Shape, pose: Pose) -> Self {
        self.shapes.push((shape, pose));
        self
    }
}

/// Centres of the in-bounds grid cells covered by `shape` placed at `pose`.
///
/// Solids are filled; meshes are sampled over their surface. A solid smaller
/// than a cell still occupies the cell containing its origin.
pub fn voxelize_shape(shape: &Shape, pose: &Pose, geometry: &GridGeometry) -> PlanningResult<Vec<Point3<f64>>> {
    shape.validate()?;
    let mut cells = HashSet::new();

    match shape {
        Shape::Mesh { vertices, triangles } => {
            let step = geometry.resolution * 0.5;
            for tri in triangles {
                let [a, b, c] = tri.map(|i| pose * vertices[i]);
                for p in sample_triangle(&a, &b, &c, step) {
                    cells.insert(geometry.world_to_grid(&p));
                }
            }
        }
        _ => {
            let half = shape.half_extents();
            let mut lo = Vector3::repeat(f64::INFINITY);
            let mut hi = Vector3::repeat(f64::NEG_INFINITY);
            for corner in 0..8 {
                let local = Point3::new(
                    if corner & 1 == 0 { -half.x } else { half.x },
                    if corner & 2 == 0 { -half.y } else { half.y },
                    if corner & 4 == 0 { -half.z } else { half.z },
                );
                let world = pose * local;
                lo = lo.inf(&world.coords);
                hi = hi.sup(&world.coords);
            }
            // only cells inside of the grid are visited
            let last = geometry.dims.map(|d| d as i32 - 1);
            let lo_cell = geometry.world_to_grid(&Point3::from(lo));
            let hi_cell = geometry.world_to_grid(&Point3::from(hi));
            let min_cell = GridCell::new(lo_cell.x.max(0), lo_cell.y.max(0), lo_cell.z.max(0));
            let max_cell = GridCell::new(
                hi_cell.x.min(last[0]),
                hi_cell.y.min(last[1]),
                hi_cell.z.min(last[2]),
            );
            let inverse = pose.inverse();
            for z in min_cell.z..=max_cell.z {
                for y in min_cell.y..=max_cell.y {
                    for x in min_cell.x..=max_cell.x {
                        let cell = GridCell::new(x, y, z);
                        if shape.contains(&(inverse * geometry.grid_to_world(cell))) {
                            cells.insert(cell);
                        }
                    }
                }
            }
            cells.insert(geometry.world_to_grid(&Point3::from(pose.translation.vector)));
        }
    }

    let mut cells: Vec<GridCell> = cells.into_iter().filter(|&c| geometry.in_bounds(c)).collect();
    cells.sort_by_key(|c| (c.z, c.y, c.x));
    Ok(cells.into_iter().map(|c| geometry.grid_to_world(c)).collect())
}

/// Points covering a triangle with spacing no larger than `step`
pub(crate) fn sample_triangle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, step: f64) -> Vec<Point3<f64>> {
    let longest = (b - a).norm().max((c - b).norm()).max((a - c).norm());
    let n = ((longest / step).ceil() as usize).max(1);
    let mut points = Vec::with_capacity((n + 1) * (n + 2) / 2);
    for i in 0..=n {
        for j in 0..=(n - i) {
            let u = i as f64 / n as f64;
            let v = j as f64 / n as f64;
            points.push(a + (b - a) * u + (c - a) * v);
        }
    }
    points
}
