//! Bounding volumes used for visibility and light range culling.
//!
//! Bounds of a [`crate::data_structures::mesh::Mesh`] live in model space and
//! must be transformed by an instance's model matrix before they are compared
//! with anything in world or view space.

use cgmath::{InnerSpace, Matrix4, Vector3, Vector4};

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl BoundingBox {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// Smallest box containing all `points`. An empty input yields a degenerate
    /// box at the origin.
    pub fn from_points(points: impl IntoIterator<Item = Vector3<f32>>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::new(Vector3::new(0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0));
        };
        points.fold(Self::new(first, first), |acc, p| Self {
            min: Vector3::new(acc.min.x.min(p.x), acc.min.y.min(p.y), acc.min.z.min(p.z)),
            max: Vector3::new(acc.max.x.max(p.x), acc.max.y.max(p.y), acc.max.z.max(p.z)),
        })
    }

    pub fn corners(&self) -> [Vector3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vector3::new(a.x, a.y, a.z),
            Vector3::new(a.x, a.y, b.z),
            Vector3::new(a.x, b.y, a.z),
            Vector3::new(a.x, b.y, b.z),
            Vector3::new(b.x, a.y, a.z),
            Vector3::new(b.x, a.y, b.z),
            Vector3::new(b.x, b.y, a.z),
            Vector3::new(b.x, b.y, b.z),
        ]
    }

    /// The axis-aligned box around all eight transformed corners.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Self {
        Self::from_points(self.corners().into_iter().map(|corner| {
            let p = matrix * corner.extend(1.0);
            Vector3::new(p.x, p.y, p.z)
        }))
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    pub fn closest_point(&self, point: Vector3<f32>) -> Vector3<f32> {
        Vector3::new(
            point.x.clamp(self.min.x, self.max.x),
            point.y.clamp(self.min.y, self.max.y),
            point.z.clamp(self.min.z, self.max.z),
        )
    }

    pub fn intersects_sphere(&self, sphere: &BoundingSphere) -> bool {
        (self.closest_point(sphere.center) - sphere.center).magnitude2()
            <= sphere.radius * sphere.radius
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3<f32>,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Vector3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }
}

pub fn intersect(aabb: &BoundingBox, sphere: &BoundingSphere) -> bool {
    aabb.intersects_sphere(sphere)
}

/// Transforms a point, returning homogeneous coordinates.
pub(crate) fn transform_point(matrix: &Matrix4<f32>, point: Vector3<f32>) -> Vector4<f32> {
    matrix * point.extend(1.0)
}
