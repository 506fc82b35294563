//! Placement of a mesh in the world.

use cgmath::{Matrix4, One, Quaternion, Vector3};

/// Position, rotation (as quaternion) and scale of a mesh instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transformation {
    pub position: Vector3<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Transformation {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: Vector3::new(0.0, 0.0, 0.0),
            rotation: Quaternion::one(),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn with_scale(mut self, scale: impl Into<Vector3<f32>>) -> Self {
        self.scale = scale.into();
        self
    }

    pub fn with_rotation(mut self, rotation: Quaternion<f32>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

impl From<Vector3<f32>> for Transformation {
    fn from(position: Vector3<f32>) -> Self {
        Transformation {
            position,
            ..Default::default()
        }
    }
}

impl From<[f32; 3]> for Transformation {
    fn from(position: [f32; 3]) -> Self {
        Vector3::from(position).into()
    }
}

impl Default for Transformation {
    fn default() -> Self {
        Self::new()
    }
}
