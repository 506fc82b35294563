//! A mesh placed in the world.

use std::sync::Arc;

use cgmath::Matrix4;

use crate::data_structures::bounds::{BoundingBox, transform_point};
use crate::data_structures::mesh::{Material, Mesh};
use crate::data_structures::transform::Transformation;
use crate::gpu::DrawUniforms;

/// A reference to shared mesh data plus a per-instance material copy and
/// world transformation.
///
/// Changing the material of an instance never affects other instances of the
/// same mesh.
#[derive(Clone, Debug)]
pub struct MeshInstance {
    mesh: Arc<Mesh>,
    material: Material,
    transformation: Transformation,
    model: Matrix4<f32>,
}

impl MeshInstance {
    pub fn new(mesh: Arc<Mesh>, transformation: impl Into<Transformation>) -> Self {
        let transformation = transformation.into();
        Self {
            material: *mesh.material(),
            model: transformation.to_matrix(),
            mesh,
            transformation,
        }
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn material_mut(&mut self) -> &mut Material {
        &mut self.material
    }

    pub fn set_material(&mut self, material: Material) {
        self.material = material;
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn set_transformation(&mut self, transformation: impl Into<Transformation>) {
        self.transformation = transformation.into();
        self.model = self.transformation.to_matrix();
    }

    pub fn model_matrix(&self) -> &Matrix4<f32> {
        &self.model
    }

    /// World-space bounding box.
    pub fn aabb(&self) -> BoundingBox {
        self.mesh.bounding_box().transformed(&self.model)
    }

    pub fn draw_uniforms(&self) -> DrawUniforms {
        DrawUniforms::with_material(&self.model, &self.material)
    }

    /// Conservative frustum test of the world-space bounding box.
    ///
    /// May report boxes close to the frustum as visible, never the reverse.
    /// `projection` uses the OpenGL clip convention (x, y and z in `[-w, w]`).
    pub fn is_visible(&self, projection: &Matrix4<f32>, view: &Matrix4<f32>) -> bool {
        let corners = self.aabb().corners().map(|corner| transform_point(view, corner));
        if !corners.iter().any(|p| p.z < 0.0) {
            return false;
        }

        let mut min = [f32::INFINITY; 2];
        let mut max = [f32::NEG_INFINITY; 2];
        for corner in corners {
            let mut clip = projection * corner;
            if clip.w > 0.0 {
                clip = clip / clip.w;
            }
            min[0] = min[0].min(clip.x);
            min[1] = min[1].min(clip.y);
            max[0] = max[0].max(clip.x);
            max[1] = max[1].max(clip.y);
        }

        !(0..2).any(|axis| max[axis] < -1.0 || min[axis] > 1.0)
    }
}
