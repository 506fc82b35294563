//! Shared mesh geometry and surface materials.
//!
//! A [`Mesh`] owns one uploaded geometry and its model-space bounding box. Many
//! [`crate::data_structures::mesh_instance::MeshInstance`]s reference the same
//! mesh through an `Arc`.

use cgmath::Vector3;

use crate::data_structures::bounds::BoundingBox;
use crate::gpu::{GeometryId, Gpu};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl MeshVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Surface parameters written into the G-buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    pub color: Vector3<f32>,
    pub roughness: f32,
    /// Reflectance at normal incidence.
    pub fresnel: f32,
    /// Light emitted regardless of lighting; feeds bloom.
    pub emission: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: Vector3::new(1.0, 1.0, 1.0),
            roughness: 0.95,
            fresnel: 0.15,
            emission: 0.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    name: String,
    geometry: GeometryId,
    index_count: u32,
    bounding_box: BoundingBox,
    material: Material,
}

impl Mesh {
    /// Uploads `vertices`/`indices` and computes the model-space bounds.
    pub fn new(
        gpu: &mut dyn Gpu,
        name: &str,
        vertices: &[MeshVertex],
        indices: &[u32],
        material: Material,
    ) -> Self {
        let bounding_box =
            BoundingBox::from_points(vertices.iter().map(|v| Vector3::from(v.position)));
        let geometry = gpu.upload_geometry(name, vertices, indices);
        Self {
            name: name.to_string(),
            geometry,
            index_count: indices.len() as u32,
            bounding_box,
            material,
        }
    }

    /// Wraps geometry that was uploaded elsewhere.
    pub fn from_parts(
        name: &str,
        geometry: GeometryId,
        index_count: u32,
        bounding_box: BoundingBox,
        material: Material,
    ) -> Self {
        Self {
            name: name.to_string(),
            geometry,
            index_count,
            bounding_box,
            material,
        }
    }

    /// An axis-aligned box centered on the origin with flat shaded faces.
    pub fn cuboid(
        gpu: &mut dyn Gpu,
        name: &str,
        half_extents: Vector3<f32>,
        material: Material,
    ) -> Self {
        let (vertices, indices) = cuboid_geometry(half_extents);
        Self::new(gpu, name, &vertices, &indices, material)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> GeometryId {
        self.geometry
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn material(&self) -> &Material {
        &self.material
    }
}

pub fn cuboid_geometry(half_extents: Vector3<f32>) -> (Vec<MeshVertex>, Vec<u32>) {
    let h = half_extents;
    // normal, tangent u, tangent v of each face; u x v == normal keeps CCW winding
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (n, u, v) in faces {
        let base = vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let corner = |axis: usize| (n[axis] + su * u[axis] + sv * v[axis]) * h[axis];
            vertices.push(MeshVertex {
                position: [corner(0), corner(1), corner(2)],
                normal: n,
                tex_coords: [(su + 1.0) * 0.5, (1.0 - sv) * 0.5],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}
