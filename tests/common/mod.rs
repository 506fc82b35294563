#![allow(dead_code)]

pub mod recording_gpu;

use std::sync::Arc;

use cgmath::Vector3;
use defer_ngin::data_structures::bounds::BoundingBox;
use defer_ngin::data_structures::mesh::{Material, Mesh};
use defer_ngin::data_structures::mesh_instance::MeshInstance;

use recording_gpu::RecordingGpu;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A unit cube (half extent 1) registered with the recorder but never uploaded.
pub fn unit_cube(gpu: &mut RecordingGpu) -> Arc<Mesh> {
    let geometry = gpu.mesh();
    Arc::new(Mesh::from_parts(
        "unit cube",
        geometry,
        36,
        BoundingBox::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0)),
        Material::default(),
    ))
}

pub fn cube_at(mesh: &Arc<Mesh>, position: [f32; 3]) -> MeshInstance {
    MeshInstance::new(mesh.clone(), position)
}
