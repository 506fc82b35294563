//! Unshadowed point lights stored in one GPU buffer.
//!
//! The buffer is re-uploaded in full whenever any light changed since the last
//! [`PointLights::sync`]. There are no partial updates.

use cgmath::Vector3;

use crate::gpu::{BufferId, Gpu};

/// One point light as laid out in the storage buffer (std430, 32 bytes).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointLight {
    pub position: [f32; 3],
    pub range: f32,
    pub color: [f32; 3],
    /// Free slot for callers, e.g. an animation phase.
    pub info: f32,
}

impl PointLight {
    pub fn new(position: impl Into<Vector3<f32>>, color: impl Into<Vector3<f32>>, range: f32) -> Self {
        let (position, color): (Vector3<f32>, Vector3<f32>) = (position.into(), color.into());
        Self {
            position: position.into(),
            range,
            color: color.into(),
            info: 0.0,
        }
    }
}

#[derive(Debug, Default)]
pub struct PointLights {
    lights: Vec<PointLight>,
    buffer: Option<BufferId>,
    dirty: bool,
    gpu_len: usize,
}

impl PointLights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn as_slice(&self) -> &[PointLight] {
        &self.lights
    }

    pub fn get(&self, index: usize) -> Option<&PointLight> {
        self.lights.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PointLight> {
        self.dirty = true;
        self.lights.get_mut(index)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PointLight> {
        self.dirty = true;
        self.lights.iter_mut()
    }

    pub fn push(&mut self, light: PointLight) {
        self.dirty = true;
        self.lights.push(light);
    }

    pub fn remove(&mut self, index: usize) -> Option<PointLight> {
        if index >= self.lights.len() {
            return None;
        }
        self.dirty = true;
        Some(self.lights.remove(index))
    }

    pub fn clear(&mut self) {
        self.dirty = true;
        self.lights.clear();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    /// Number of lights in the buffer as of the last upload.
    pub fn gpu_len(&self) -> usize {
        self.gpu_len
    }

    /// Re-uploads every light if anything changed. Creates the buffer on first use.
    pub fn sync(&mut self, gpu: &mut dyn Gpu) {
        if !self.dirty && self.buffer.is_some() {
            return;
        }
        let buffer = *self
            .buffer
            .get_or_insert_with(|| gpu.create_buffer("point lights"));
        gpu.write_buffer(buffer, bytemuck::cast_slice(&self.lights));
        self.gpu_len = self.lights.len();
        self.dirty = false;
        log::debug!("Uploaded {} point lights", self.gpu_len);
    }
}
