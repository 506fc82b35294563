//! Render targets of shadow-casting lights.
//!
//! Shadow maps store depth moments (`d`, `d²`) in an RGBA16F colour target so
//! they can be filtered, mip-mapped and blurred as variance shadow maps. A
//! depth attachment of the same size keeps the nearest occluder.

use crate::gpu::{Attachment, Gpu, PassDesc, TextureDesc, TextureId, TextureKind};

/// Moments of an empty shadow map: everything is lit.
pub const CLEAR_MOMENTS: [f32; 4] = [1.0, 1.0, 0.0, 1.0];

#[derive(Clone, Debug)]
pub struct ShadowMap {
    kind: TextureKind,
    resolution: u32,
    color: Option<TextureId>,
    depth: Option<TextureId>,
}

impl ShadowMap {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(kind: TextureKind, resolution: u32) -> Self {
        Self {
            kind,
            resolution,
            color: None,
            depth: None,
        }
    }

    /// Allocates the targets once. A zero resolution is refused.
    pub fn init(&mut self, gpu: &mut dyn Gpu) {
        if self.color.is_some() {
            return;
        }
        if self.resolution == 0 {
            log::warn!("Refusing to allocate a zero-resolution shadow map");
            return;
        }
        self.color = Some(gpu.create_texture(&TextureDesc {
            label: "shadow map",
            kind: self.kind,
            width: self.resolution,
            height: self.resolution,
            format: Self::FORMAT,
            mip_levels: self.mip_levels(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING,
        }));
        self.depth = Some(gpu.create_texture(&TextureDesc {
            label: "shadow map depth",
            kind: self.kind,
            width: self.resolution,
            height: self.resolution,
            format: Self::DEPTH_FORMAT,
            mip_levels: 1,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }));
    }

    /// Frees the targets; `init` allocates them again.
    pub fn release(&mut self, gpu: &mut dyn Gpu) {
        for texture in [self.color.take(), self.depth.take()].into_iter().flatten() {
            gpu.destroy_texture(texture);
        }
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn mip_levels(&self) -> u32 {
        TextureDesc::full_mip_chain(self.resolution, self.resolution)
    }

    /// The moments texture sampled by the light pass.
    pub fn texture(&self) -> Option<TextureId> {
        self.color
    }

    pub fn is_allocated(&self) -> bool {
        self.color.is_some() && self.depth.is_some()
    }

    /// A clearing pass over level 0. Cube maps are attached as layered targets.
    pub fn pass(&self) -> Option<PassDesc> {
        let layer = match self.kind {
            TextureKind::D2 => Some(0),
            TextureKind::Cube => None,
        };
        Some(PassDesc {
            label: "shadow map",
            colors: vec![Attachment::Texture {
                texture: self.color?,
                level: 0,
                layer,
            }],
            depth: Some(self.depth?),
            clear: Some(CLEAR_MOMENTS),
        })
    }
}
