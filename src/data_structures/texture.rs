//! GPU textures and texture creation utilities for the wgpu backend.
//!
//! [`GpuTexture`] keeps the wgpu texture together with the description it was
//! created from and the mip level sampling currently starts at. Views are
//! created on demand for the exact level and layer a pass or dispatch needs.

use crate::gpu::{TextureDesc, TextureKind};

#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub desc: TextureDesc,
    pub base_level: u32,
}

impl GpuTexture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    pub fn new(device: &wgpu::Device, desc: &TextureDesc) -> Self {
        let size = wgpu::Extent3d {
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth_or_array_layers: desc.kind.layers(),
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size,
            mip_level_count: desc.mip_levels.max(1),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: desc.usage,
            view_formats: &[],
        });
        Self {
            texture,
            desc: desc.clone(),
            base_level: 0,
        }
    }

    pub fn is_depth(&self) -> bool {
        self.desc.format.is_depth_stencil_format()
    }

    /// View for sampling: every layer, every level from the base level on.
    pub fn sampled_view(&self) -> wgpu::TextureView {
        let dimension = match self.desc.kind {
            TextureKind::D2 => wgpu::TextureViewDimension::D2,
            TextureKind::Cube => wgpu::TextureViewDimension::Cube,
        };
        let base_mip_level = self.base_level.min(self.desc.mip_levels.max(1) - 1);
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.desc.label),
            format: None,
            dimension: Some(dimension),
            usage: Some(wgpu::TextureUsages::TEXTURE_BINDING),
            aspect: wgpu::TextureAspect::All,
            base_mip_level,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: None,
        })
    }

    /// Single level, single layer 2D view used as attachment or storage image.
    pub fn level_view(&self, level: u32, layer: u32, usage: wgpu::TextureUsages) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(self.desc.label),
            format: None,
            dimension: Some(wgpu::TextureViewDimension::D2),
            usage: Some(usage),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
        })
    }

    pub fn level_size(&self, level: u32) -> (u32, u32) {
        (
            (self.desc.width >> level).max(1),
            (self.desc.height >> level).max(1),
        )
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("linear clamp sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::MipmapFilterMode::Linear,
        ..Default::default()
    })
}
