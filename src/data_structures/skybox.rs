//! Environment cube map drawn behind all geometry and used for ambient lighting.

use std::path::Path;

use anyhow::{Result, ensure};

use crate::gpu::{Gpu, TextureDesc, TextureId, TextureKind};
use crate::resources;

#[derive(Clone, Debug, Default)]
pub struct Skybox {
    cube_map: Option<TextureId>,
    size: u32,
}

impl Skybox {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Loads six face images in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn load_cube_map<P: AsRef<Path>>(&mut self, gpu: &mut dyn Gpu, paths: &[P; 6]) -> Result<()> {
        let (size, faces) = resources::load_cube_faces(paths)?;
        let faces = faces.iter().map(|face| face.as_raw().as_slice()).collect::<Vec<_>>();
        self.set_faces(gpu, size, &faces)
    }

    /// Uploads six tightly packed RGBA8 faces of `size`x`size` texels.
    pub fn set_faces(&mut self, gpu: &mut dyn Gpu, size: u32, faces: &[&[u8]]) -> Result<()> {
        ensure!(faces.len() == 6, "a cube map needs 6 faces, got {}", faces.len());
        ensure!(size > 0, "cube map faces must not be empty");
        let expected = (size * size * 4) as usize;
        for (layer, face) in faces.iter().enumerate() {
            ensure!(
                face.len() == expected,
                "cube face {} has {} bytes, expected {}",
                layer,
                face.len(),
                expected
            );
        }

        if let Some(previous) = self.cube_map.take() {
            gpu.destroy_texture(previous);
        }
        let texture = gpu.create_texture(&TextureDesc {
            label: "skybox",
            kind: TextureKind::Cube,
            width: size,
            height: size,
            format: Self::FORMAT,
            mip_levels: 1,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        });
        for (layer, face) in faces.iter().enumerate() {
            gpu.write_texture_layer(texture, layer as u32, face);
        }
        self.cube_map = Some(texture);
        self.size = size;
        Ok(())
    }

    pub fn cube_map(&self) -> Option<TextureId> {
        self.cube_map
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}
