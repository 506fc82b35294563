//! Geometry pass: surface attributes of every visible instance into the G-buffer.

use cgmath::Matrix4;

use crate::camera::CameraUniform;
use crate::gpu::{
    Attachment, Blend, DepthMode, Gpu, PassDesc, ProgramId, ProgramKey, ProgramKind,
    ProgramTemplate, ShaderFile, ShaderStage, TargetFormat, TextureDesc, TextureId, TextureKind,
    VertexInput, uniform_bytes,
};
use crate::scene::Scene;
use crate::shared::Shared;

pub const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const POSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub const PROGRAM: ProgramTemplate = ProgramTemplate {
    key: ProgramKey::GBuffer,
    label: "g-buffer",
    files: &[ShaderFile {
        stage: ShaderStage::Vertex,
        path: "gbuffer.wgsl",
    }],
    kind: ProgramKind::Raster {
        input: VertexInput::Mesh,
        targets: &[
            TargetFormat::Fixed(ALBEDO_FORMAT),
            TargetFormat::Fixed(POSITION_FORMAT),
            TargetFormat::Fixed(NORMAL_FORMAT),
        ],
        depth: DepthMode::ReadWrite,
        blend: Blend::Replace,
    },
    bindings: &[],
};

/// Albedo + roughness, world position (alpha 1 + emission, 0 where empty), normal + F0, depth.
#[derive(Clone, Debug)]
pub struct GBuffer {
    pub albedo: TextureId,
    pub position: TextureId,
    pub normal: TextureId,
    pub depth: TextureId,
    width: u32,
    height: u32,
    program: ProgramId,
}

fn target(gpu: &mut dyn Gpu, label: &'static str, format: wgpu::TextureFormat, width: u32, height: u32) -> TextureId {
    gpu.create_texture(&TextureDesc {
        label,
        kind: TextureKind::D2,
        width,
        height,
        format,
        mip_levels: 1,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
    })
}

impl GBuffer {
    pub fn new(gpu: &mut dyn Gpu, shared: &mut Shared, width: u32, height: u32) -> Self {
        Self {
            albedo: target(gpu, "g-buffer albedo", ALBEDO_FORMAT, width, height),
            position: target(gpu, "g-buffer position", POSITION_FORMAT, width, height),
            normal: target(gpu, "g-buffer normal", NORMAL_FORMAT, width, height),
            depth: target(gpu, "g-buffer depth", DEPTH_FORMAT, width, height),
            width,
            height,
            program: shared.programs.get_or_init(gpu, &PROGRAM),
        }
    }

    /// Frees the targets and allocates them at the new size.
    pub fn resize(&mut self, gpu: &mut dyn Gpu, width: u32, height: u32) {
        for texture in [self.albedo, self.position, self.normal, self.depth] {
            gpu.destroy_texture(texture);
        }
        self.albedo = target(gpu, "g-buffer albedo", ALBEDO_FORMAT, width, height);
        self.position = target(gpu, "g-buffer position", POSITION_FORMAT, width, height);
        self.normal = target(gpu, "g-buffer normal", NORMAL_FORMAT, width, height);
        self.depth = target(gpu, "g-buffer depth", DEPTH_FORMAT, width, height);
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn attachments(&self) -> Vec<Attachment> {
        vec![
            Attachment::texture(self.albedo),
            Attachment::texture(self.position),
            Attachment::texture(self.normal),
        ]
    }

    /// Draws the instances visible from the camera. Returns how many were drawn.
    pub fn render(
        &self,
        gpu: &mut dyn Gpu,
        scene: &Scene,
        camera: &CameraUniform,
        projection: &Matrix4<f32>,
        view: &Matrix4<f32>,
    ) -> usize {
        gpu.begin_pass(&PassDesc {
            label: "g-buffer",
            colors: self.attachments(),
            depth: Some(self.depth),
            clear: Some([0.0; 4]),
        });
        gpu.use_program(self.program);
        gpu.set_uniforms(uniform_bytes(camera));
        gpu.set_cull_face(true);
        let mut drawn = 0;
        for object in scene.objects().iter().filter(|o| o.is_visible(projection, view)) {
            gpu.draw_mesh(object.mesh().geometry(), &object.draw_uniforms());
            drawn += 1;
        }
        gpu.set_cull_face(false);
        gpu.end_pass();
        drawn
    }
}
