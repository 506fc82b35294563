//! Light pass: accumulates lighting from the G-buffer into the HDR lit target.
//!
//! One full-screen draw adds ambient light, every point light and the skybox
//! behind empty pixels. Each shadow-casting light then adds its contribution
//! with another full-screen draw that samples its variance shadow map. With
//! debug drawing on, point lights are finally drawn as billboards, depth-tested
//! against the G-buffer with face culling off.

use crate::camera::CameraUniform;
use crate::gpu::{
    Attachment, Binding, Blend, BufferId, DepthMode, Gpu, PassDesc, ProgramId, ProgramKey,
    ProgramKind, ProgramTemplate, ShaderFile, ShaderStage, TargetFormat, TextureDesc, TextureId,
    TextureKind, VertexInput, uniform_bytes,
};
use crate::pipelines::{FULLSCREEN_VERTEX, fullscreen_program};
use crate::lights::{Light, PointLight, ShadowLightUniform};
use crate::pipelines::gbuffer::GBuffer;
use crate::pipelines::post_process::PostProcessSettings;
use crate::scene::Scene;
use crate::shared::Shared;

pub const LIT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

const LIT_TARGET: &[TargetFormat] = &[TargetFormat::Fixed(LIT_FORMAT)];

pub const AMBIENT_PROGRAM: ProgramTemplate = fullscreen_program(
    ProgramKey::LightAmbient,
    "ambient and point lights",
    &[
        FULLSCREEN_VERTEX,
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "light_ambient.wgsl",
        },
    ],
    LIT_TARGET,
    Blend::Replace,
    &[
        Binding::UnfilterableTexture,
        Binding::UnfilterableTexture,
        Binding::UnfilterableTexture,
        Binding::StorageBuffer,
        Binding::Texture(TextureKind::Cube),
        Binding::Sampler,
    ],
);

pub const SHADOW_PROGRAM: ProgramTemplate = fullscreen_program(
    ProgramKey::LightShadow,
    "shadow-casting light",
    &[
        FULLSCREEN_VERTEX,
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "light_shadow.wgsl",
        },
    ],
    LIT_TARGET,
    Blend::Additive,
    &[
        Binding::UnfilterableTexture,
        Binding::UnfilterableTexture,
        Binding::UnfilterableTexture,
        Binding::Texture(TextureKind::D2),
        Binding::Sampler,
    ],
);

pub const OMNI_PROGRAM: ProgramTemplate = fullscreen_program(
    ProgramKey::LightOmni,
    "omnidirectional light",
    &[
        FULLSCREEN_VERTEX,
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "light_omni.wgsl",
        },
    ],
    LIT_TARGET,
    Blend::Additive,
    &[
        Binding::UnfilterableTexture,
        Binding::UnfilterableTexture,
        Binding::UnfilterableTexture,
        Binding::Texture(TextureKind::Cube),
        Binding::Sampler,
    ],
);

pub const DRAW_PROGRAM: ProgramTemplate = ProgramTemplate {
    key: ProgramKey::LightDraw,
    label: "point light billboards",
    files: &[ShaderFile {
        stage: ShaderStage::Vertex,
        path: "light_draw.wgsl",
    }],
    kind: ProgramKind::Raster {
        input: VertexInput::Billboards,
        targets: LIT_TARGET,
        depth: DepthMode::ReadOnly,
        blend: Blend::Additive,
    },
    bindings: &[Binding::StorageBuffer],
};

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct AmbientUniform {
    pub camera: CameraUniform,
    pub ambient: [f32; 4],
    // x: number of point lights
    pub counts: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowPassUniform {
    pub camera: CameraUniform,
    pub light: ShadowLightUniform,
}

#[derive(Debug)]
pub struct LightPass {
    lit: TextureId,
    ambient: ProgramId,
    shadow: ProgramId,
    omni: ProgramId,
    draw: ProgramId,
    black_cube: TextureId,
    no_lights: BufferId,
}

impl LightPass {
    pub fn new(gpu: &mut dyn Gpu, shared: &mut Shared, width: u32, height: u32) -> Self {
        let black_cube = gpu.create_texture(&TextureDesc {
            label: "black cube",
            kind: TextureKind::Cube,
            width: 1,
            height: 1,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            mip_levels: 1,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        });
        for layer in 0..6 {
            gpu.write_texture_layer(black_cube, layer, &[0, 0, 0, 255]);
        }
        let no_lights = gpu.create_buffer("no point lights");
        gpu.write_buffer(no_lights, bytemuck::bytes_of(&PointLight::new([0.0; 3], [0.0; 3], 0.0)));

        Self {
            lit: Self::lit_target(gpu, width, height),
            ambient: shared.programs.get_or_init(gpu, &AMBIENT_PROGRAM),
            shadow: shared.programs.get_or_init(gpu, &SHADOW_PROGRAM),
            omni: shared.programs.get_or_init(gpu, &OMNI_PROGRAM),
            draw: shared.programs.get_or_init(gpu, &DRAW_PROGRAM),
            black_cube,
            no_lights,
        }
    }

    fn lit_target(gpu: &mut dyn Gpu, width: u32, height: u32) -> TextureId {
        gpu.create_texture(&TextureDesc {
            label: "lit",
            kind: TextureKind::D2,
            width,
            height,
            format: LIT_FORMAT,
            mip_levels: 1,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        })
    }

    pub fn resize(&mut self, gpu: &mut dyn Gpu, width: u32, height: u32) {
        gpu.destroy_texture(self.lit);
        self.lit = Self::lit_target(gpu, width, height);
    }

    /// The HDR result of the pass.
    pub fn lit(&self) -> TextureId {
        self.lit
    }

    fn bind_gbuffer(gpu: &mut dyn Gpu, gbuffer: &GBuffer) {
        gpu.bind_texture(0, gbuffer.albedo);
        gpu.bind_texture(1, gbuffer.position);
        gpu.bind_texture(2, gbuffer.normal);
    }

    pub fn render(
        &self,
        gpu: &mut dyn Gpu,
        gbuffer: &GBuffer,
        scene: &Scene,
        camera: &CameraUniform,
        settings: &PostProcessSettings,
        debug_lights: bool,
    ) {
        let point_lights = scene.point_lights();
        let (light_buffer, light_count) = match point_lights.buffer() {
            Some(buffer) => (buffer, point_lights.gpu_len() as u32),
            None => (self.no_lights, 0),
        };

        gpu.begin_pass(&PassDesc {
            label: "light pass",
            colors: vec![Attachment::texture(self.lit)],
            depth: None,
            clear: Some([0.0, 0.0, 0.0, 1.0]),
        });

        gpu.use_program(self.ambient);
        gpu.set_uniforms(uniform_bytes(&AmbientUniform {
            camera: *camera,
            ambient: settings.ambient.extend(1.0).into(),
            counts: [light_count, 0, 0, 0],
        }));
        Self::bind_gbuffer(gpu, gbuffer);
        gpu.bind_storage_buffer(3, light_buffer);
        gpu.bind_texture(4, scene.skybox().cube_map().unwrap_or(self.black_cube));
        gpu.draw_fullscreen();

        let planar = scene.lights().map(|(_, light)| (light, self.shadow));
        let omni = scene
            .omni_lights()
            .map(|(_, light)| (light as &dyn Light, self.omni));
        for (light, program) in planar.chain(omni) {
            let Some(shadow_map) = light.shadow_map().texture() else {
                continue;
            };
            let mut uniform = light.uniform();
            uniform.params[1] = settings.min_variance;
            gpu.use_program(program);
            gpu.set_uniforms(uniform_bytes(&ShadowPassUniform {
                camera: *camera,
                light: uniform,
            }));
            Self::bind_gbuffer(gpu, gbuffer);
            gpu.bind_texture(3, shadow_map);
            gpu.draw_fullscreen();
        }
        gpu.end_pass();

        if debug_lights && light_count > 0 {
            gpu.begin_pass(&PassDesc {
                label: "light billboards",
                colors: vec![Attachment::texture(self.lit)],
                depth: Some(gbuffer.depth),
                clear: None,
            });
            gpu.use_program(self.draw);
            gpu.set_uniforms(uniform_bytes(camera));
            gpu.bind_storage_buffer(0, light_buffer);
            gpu.set_cull_face(false);
            gpu.draw_points(light_count);
            gpu.end_pass();
        }
    }
}
