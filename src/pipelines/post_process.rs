//! Post-process chain: ambient occlusion, bloom, volumetric scattering and the
//! final tone-mapped composite into the presented frame.

use cgmath::Vector3;

use crate::blur;
use crate::camera::CameraUniform;
use crate::gpu::{
    Attachment, Binding, Blend, Gpu, PassDesc, ProgramId, ProgramKey, ProgramTemplate, ShaderFile,
    ShaderStage, TargetFormat, TextureDesc, TextureId, TextureKind, uniform_bytes,
};
use crate::lights::ShadowLightUniform;
use crate::pipelines::gbuffer::GBuffer;
use crate::pipelines::{FULLSCREEN_VERTEX, fullscreen_program};
use crate::scene::Scene;
use crate::shared::Shared;

pub const AO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const BLOOM_FORMAT: wgpu::TextureFormat = blur::IMAGE_FORMAT;
pub const VOLUME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Runtime-editable parameters of the lighting and post-process stages.
#[derive(Clone, Debug, PartialEq)]
pub struct PostProcessSettings {
    pub ao_radius: f32,
    /// Depth difference beyond which a sample no longer occludes.
    pub ao_threshold: f32,
    /// Zero disables ambient occlusion.
    pub ao_samples: u32,
    /// Strength of the bloom added in the composite; negative disables bloom.
    pub bloom: f32,
    pub bloom_downsampling: u32,
    pub bloom_blur: u32,
    pub volume_samples: u32,
    /// Zero disables volumetric scattering.
    pub atmospheric_density: f32,
    pub exposure: f32,
    pub gamma: f32,
    /// Lower bound of the variance used in shadow map tests.
    pub min_variance: f32,
    pub ambient: Vector3<f32>,
}

impl Default for PostProcessSettings {
    fn default() -> Self {
        Self {
            ao_radius: 0.5,
            ao_threshold: 4.0,
            ao_samples: 16,
            bloom: 1.2,
            bloom_downsampling: 1,
            bloom_blur: 2,
            volume_samples: 16,
            atmospheric_density: 0.0,
            exposure: 2.0,
            gamma: 2.2,
            min_variance: 1e-7,
            ambient: Vector3::new(0.03, 0.03, 0.03),
        }
    }
}

impl PostProcessSettings {
    pub fn bloom_enabled(&self) -> bool {
        self.bloom >= 0.0
    }

    pub fn volumetric_enabled(&self) -> bool {
        self.atmospheric_density > 0.0 && self.volume_samples > 0
    }
}

const HDR_TARGET: &[TargetFormat] = &[TargetFormat::Fixed(wgpu::TextureFormat::Rgba16Float)];

pub const SSAO_PROGRAM: ProgramTemplate = fullscreen_program(
    ProgramKey::Ssao,
    "ambient occlusion",
    &[
        FULLSCREEN_VERTEX,
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "ssao.wgsl",
        },
    ],
    HDR_TARGET,
    Blend::Replace,
    &[Binding::UnfilterableTexture, Binding::UnfilterableTexture],
);

pub const BLOOM_PROGRAM: ProgramTemplate = fullscreen_program(
    ProgramKey::BloomExtract,
    "bloom extract",
    &[
        FULLSCREEN_VERTEX,
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "bloom_extract.wgsl",
        },
    ],
    HDR_TARGET,
    Blend::Replace,
    &[Binding::Texture(TextureKind::D2), Binding::Sampler],
);

pub const VOLUMETRIC_PROGRAM: ProgramTemplate = fullscreen_program(
    ProgramKey::Volumetric,
    "volumetric scattering",
    &[
        FULLSCREEN_VERTEX,
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "volumetric.wgsl",
        },
    ],
    HDR_TARGET,
    Blend::Replace,
    &[
        Binding::UnfilterableTexture,
        Binding::Texture(TextureKind::D2),
        Binding::Sampler,
    ],
);

pub const COMPOSITE_PROGRAM: ProgramTemplate = fullscreen_program(
    ProgramKey::Composite,
    "composite",
    &[
        FULLSCREEN_VERTEX,
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "composite.wgsl",
        },
    ],
    &[TargetFormat::Output],
    Blend::Replace,
    &[
        Binding::Texture(TextureKind::D2),
        Binding::Texture(TextureKind::D2),
        Binding::Texture(TextureKind::D2),
        Binding::Texture(TextureKind::D2),
        Binding::Sampler,
    ],
);

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SsaoUniform {
    pub camera: CameraUniform,
    // radius, threshold, sample count, unused
    pub params: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumetricUniform {
    pub camera: CameraUniform,
    pub light: ShadowLightUniform,
    // sample count, density, unused, unused
    pub params: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompositeUniform {
    // exposure, gamma, bloom strength, unused
    pub params: [f32; 4],
}

#[derive(Debug)]
pub struct PostProcess {
    ao: TextureId,
    bloom: TextureId,
    volume: TextureId,
    width: u32,
    height: u32,
    ssao: ProgramId,
    extract: ProgramId,
    volumetric: ProgramId,
    composite: ProgramId,
}

impl PostProcess {
    pub fn new(gpu: &mut dyn Gpu, shared: &mut Shared, width: u32, height: u32) -> Self {
        let (ao, bloom, volume) = Self::targets(gpu, width, height);
        Self {
            ao,
            bloom,
            volume,
            width,
            height,
            ssao: shared.programs.get_or_init(gpu, &SSAO_PROGRAM),
            extract: shared.programs.get_or_init(gpu, &BLOOM_PROGRAM),
            volumetric: shared.programs.get_or_init(gpu, &VOLUMETRIC_PROGRAM),
            composite: shared.programs.get_or_init(gpu, &COMPOSITE_PROGRAM),
        }
    }

    fn targets(gpu: &mut dyn Gpu, width: u32, height: u32) -> (TextureId, TextureId, TextureId) {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let mut target = |label, format, mip_levels, usage| {
            gpu.create_texture(&TextureDesc {
                label,
                kind: TextureKind::D2,
                width,
                height,
                format,
                mip_levels,
                usage,
            })
        };
        (
            target("ambient occlusion", AO_FORMAT, 1, usage),
            target(
                "bloom",
                BLOOM_FORMAT,
                TextureDesc::full_mip_chain(width, height),
                usage | wgpu::TextureUsages::STORAGE_BINDING,
            ),
            target("volumetric", VOLUME_FORMAT, 1, usage),
        )
    }

    pub fn resize(&mut self, gpu: &mut dyn Gpu, width: u32, height: u32) {
        for texture in [self.ao, self.bloom, self.volume] {
            gpu.destroy_texture(texture);
        }
        (self.ao, self.bloom, self.volume) = Self::targets(gpu, width, height);
        self.width = width;
        self.height = height;
    }

    pub fn bloom(&self) -> TextureId {
        self.bloom
    }

    pub fn ambient_occlusion(&self) -> TextureId {
        self.ao
    }

    fn bloom_level(&self, settings: &PostProcessSettings) -> u32 {
        settings
            .bloom_downsampling
            .min(TextureDesc::full_mip_chain(self.width, self.height) - 1)
    }

    fn begin(gpu: &mut dyn Gpu, label: &'static str, target: TextureId, clear: [f32; 4]) {
        gpu.begin_pass(&PassDesc {
            label,
            colors: vec![Attachment::texture(target)],
            depth: None,
            clear: Some(clear),
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        gpu: &mut dyn Gpu,
        shared: &mut Shared,
        gbuffer: &GBuffer,
        lit: TextureId,
        scene: &Scene,
        camera: &CameraUniform,
        settings: &PostProcessSettings,
    ) {
        // Unoccluded when disabled.
        Self::begin(gpu, "ambient occlusion", self.ao, [1.0; 4]);
        if settings.ao_samples > 0 {
            gpu.use_program(self.ssao);
            gpu.set_uniforms(uniform_bytes(&SsaoUniform {
                camera: *camera,
                params: [
                    settings.ao_radius,
                    settings.ao_threshold,
                    settings.ao_samples as f32,
                    0.0,
                ],
            }));
            gpu.bind_texture(0, gbuffer.position);
            gpu.bind_texture(1, gbuffer.normal);
            gpu.draw_fullscreen();
        }
        gpu.end_pass();

        gpu.set_base_level(self.bloom, 0);
        Self::begin(gpu, "bloom extract", self.bloom, [0.0; 4]);
        if settings.bloom_enabled() {
            gpu.use_program(self.extract);
            gpu.bind_texture(0, lit);
            gpu.draw_fullscreen();
        }
        gpu.end_pass();
        if settings.bloom_enabled() {
            let level = self.bloom_level(settings);
            gpu.generate_mipmaps(self.bloom);
            let Shared { programs, blur } = shared;
            for _ in 0..settings.bloom_blur {
                blur.blur(gpu, programs, self.bloom, TextureKind::D2, self.width, self.height, level);
            }
            gpu.set_base_level(self.bloom, level);
        }

        Self::begin(gpu, "volumetric", self.volume, [0.0; 4]);
        let light = scene
            .lights()
            .map(|(_, light)| light)
            .find(|light| light.shadow_map().texture().is_some());
        if let Some((light, shadow_map)) = light
            .filter(|_| settings.volumetric_enabled())
            .and_then(|light| Some((light, light.shadow_map().texture()?)))
        {
            let mut light_uniform = light.uniform();
            light_uniform.params[1] = settings.min_variance;
            gpu.use_program(self.volumetric);
            gpu.set_uniforms(uniform_bytes(&VolumetricUniform {
                camera: *camera,
                light: light_uniform,
                params: [
                    settings.volume_samples as f32,
                    settings.atmospheric_density,
                    0.0,
                    0.0,
                ],
            }));
            gpu.bind_texture(0, gbuffer.position);
            gpu.bind_texture(1, shadow_map);
            gpu.draw_fullscreen();
        }
        gpu.end_pass();

        gpu.begin_pass(&PassDesc {
            label: "composite",
            colors: vec![Attachment::Output],
            depth: None,
            clear: Some([0.0, 0.0, 0.0, 1.0]),
        });
        gpu.use_program(self.composite);
        gpu.set_uniforms(uniform_bytes(&CompositeUniform {
            params: [
                settings.exposure,
                settings.gamma,
                if settings.bloom_enabled() { settings.bloom } else { 0.0 },
                0.0,
            ],
        }));
        gpu.bind_texture(0, lit);
        gpu.bind_texture(1, self.bloom);
        gpu.bind_texture(2, self.ao);
        gpu.bind_texture(3, self.volume);
        gpu.draw_fullscreen();
        gpu.end_pass();
    }
}
