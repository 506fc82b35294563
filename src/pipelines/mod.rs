//! The deferred frame pipeline.
//!
//! A frame runs five timed stages in a fixed order:
//!
//! 1. `Update`: dynamic shadow maps and the point light buffer
//! 2. `GBuffer`: surface attributes of visible instances
//! 3. `LightPass`: lighting accumulated into an HDR target
//! 4. `PostProcess`: ambient occlusion, bloom, volumetrics and tone mapping
//! 5. `Gui`: overlays on the presented frame
//!
//! Each stage is bracketed by a GPU timer query whose results feed a
//! [`timing::StageHistory`].

use instant::Instant;

use crate::camera::{Camera, CameraUniform, Projection};
use crate::gpu::{
    Binding, Blend, DepthMode, Gpu, ProgramKey, ProgramKind, ProgramTemplate, ShaderFile,
    ShaderStage, TargetFormat, VertexInput,
};
use crate::scene::Scene;
use crate::shared::Shared;

pub mod gbuffer;
pub mod gui;
pub mod light;
pub mod post_process;
pub mod timing;

use gbuffer::GBuffer;
use gui::Overlay;
use light::LightPass;
use post_process::{PostProcess, PostProcessSettings};
use timing::{Stage, StageHistory, StageTimings};

/// Vertex stage emitting one screen-covering triangle with UVs.
pub const FULLSCREEN_VERTEX: ShaderFile = ShaderFile {
    stage: ShaderStage::Vertex,
    path: "fullscreen.wgsl",
};

pub(crate) const fn fullscreen_program(
    key: ProgramKey,
    label: &'static str,
    files: &'static [ShaderFile],
    targets: &'static [TargetFormat],
    blend: Blend,
    bindings: &'static [Binding],
) -> ProgramTemplate {
    ProgramTemplate {
        key,
        label,
        files,
        kind: ProgramKind::Raster {
            input: VertexInput::Fullscreen,
            targets,
            depth: DepthMode::None,
            blend,
        },
        bindings,
    }
}

#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    /// Draw point lights as billboards after the light pass.
    pub debug_lights: bool,
    /// Samples kept per stage for the timing graphs.
    pub timing_history: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            debug_lights: false,
            timing_history: 120,
        }
    }
}

pub struct DeferredRenderer {
    pub config: RendererConfig,
    pub settings: PostProcessSettings,
    shared: Shared,
    gbuffer: GBuffer,
    light_pass: LightPass,
    post_process: PostProcess,
    timings: StageTimings,
    history: StageHistory,
    last_frame: Option<Instant>,
}

impl DeferredRenderer {
    pub fn new(gpu: &mut dyn Gpu, config: RendererConfig) -> Self {
        Self::with_shared(gpu, config, Shared::default())
    }

    /// Builds the renderer around existing shared state, e.g. a registry with
    /// a custom shader root.
    pub fn with_shared(gpu: &mut dyn Gpu, config: RendererConfig, mut shared: Shared) -> Self {
        let (width, height) = (config.width.max(1), config.height.max(1));
        log::info!("Creating deferred renderer at {}x{}", width, height);
        Self {
            gbuffer: GBuffer::new(gpu, &mut shared, width, height),
            light_pass: LightPass::new(gpu, &mut shared, width, height),
            post_process: PostProcess::new(gpu, &mut shared, width, height),
            timings: StageTimings::new(gpu),
            history: StageHistory::new(config.timing_history),
            settings: PostProcessSettings::default(),
            last_frame: None,
            shared,
            config,
        }
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    pub fn shared_mut(&mut self) -> &mut Shared {
        &mut self.shared
    }

    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    pub fn light_pass(&self) -> &LightPass {
        &self.light_pass
    }

    pub fn post_process(&self) -> &PostProcess {
        &self.post_process
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    pub fn history(&self) -> &StageHistory {
        &self.history
    }

    /// Reallocates every size-dependent target.
    pub fn resize(&mut self, gpu: &mut dyn Gpu, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == self.gbuffer.size() {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.gbuffer.resize(gpu, width, height);
        self.light_pass.resize(gpu, width, height);
        self.post_process.resize(gpu, width, height);
    }

    /// Renders and presents one frame. Returns `false` when no frame could be
    /// acquired and nothing was drawn.
    pub fn render(
        &mut self,
        gpu: &mut dyn Gpu,
        scene: &mut Scene,
        camera: &Camera,
        projection: &Projection,
        overlay: Option<&mut dyn Overlay>,
    ) -> bool {
        if !gpu.acquire_frame() {
            log::debug!("No frame acquired, skipping render");
            return false;
        }
        let now = Instant::now();
        if let Some(last) = self.last_frame.replace(now) {
            self.history
                .frame
                .push(now.duration_since(last).as_secs_f32() * 1000.0);
        }

        let camera_uniform = CameraUniform::new(camera, projection);
        let (view, proj) = (camera.calc_matrix(), projection.calc_matrix());
        let Self {
            config,
            settings,
            shared,
            gbuffer,
            light_pass,
            post_process,
            timings,
            history,
            ..
        } = self;

        timings.timed(gpu, Stage::Update, |gpu| scene.update(gpu, shared));
        timings.timed(gpu, Stage::GBuffer, |gpu| {
            gbuffer.render(gpu, scene, &camera_uniform, &proj, &view)
        });
        timings.timed(gpu, Stage::LightPass, |gpu| {
            light_pass.render(gpu, gbuffer, scene, &camera_uniform, settings, config.debug_lights)
        });
        timings.timed(gpu, Stage::PostProcess, |gpu| {
            post_process.render(gpu, shared, gbuffer, light_pass.lit(), scene, &camera_uniform, settings)
        });
        timings.timed(gpu, Stage::Gui, |gpu| {
            if let Some(overlay) = overlay {
                overlay.draw(gpu, shared, history);
            }
        });

        gpu.present();
        timings.collect(gpu, history);
        true
    }
}
