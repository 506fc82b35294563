//! Overlays drawn on top of the finished frame.

use crate::gpu::{
    Attachment, Blend, Gpu, PassDesc, ProgramKey, ProgramTemplate, ShaderFile, ShaderStage,
    TargetFormat, uniform_bytes,
};
use crate::pipelines::timing::{Stage, StageHistory};
use crate::pipelines::{FULLSCREEN_VERTEX, fullscreen_program};
use crate::shared::Shared;

/// Anything drawn in the GUI stage. Runs after post-processing, on the output.
pub trait Overlay {
    fn draw(&mut self, gpu: &mut dyn Gpu, shared: &mut Shared, history: &StageHistory);
}

pub const OVERLAY_PROGRAM: ProgramTemplate = fullscreen_program(
    ProgramKey::Overlay,
    "timing overlay",
    &[
        FULLSCREEN_VERTEX,
        ShaderFile {
            stage: ShaderStage::Fragment,
            path: "overlay.wgsl",
        },
    ],
    &[TargetFormat::Output],
    Blend::Alpha,
    &[],
);

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct OverlayUniform {
    /// Bar lengths in `[0, 1]`: the five stages followed by the CPU frame time.
    pub bars: [[f32; 4]; 2],
    /// Left, bottom, width, height of the bar chart in UV space.
    pub rect: [f32; 4],
}

/// A bar per timed stage plus the CPU frame time, scaled to a frame budget.
#[derive(Clone, Debug)]
pub struct TimingOverlay {
    pub budget_ms: f32,
    pub rect: [f32; 4],
}

impl Default for TimingOverlay {
    fn default() -> Self {
        Self {
            budget_ms: 1000.0 / 60.0,
            rect: [0.02, 0.02, 0.25, 0.15],
        }
    }
}

impl TimingOverlay {
    pub fn uniform(&self, history: &StageHistory) -> OverlayUniform {
        let budget = self.budget_ms.max(f32::EPSILON);
        let mut values = Stage::ALL
            .iter()
            .map(|stage| history.stage(*stage).average().unwrap_or(0.0))
            .chain(std::iter::once(history.frame.average().unwrap_or(0.0)))
            .map(|ms| (ms / budget).clamp(0.0, 1.0));
        let mut bars = [[0.0; 4]; 2];
        for bar in bars.iter_mut().flat_map(|row| row.iter_mut()) {
            *bar = values.next().unwrap_or(0.0);
        }
        OverlayUniform {
            bars,
            rect: self.rect,
        }
    }
}

impl Overlay for TimingOverlay {
    fn draw(&mut self, gpu: &mut dyn Gpu, shared: &mut Shared, history: &StageHistory) {
        let program = shared.programs.get_or_init(gpu, &OVERLAY_PROGRAM);
        gpu.begin_pass(&PassDesc {
            label: "timing overlay",
            colors: vec![Attachment::Output],
            depth: None,
            clear: None,
        });
        gpu.use_program(program);
        gpu.set_uniforms(uniform_bytes(&self.uniform(history)));
        gpu.draw_fullscreen();
        gpu.end_pass();
    }
}
