//! Separable Gaussian blur on GPU images.
//!
//! A blur runs a horizontal and a vertical compute pass over one mip level of
//! a texture. The vertical pass consumes the horizontal pass' output, so a
//! memory barrier separates them, and another one follows the vertical pass.
//! Cube maps run the full sequence for each face in turn.
//!
//! WebGPU cannot read and write an RGBA16F storage image in the same dispatch,
//! so the horizontal pass writes into a scratch image of the level's size and
//! the vertical pass writes the result back into the source level.

use std::collections::HashMap;

use crate::gpu::{
    Access, Binding, Gpu, ProgramKey, ProgramKind, ProgramRegistry, ProgramTemplate, ShaderFile,
    ShaderStage, TextureDesc, TextureId, TextureKind, uniform_bytes,
};

pub const HORIZONTAL_WORKGROUP: [u32; 3] = [64, 1, 1];
pub const VERTICAL_WORKGROUP: [u32; 3] = [1, 64, 1];

/// Format of every image the blur reads and writes.
pub const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

const BLUR_BINDINGS: &[Binding] = &[Binding::ReadImage, Binding::WriteImage(IMAGE_FORMAT)];

pub const HORIZONTAL_PROGRAM: ProgramTemplate = ProgramTemplate {
    key: ProgramKey::BlurHorizontal,
    label: "gaussian blur horizontal",
    files: &[ShaderFile {
        stage: ShaderStage::Compute,
        path: "gaussian_blur_h.wgsl",
    }],
    kind: ProgramKind::Compute {
        workgroup_size: HORIZONTAL_WORKGROUP,
    },
    bindings: BLUR_BINDINGS,
};

pub const VERTICAL_PROGRAM: ProgramTemplate = ProgramTemplate {
    key: ProgramKey::BlurVertical,
    label: "gaussian blur vertical",
    files: &[ShaderFile {
        stage: ShaderStage::Compute,
        path: "gaussian_blur_v.wgsl",
    }],
    kind: ProgramKind::Compute {
        workgroup_size: VERTICAL_WORKGROUP,
    },
    bindings: BLUR_BINDINGS,
};

/// Largest supported kernel radius; the uniform holds `MAX_RADIUS + 1` weights.
pub const MAX_RADIUS: u32 = 31;

/// Normalised one-sided Gaussian weights, centre tap first.
#[derive(Clone, Debug, PartialEq)]
pub struct GaussianKernel {
    radius: u32,
    sigma: f32,
    weights: Vec<f32>,
}

impl GaussianKernel {
    pub fn new(radius: u32, sigma: f32) -> Self {
        let radius = radius.min(MAX_RADIUS);
        let sigma = if sigma > 0.0 { sigma } else { 1.0 };
        let raw = (0..=radius)
            .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
            .collect::<Vec<_>>();
        let total = raw[0] + 2.0 * raw[1..].iter().sum::<f32>();
        Self {
            radius,
            sigma,
            weights: raw.into_iter().map(|w| w / total).collect(),
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight of the tap at signed `offset` from the centre.
    pub fn weight(&self, offset: i32) -> f32 {
        self.weights
            .get(offset.unsigned_abs() as usize)
            .copied()
            .unwrap_or(0.0)
    }

    fn uniform(&self, width: u32, height: u32) -> KernelUniform {
        let mut weights = [[0.0; 4]; 8];
        for (i, w) in self.weights.iter().enumerate() {
            weights[i / 4][i % 4] = *w;
        }
        KernelUniform {
            weights,
            radius: self.radius,
            width,
            height,
            _padding: 0,
        }
    }
}

impl Default for GaussianKernel {
    fn default() -> Self {
        Self::new(4, 2.0)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct KernelUniform {
    pub weights: [[f32; 4]; 8],
    pub radius: u32,
    pub width: u32,
    pub height: u32,
    pub _padding: u32,
}

/// Size of `width`x`height` at mip `level`. A zero height means square.
pub fn level_size(width: u32, height: u32, level: u32) -> (u32, u32) {
    let height = if height == 0 { width } else { height };
    let shrink = |size: u32| size.checked_shr(level).unwrap_or(0).max(1);
    (shrink(width), shrink(height))
}

/// Workgroup counts of the horizontal and vertical pass, or `None` for a
/// zero-width request.
///
/// Each pass covers its axis with one guard group beyond `ceil(size / 64)`.
pub fn dispatch_groups(width: u32, height: u32, level: u32) -> Option<([u32; 3], [u32; 3])> {
    if width == 0 {
        return None;
    }
    let (w, h) = level_size(width, height, level);
    let horizontal = [w.div_ceil(HORIZONTAL_WORKGROUP[0]) + 1, h, 1];
    let vertical = [w, h.div_ceil(VERTICAL_WORKGROUP[1]) + 1, 1];
    Some((horizontal, vertical))
}

#[derive(Debug, Default)]
pub struct Blur {
    pub kernel: GaussianKernel,
    scratch: HashMap<(u32, u32), TextureId>,
}

impl Blur {
    pub fn new(kernel: GaussianKernel) -> Self {
        Self {
            kernel,
            scratch: HashMap::new(),
        }
    }

    /// Number of scratch images allocated so far, one per blurred level size.
    pub fn scratch_images(&self) -> usize {
        self.scratch.len()
    }

    /// Blurs mip `level` of `texture` in place. Cube maps are blurred face by face.
    #[allow(clippy::too_many_arguments)]
    pub fn blur(
        &mut self,
        gpu: &mut dyn Gpu,
        programs: &mut ProgramRegistry,
        texture: TextureId,
        kind: TextureKind,
        width: u32,
        height: u32,
        level: u32,
    ) {
        let Some((horizontal_groups, vertical_groups)) = dispatch_groups(width, height, level) else {
            log::warn!("Ignoring blur of a zero-width image");
            return;
        };
        let horizontal = programs.get_or_init(gpu, &HORIZONTAL_PROGRAM);
        let vertical = programs.get_or_init(gpu, &VERTICAL_PROGRAM);

        let (w, h) = level_size(width, height, level);
        let scratch = *self.scratch.entry((w, h)).or_insert_with(|| {
            gpu.create_texture(&TextureDesc {
                label: "blur scratch",
                kind: TextureKind::D2,
                width: w,
                height: h,
                format: IMAGE_FORMAT,
                mip_levels: 1,
                usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            })
        });
        let uniform = self.kernel.uniform(w, h);

        for layer in 0..kind.layers() {
            gpu.set_uniforms(uniform_bytes(&uniform));
            gpu.bind_image(0, texture, level, layer, Access::Read);
            gpu.bind_image(1, scratch, 0, 0, Access::Write);
            gpu.dispatch(horizontal, horizontal_groups);
            gpu.memory_barrier();

            gpu.bind_image(0, scratch, 0, 0, Access::Read);
            gpu.bind_image(1, texture, level, layer, Access::Write);
            gpu.dispatch(vertical, vertical_groups);
            gpu.memory_barrier();
        }
    }
}
